// src/cipher.rs
//! Passphrase key derivation and the 64-bit block cipher applied to the payload.
//!
//! Blocks are processed independently (ECB). The legacy peer expects exactly
//! this, so there is no chaining, IV or padding.

use std::fmt;

use blowfish::Blowfish;
use blowfish::cipher::generic_array::GenericArray;
use blowfish::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use sha1::Sha1;

use crate::ProtocolError;

pub const KEY_LEN: usize = 32;
pub const BLOCK_LEN: usize = 8;

pub const PBKDF2_SALT: [u8; 8] = [0x74, 0xC4, 0x89, 0x4C, 0x4F, 0x38, 0xFF, 0xCC];
pub const PBKDF2_ROUNDS: u32 = 1000;

/// PBKDF2-HMAC-SHA1 over the fixed salt.
pub fn derive_key(passphrase: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), &PBKDF2_SALT, PBKDF2_ROUNDS, &mut key);
    key
}

/// Blowfish keyed once with a derived key.
pub struct BlockCipher {
    inner: Blowfish,
}

impl BlockCipher {
    pub fn new(key: &[u8; KEY_LEN]) -> Result<Self, ProtocolError> {
        Blowfish::new_from_slice(key)
            .map(|inner| Self { inner })
            .map_err(|_| ProtocolError::KeyLength(key.len()))
    }

    pub fn from_passphrase(passphrase: &str) -> Result<Self, ProtocolError> {
        Self::new(&derive_key(passphrase))
    }

    /// Encrypt `blocks` 8-byte blocks starting at `offset`, in place.
    pub fn encrypt_blocks(
        &self,
        buf: &mut [u8],
        offset: usize,
        blocks: usize,
    ) -> Result<(), ProtocolError> {
        let region = block_region(buf, offset, blocks)?;
        self.encrypt_in_place(region);
        Ok(())
    }

    /// Inverse of [`encrypt_blocks`](Self::encrypt_blocks) under the same key.
    pub fn decrypt_blocks(
        &self,
        buf: &mut [u8],
        offset: usize,
        blocks: usize,
    ) -> Result<(), ProtocolError> {
        let region = block_region(buf, offset, blocks)?;
        self.decrypt_in_place(region);
        Ok(())
    }

    // Callers guarantee `region.len()` is a multiple of BLOCK_LEN; a trailing
    // partial block would be left untouched.
    pub(crate) fn encrypt_in_place(&self, region: &mut [u8]) {
        for block in region.chunks_exact_mut(BLOCK_LEN) {
            self.inner.encrypt_block(GenericArray::from_mut_slice(block));
        }
    }

    pub(crate) fn decrypt_in_place(&self, region: &mut [u8]) {
        for block in region.chunks_exact_mut(BLOCK_LEN) {
            self.inner.decrypt_block(GenericArray::from_mut_slice(block));
        }
    }
}

impl fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCipher").finish_non_exhaustive()
    }
}

fn block_region(buf: &mut [u8], offset: usize, blocks: usize) -> Result<&mut [u8], ProtocolError> {
    let len = buf.len();
    let end = blocks
        .checked_mul(BLOCK_LEN)
        .and_then(|n| offset.checked_add(n))
        .filter(|&end| end <= len)
        .ok_or(ProtocolError::BlockRange { offset, blocks, len })?;
    Ok(&mut buf[offset..end])
}
