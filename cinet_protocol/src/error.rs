// src/error.rs
use thiserror::Error;

/// Errors raised by the ciNet codec. Building a message never fails; these come
/// from explicit block-range calls, identity parsing and the decoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("block range {offset}+{blocks}x8 does not fit a {len}-byte buffer")]
    BlockRange {
        offset: usize,
        blocks: usize,
        len: usize,
    },

    #[error("cipher rejected a {0}-byte key")]
    KeyLength(usize),

    #[error("invalid device key {0:?} (expected four dotted hex bytes)")]
    DeviceKey(String),

    #[error("message is {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("unexpected marker 0x{found:02X} at byte {offset}")]
    Marker { offset: usize, found: u8 },

    #[error("{scope} checksum mismatch: stored 0x{stored:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch {
        scope: &'static str,
        stored: u16,
        computed: u16,
    },
}
