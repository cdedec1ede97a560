// src/checksum.rs
//! 16-bit running checksum used twice per ciNet message.
//!
//! CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, MSB first, no
//! reflection and no final xor. The wire carries the bitwise complement of the
//! value, big-endian.

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Checksum of `length` bytes starting at `offset`. The range is clamped to the
/// buffer, so an over-long request covers only the bytes that exist.
pub fn checksum(buf: &[u8], offset: usize, length: usize) -> u16 {
    let start = offset.min(buf.len());
    let end = start.saturating_add(length).min(buf.len());
    buf[start..end].iter().fold(INIT, |crc, &b| {
        (crc << 8) ^ TABLE[usize::from((crc >> 8) as u8 ^ b)]
    })
}

/// The value actually stored on the wire.
#[inline]
pub fn checksum_complement(buf: &[u8], offset: usize, length: usize) -> u16 {
    !checksum(buf, offset, length)
}

/// Compute the complement over `offset..offset + length` and write it big-endian
/// at `at`.
pub fn store_complement(buf: &mut [u8], at: usize, offset: usize, length: usize) -> u16 {
    let value = checksum_complement(buf, offset, length);
    buf[at..at + 2].copy_from_slice(&value.to_be_bytes());
    value
}
