// src/pack.rs
// Big-endian field packing for fixed offsets inside a ciNet buffer.

#[inline]
pub fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn put_i32(buf: &mut [u8], at: usize, value: i32) {
    buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

#[inline]
pub fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

#[inline]
pub fn get_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
pub fn get_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Copy `text` into a `width`-byte field, always leaving at least one trailing
/// null.
pub fn put_text(buf: &mut [u8], at: usize, width: usize, text: &str) {
    let field = &mut buf[at..at + width];
    field.fill(0);
    let n = text.len().min(width.saturating_sub(1));
    field[..n].copy_from_slice(&text.as_bytes()[..n]);
}

/// Read a null-padded field back, stopping at the first null.
pub fn get_text(buf: &[u8], at: usize, width: usize) -> String {
    let field = &buf[at..at + width];
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let mut buf = [0u8; 8];
        put_u16(&mut buf, 0, 0x1234);
        assert_eq!(&buf[..2], &[0x12, 0x34]);
        assert_eq!(get_u16(&buf, 0), 0x1234);

        put_u32(&mut buf, 2, 0xDEAD_BEEF);
        assert_eq!(&buf[2..6], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(get_u32(&buf, 2), 0xDEAD_BEEF);
    }

    #[test]
    fn negative_i32_is_twos_complement() {
        let mut buf = [0u8; 4];
        put_i32(&mut buf, 0, -99_882);
        assert_eq!(buf, [0xFF, 0xFE, 0x79, 0xD6]);
        assert_eq!(get_i32(&buf, 0), -99_882);
    }

    #[test]
    fn text_is_null_padded_and_truncated() {
        let mut buf = [0xEEu8; 6];
        put_text(&mut buf, 0, 6, "Millitag");
        assert_eq!(&buf, b"Milli\0");
        assert_eq!(get_text(&buf, 0, 6), "Milli");

        put_text(&mut buf, 0, 6, "ab");
        assert_eq!(&buf, b"ab\0\0\0\0");
    }
}
