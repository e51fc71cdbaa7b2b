//! Encoding utilities for variable-length integers.

use bytes::{Buf, BufMut};

/// Maximum bytes needed to encode a varint64.
pub const MAX_VARINT64_LEN: usize = 10;

/// Encode a 64-bit unsigned integer as a varint.
///
/// Returns the number of bytes written.
pub fn encode_varint64<B: BufMut>(buf: &mut B, mut value: u64) -> usize {
    let mut count = 0;
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
        count += 1;
    }
    buf.put_u8(value as u8);
    count + 1
}

/// Decode a 64-bit varint from a buffer.
///
/// Returns None if the buffer is too short or the varint is malformed.
pub fn decode_varint64(buf: &mut &[u8]) -> Option<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    for _ in 0..MAX_VARINT64_LEN {
        if buf.is_empty() {
            return None;
        }

        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Some(result);
        }

        shift += 7;
    }

    None // Varint too long
}

/// Decode a varint that must consume the whole slice.
pub fn decode_varint64_exact(mut data: &[u8]) -> Option<u64> {
    let value = decode_varint64(&mut data)?;
    data.is_empty().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_varint64_boundaries() {
        for &val in &[0u64, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let mut buf = BytesMut::new();
            let written = encode_varint64(&mut buf, val);
            assert_eq!(written, buf.len());

            let mut slice: &[u8] = &buf;
            assert_eq!(decode_varint64(&mut slice), Some(val));
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_varint_truncated() {
        let mut slice: &[u8] = &[0x80, 0x80];
        assert_eq!(decode_varint64(&mut slice), None);
    }

    #[test]
    fn test_varint_exact_rejects_trailing_bytes() {
        assert_eq!(decode_varint64_exact(&[0x05]), Some(5));
        assert_eq!(decode_varint64_exact(&[0x05, 0x00]), None);
    }
}
