//! Variable-length Integer Encoding (Varint)
//!
//! Flexible schema versions of the platform's internal records use unsigned
//! varints for compact string/array lengths and tagged-field headers.
//!
//! ## Varint Encoding
//! - Each byte carries 7 bits of data and 1 continuation bit
//! - Values 0-127 use a single byte, `u64::MAX` uses 10 bytes
//!
//! Decoding never panics: a buffer that ends mid-varint or a varint longer
//! than 64 bits is reported as a [`DecodeError`].

use bytes::{Buf, BufMut};

use crate::error::{DecodeError, Result};

/// Encode an unsigned integer as a varint
pub fn encode_varint_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Decode a varint to an unsigned integer
pub fn decode_varint_u64(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    loop {
        if !buf.has_remaining() {
            return Err(DecodeError::Truncated {
                what: "varint",
                needed: 1,
                remaining: 0,
            });
        }

        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            break;
        }

        shift += 7;

        if shift >= 64 {
            return Err(DecodeError::VarintTooLong);
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_varint_u64_boundary_sizes() {
        let boundaries = [(127u64, 1), (128, 2), (1u64 << 14, 3), (u64::MAX, 10)];
        for (value, expected_bytes) in boundaries {
            let mut buf = BytesMut::new();
            encode_varint_u64(&mut buf, value);
            assert_eq!(buf.len(), expected_bytes, "size of {}", value);
            let mut cursor = buf.as_ref();
            assert_eq!(decode_varint_u64(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn test_truncated_varint_is_an_error() {
        // Continuation bit set, then the buffer ends
        let mut cursor: &[u8] = &[0x80];
        assert!(matches!(
            decode_varint_u64(&mut cursor),
            Err(DecodeError::Truncated { .. })
        ));

        let mut empty: &[u8] = &[];
        assert!(decode_varint_u64(&mut empty).is_err());
    }

    #[test]
    fn test_overlong_varint_is_an_error() {
        let mut cursor: &[u8] = &[0xFF; 11];
        assert!(matches!(
            decode_varint_u64(&mut cursor),
            Err(DecodeError::VarintTooLong)
        ));
    }
}
