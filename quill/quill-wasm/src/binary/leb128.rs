//! ULEB128/SLEB128 decoding specialized for the integer widths the format uses
//! (u32, u64, i32, i33 block types, i64).

use super::{cursor::Cursor, BinaryReadError, Result};

/// Decode an unsigned LEB128 as u32 (max 5 bytes).
pub fn read_uleb_u32(cur: &mut Cursor) -> Result<u32> {
    read_uleb_generic(cur, 32).map(|v| v as u32)
}

/// Decode an unsigned LEB128 as u64 (max 10 bytes).
pub fn read_uleb_u64(cur: &mut Cursor) -> Result<u64> {
    read_uleb_generic(cur, 64)
}

/// Decode a signed LEB128 as i32 (max 5 bytes).
pub fn read_sleb_i32(cur: &mut Cursor) -> Result<i32> {
    read_sleb_generic(cur, 32).map(|v| v as i32)
}

/// Decode a signed 33-bit LEB128 (block type indices). Returned widened to i64.
pub fn read_sleb_i33(cur: &mut Cursor) -> Result<i64> {
    read_sleb_generic(cur, 33)
}

/// Decode a signed LEB128 as i64 (max 10 bytes).
pub fn read_sleb_i64(cur: &mut Cursor) -> Result<i64> {
    read_sleb_generic(cur, 64)
}

fn read_uleb_generic(cur: &mut Cursor, bits: u8) -> Result<u64> {
    let start = cur.offset();
    let max_bytes = bits.div_ceil(7);
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    for i in 0..max_bytes {
        let byte = cur.read_u8()?;
        let low = (byte & 0x7F) as u64;
        if i + 1 == max_bytes {
            if byte & 0x80 != 0 {
                return Err(BinaryReadError::Leb128TooManyBytes {
                    limit: max_bytes,
                    offset: start,
                });
            }
            // Bits past the target width must be zero.
            let used = bits as u32 - shift;
            if used < 7 && (low >> used) != 0 {
                return Err(BinaryReadError::Leb128Overflow {
                    target_bits: bits,
                    offset: start,
                });
            }
        }
        result |= low << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }

    Err(BinaryReadError::Leb128TooManyBytes {
        limit: max_bytes,
        offset: start,
    })
}

fn read_sleb_generic(cur: &mut Cursor, bits: u8) -> Result<i64> {
    let start = cur.offset();
    let max_bytes = bits.div_ceil(7);
    let mut result: i64 = 0;
    let mut shift: u32 = 0;

    for i in 0..max_bytes {
        let byte = cur.read_u8()?;
        let low = (byte & 0x7F) as i64;
        if i + 1 == max_bytes {
            if byte & 0x80 != 0 {
                return Err(BinaryReadError::Leb128TooManyBytes {
                    limit: max_bytes,
                    offset: start,
                });
            }
            // The sign bit and every unused bit above it must agree.
            let used = bits as u32 - shift;
            if used < 7 {
                let mask = (0x7Fi64 << (used - 1)) & 0x7F;
                let tail = low & mask;
                if tail != 0 && tail != mask {
                    return Err(BinaryReadError::Leb128Overflow {
                        target_bits: bits,
                        offset: start,
                    });
                }
            }
        }
        result |= low << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && (byte & 0x40) != 0 {
                result |= -1i64 << shift;
            }
            return Ok(result);
        }
    }

    Err(BinaryReadError::Leb128TooManyBytes {
        limit: max_bytes,
        offset: start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::cursor::Cursor;
    use proptest::prelude::*;

    fn encode_uleb(mut v: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    fn encode_sleb(mut v: i64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
            if done {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    #[test]
    fn uleb32_basic() {
        let mut c = Cursor::new(&[0xE5, 0x8E, 0x26]); // 624485
        let v = read_uleb_u32(&mut c).unwrap();
        assert_eq!(v, 624485);
        assert!(c.is_eof());
    }

    #[test]
    fn sleb32_basic() {
        // -624485 encoded as SLEB128: 9b f1 59
        let mut c = Cursor::new(&[0x9b, 0xf1, 0x59]);
        let v = read_sleb_i32(&mut c).unwrap();
        assert_eq!(v, -624485);
    }

    #[test]
    fn sleb_single_byte_negative() {
        let mut c = Cursor::new(&[0x7F]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), -1);
        let mut c = Cursor::new(&[0x40]);
        assert_eq!(read_sleb_i64(&mut c).unwrap(), -64);
    }

    #[test]
    fn sleb33_type_index() {
        let mut c = Cursor::new(&[0x05]);
        assert_eq!(read_sleb_i33(&mut c).unwrap(), 5);
        // 2^32 - 1 fits in s33 but not in s32
        let bytes = encode_sleb(u32::MAX as i64);
        let mut c = Cursor::new(&bytes);
        assert_eq!(read_sleb_i33(&mut c).unwrap(), u32::MAX as i64);
        let mut c = Cursor::new(&bytes);
        assert!(read_sleb_i32(&mut c).is_err());
    }

    #[test]
    fn uleb32_too_many_bytes() {
        let bytes = [0xFFu8; 6];
        let mut c = Cursor::new(&bytes);
        let err = read_uleb_u32(&mut c).unwrap_err();
        assert!(matches!(err, BinaryReadError::Leb128TooManyBytes { .. }));
    }

    #[test]
    fn uleb32_unused_bits_rejected() {
        // fifth byte may only carry 4 payload bits for u32
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x1F];
        let mut c = Cursor::new(&bytes);
        let err = read_uleb_u32(&mut c).unwrap_err();
        assert!(matches!(err, BinaryReadError::Leb128Overflow { .. }));
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        let mut c = Cursor::new(&bytes);
        assert_eq!(read_uleb_u32(&mut c).unwrap(), u32::MAX);
    }

    #[test]
    fn sleb32_bad_sign_extension_rejected() {
        // last byte 0x70: sign bit clear but unused bits set
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x70];
        let mut c = Cursor::new(&bytes);
        assert!(matches!(
            read_sleb_i32(&mut c).unwrap_err(),
            BinaryReadError::Leb128Overflow { .. }
        ));
        // i32::MIN: 80 80 80 80 78
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x78];
        let mut c = Cursor::new(&bytes);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), i32::MIN);
    }

    #[test]
    fn truncated_input_fails() {
        let mut c = Cursor::new(&[0x80, 0x80]);
        assert!(matches!(
            read_uleb_u32(&mut c).unwrap_err(),
            BinaryReadError::UnexpectedEof { .. }
        ));
        let mut c = Cursor::new(&[0xC0]);
        assert!(matches!(
            read_sleb_i64(&mut c).unwrap_err(),
            BinaryReadError::UnexpectedEof { .. }
        ));
    }

    proptest! {
        #[test]
        fn prop_u32_roundtrip(n in any::<u32>()) {
            let bytes = encode_uleb(n as u64);
            let mut c = Cursor::new(&bytes);
            prop_assert_eq!(read_uleb_u32(&mut c).unwrap(), n);
            prop_assert!(c.is_eof());
        }

        #[test]
        fn prop_u64_roundtrip(n in any::<u64>()) {
            let bytes = encode_uleb(n);
            let mut c = Cursor::new(&bytes);
            prop_assert_eq!(read_uleb_u64(&mut c).unwrap(), n);
        }

        #[test]
        fn prop_i32_roundtrip(n in any::<i32>()) {
            let bytes = encode_sleb(n as i64);
            let mut c = Cursor::new(&bytes);
            prop_assert_eq!(read_sleb_i32(&mut c).unwrap(), n);
            prop_assert!(c.is_eof());
        }

        #[test]
        fn prop_i64_roundtrip(n in any::<i64>()) {
            let bytes = encode_sleb(n);
            let mut c = Cursor::new(&bytes);
            prop_assert_eq!(read_sleb_i64(&mut c).unwrap(), n);
        }

        #[test]
        fn prop_truncated_never_decodes(n in 128u64..u64::MAX) {
            let mut bytes = encode_uleb(n);
            bytes.pop();
            let mut c = Cursor::new(&bytes);
            prop_assert!(read_uleb_u64(&mut c).is_err());
        }
    }
}
