//! Higher-level binary helpers: length-prefixed vectors, names, and convenience reads.

use super::{cursor::Cursor, leb128, BinaryReadError};

/// Read a length-prefixed vector of raw bytes (u32 length via ULEB128).
pub fn read_len_prefixed_bytes(cur: &mut Cursor) -> super::Result<Vec<u8>> {
    let len = leb128::read_uleb_u32(cur)? as usize;
    let bytes = cur.read_bytes(len)?.to_vec();
    Ok(bytes)
}

/// Read a UTF-8 name (length-prefixed bytes).
pub fn read_name(cur: &mut Cursor) -> super::Result<String> {
    let offset = cur.offset();
    let bytes = read_len_prefixed_bytes(cur)?;
    String::from_utf8(bytes).map_err(|_| BinaryReadError::InvalidUtf8 { offset })
}

/// Read a vector of T using the provided element reader closure.
/// Length is encoded as ULEB128 u32; the element reader decides the error type so section
/// decoders can return their own errors from inside the closure.
pub fn read_vec<T, E, F>(cur: &mut Cursor, mut elem: F) -> Result<Vec<T>, E>
where
    F: FnMut(&mut Cursor) -> Result<T, E>,
    E: From<BinaryReadError>,
{
    let len = leb128::read_uleb_u32(cur)? as usize;
    // Each element takes at least one byte, so never reserve past what the input can hold.
    let mut out = Vec::with_capacity(len.min(cur.remaining()));
    for _ in 0..len {
        out.push(elem(cur)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_name_ok() {
        let data = [0x03, b'f', b'o', b'o']; // len=3, "foo"
        let mut c = Cursor::new(&data);
        let s = read_name(&mut c).unwrap();
        assert_eq!(s, "foo");
    }

    #[test]
    fn read_name_rejects_invalid_utf8() {
        let data = [0x02, 0xC3, 0x28];
        let mut c = Cursor::new(&data);
        assert_eq!(
            read_name(&mut c).unwrap_err(),
            BinaryReadError::InvalidUtf8 { offset: 0 }
        );
    }

    #[test]
    fn read_vec_of_bytes() {
        // vec length=2, then each elem is a single u8 byte read via closure
        let data = [0x02, 0xAA, 0xBB];
        let mut c = Cursor::new(&data);
        let v: Vec<u8> = read_vec(&mut c, |c| c.read_u8()).unwrap();
        assert_eq!(v, vec![0xAA, 0xBB]);
    }

    #[test]
    fn read_vec_short_input_fails() {
        let data = [0x03, 0xAA];
        let mut c = Cursor::new(&data);
        let r: Result<Vec<u8>, BinaryReadError> = read_vec(&mut c, |c| c.read_u8());
        assert!(matches!(r, Err(BinaryReadError::UnexpectedEof { .. })));
    }
}
