//! Byte cursor with offset tracking and little-endian primitives.

use super::BinaryReadError;

/// Cursor over a byte slice with absolute offset tracking.
///
/// `base` lets a cursor over a sub-slice (a section payload, a code body) report offsets
/// relative to the whole module buffer.
#[derive(Clone, Copy, Debug)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    /// Create a new cursor over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, base: 0 }
    }

    /// Create a cursor over `data` whose first byte sits at absolute offset `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Current absolute byte offset.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Bytes consumed from this cursor's own slice.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Remaining unread length.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// True if at end of input.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Peek next byte without advancing.
    pub fn peek_u8(&self) -> super::Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(BinaryReadError::UnexpectedEof { offset: self.offset() })
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> super::Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read exactly n bytes and return a slice view into the underlying data.
    /// On failure the cursor does not move.
    pub fn read_bytes(&mut self, n: usize) -> super::Result<&'a [u8]> {
        let slice = self.slice(n)?;
        self.pos += n;
        Ok(slice)
    }

    /// Skip exactly n bytes.
    pub fn skip(&mut self, n: usize) -> super::Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Read little-endian u32.
    pub fn read_u32_le(&mut self) -> super::Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read little-endian u64.
    pub fn read_u64_le(&mut self) -> super::Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Split off the next `n` bytes as an independent cursor (absolute offsets kept)
    /// and advance past them.
    pub fn sub_cursor(&mut self, n: usize) -> super::Result<Cursor<'a>> {
        let base = self.offset();
        let bytes = self.read_bytes(n)?;
        Ok(Cursor::with_base(bytes, base))
    }

    /// Return a subslice starting at current position with given length (no advance).
    pub fn slice(&self, n: usize) -> super::Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(BinaryReadError::Malformed {
            offset: self.offset(),
            msg: "position overflow",
        })?;
        self.data
            .get(self.pos..end)
            .ok_or(BinaryReadError::UnexpectedEof { offset: self.offset() })
    }
}
