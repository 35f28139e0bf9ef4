//! Linear memory instance (32-bit index space, 64 KiB pages).
//!
//! Addresses are taken as `u64` effective addresses so `base + offset` never wraps; every
//! access is bounds-checked against the current byte length.

use super::try_resize;
use crate::error::Trap;
use crate::model::MemoryType;

/// Page size in bytes (64 KiB).
pub const PAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct MemoryInstance {
    ty: MemoryType,
    buf: Vec<u8>,
}

impl MemoryInstance {
    /// Create a zero-filled memory of `ty.limits.min` pages, or `None` when the pages
    /// cannot be allocated.
    pub fn new(ty: MemoryType) -> Option<Self> {
        let len = (ty.limits.min as usize).checked_mul(PAGE_SIZE)?;
        let mut buf = Vec::new();
        try_resize(&mut buf, len, 0)?;
        Some(Self { ty, buf })
    }

    pub fn ty(&self) -> &MemoryType {
        &self.ty
    }

    /// Current size in pages.
    pub fn size_pages(&self) -> u32 {
        (self.buf.len() / PAGE_SIZE) as u32
    }

    /// Grow by `delta` pages, never beyond the declared maximum or `cap`. Returns the
    /// previous size in pages, or `None` when the request exceeds a limit or the pages
    /// cannot be allocated. A failed grow leaves the memory unchanged.
    pub fn grow(&mut self, delta: u32, cap: u32) -> Option<u32> {
        let prev = self.size_pages();
        let new = prev.checked_add(delta)?;
        let limit = self.ty.limits.max.unwrap_or(u32::MAX).min(cap);
        if new > limit {
            return None;
        }
        try_resize(&mut self.buf, (new as usize).checked_mul(PAGE_SIZE)?, 0)?;
        self.ty.limits.min = new;
        Some(prev)
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn range(&self, addr: u64, len: u64) -> Result<std::ops::Range<usize>, Trap> {
        let oob = Trap::MemoryOutOfBounds { addr, len };
        let end = addr.checked_add(len).ok_or(oob.clone())?;
        if end > self.buf.len() as u64 {
            return Err(oob);
        }
        Ok(addr as usize..end as usize)
    }

    /// Read `N` bytes starting at `addr`.
    pub fn load<const N: usize>(&self, addr: u64) -> Result<[u8; N], Trap> {
        let r = self.range(addr, N as u64)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[r]);
        Ok(out)
    }

    /// Write `bytes` starting at `addr`; nothing is written when out of bounds.
    pub fn store(&mut self, addr: u64, bytes: &[u8]) -> Result<(), Trap> {
        let r = self.range(addr, bytes.len() as u64)?;
        self.buf[r].copy_from_slice(bytes);
        Ok(())
    }

    /// `memory.fill`
    pub fn fill(&mut self, dst: u64, val: u8, len: u64) -> Result<(), Trap> {
        let r = self.range(dst, len)?;
        self.buf[r].fill(val);
        Ok(())
    }

    /// `memory.copy`; overlapping ranges behave as if copied through a temporary buffer.
    pub fn copy_within(&mut self, dst: u64, src: u64, len: u64) -> Result<(), Trap> {
        let s = self.range(src, len)?;
        let d = self.range(dst, len)?;
        self.buf.copy_within(s, d.start);
        Ok(())
    }

    /// Copy `len` bytes of `src` starting at `src_off` into memory at `dst`.
    /// Used by `memory.init` and active data segments.
    pub fn init(&mut self, dst: u64, src: &[u8], src_off: u64, len: u64) -> Result<(), Trap> {
        let src_end = src_off
            .checked_add(len)
            .filter(|&e| e <= src.len() as u64)
            .ok_or(Trap::MemoryOutOfBounds { addr: src_off, len })?;
        let d = self.range(dst, len)?;
        self.buf[d].copy_from_slice(&src[src_off as usize..src_end as usize]);
        Ok(())
    }
}
