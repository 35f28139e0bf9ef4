//! Table instance: a growable vector of reference values.

use super::try_resize;
use crate::error::Trap;
use crate::model::{TableType, Value};

#[derive(Debug, Clone)]
pub struct TableInstance {
    ty: TableType,
    elems: Vec<Value>,
}

impl TableInstance {
    /// Create a table of `ty.limits.min` null references, or `None` when the slots cannot
    /// be allocated.
    pub fn new(ty: TableType) -> Option<Self> {
        let mut elems = Vec::new();
        try_resize(&mut elems, ty.limits.min as usize, Value::null_ref(ty.elem))?;
        Some(Self { ty, elems })
    }

    pub fn ty(&self) -> &TableType {
        &self.ty
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    pub fn get(&self, idx: u32) -> Result<Value, Trap> {
        self.elems
            .get(idx as usize)
            .copied()
            .ok_or(Trap::TableOutOfBounds)
    }

    pub fn set(&mut self, idx: u32, val: Value) -> Result<(), Trap> {
        let slot = self
            .elems
            .get_mut(idx as usize)
            .ok_or(Trap::TableOutOfBounds)?;
        *slot = val;
        Ok(())
    }

    /// Grow by `delta` slots filled with `init`. Returns the previous size, or `None` when
    /// the declared maximum or `cap` would be exceeded or the slots cannot be allocated.
    pub fn grow(&mut self, delta: u32, init: Value, cap: u32) -> Option<u32> {
        let prev = self.size();
        let new = prev.checked_add(delta)?;
        let limit = self.ty.limits.max.unwrap_or(u32::MAX).min(cap);
        if new > limit {
            return None;
        }
        try_resize(&mut self.elems, new as usize, init)?;
        self.ty.limits.min = new;
        Some(prev)
    }

    fn range(&self, start: u32, len: u32) -> Result<std::ops::Range<usize>, Trap> {
        let end = u64::from(start) + u64::from(len);
        if end > self.elems.len() as u64 {
            return Err(Trap::TableOutOfBounds);
        }
        Ok(start as usize..end as usize)
    }

    /// `table.fill`
    pub fn fill(&mut self, start: u32, val: Value, len: u32) -> Result<(), Trap> {
        let r = self.range(start, len)?;
        self.elems[r].fill(val);
        Ok(())
    }

    /// `table.copy` within one table; overlap is handled like `memmove`.
    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), Trap> {
        let s = self.range(src, len)?;
        let d = self.range(dst, len)?;
        self.elems.copy_within(s, d.start);
        Ok(())
    }

    /// Read `len` references starting at `start`.
    pub fn slice(&self, start: u32, len: u32) -> Result<&[Value], Trap> {
        let r = self.range(start, len)?;
        Ok(&self.elems[r])
    }

    /// Write `src[src_off..src_off + len]` at `dst`. Used by `table.init`, `table.copy`
    /// across tables and active element segments.
    pub fn init(&mut self, dst: u32, src: &[Value], src_off: u32, len: u32) -> Result<(), Trap> {
        let src_end = u64::from(src_off) + u64::from(len);
        if src_end > src.len() as u64 {
            return Err(Trap::TableOutOfBounds);
        }
        let d = self.range(dst, len)?;
        self.elems[d].copy_from_slice(&src[src_off as usize..src_end as usize]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Limits, RefType};

    fn table(min: u32, max: Option<u32>) -> TableInstance {
        TableInstance::new(TableType {
            elem: RefType::FuncRef,
            limits: Limits::new(min, max),
        })
        .unwrap()
    }

    #[test]
    fn starts_null_and_bounds_checked() {
        let mut t = table(2, None);
        assert_eq!(t.get(1), Ok(Value::FuncRef(None)));
        assert_eq!(t.get(2), Err(Trap::TableOutOfBounds));
        t.set(0, Value::FuncRef(Some(7))).unwrap();
        assert_eq!(t.get(0), Ok(Value::FuncRef(Some(7))));
        assert!(t.set(5, Value::FuncRef(None)).is_err());
    }

    #[test]
    fn grow_respects_max() {
        let mut t = table(1, Some(3));
        assert_eq!(t.grow(2, Value::FuncRef(Some(1)), u32::MAX), Some(1));
        assert_eq!(t.get(2), Ok(Value::FuncRef(Some(1))));
        assert_eq!(t.grow(1, Value::FuncRef(None), u32::MAX), None);
        assert_eq!(t.size(), 3);
    }

    #[test]
    fn fill_copy_init() {
        let mut t = table(4, None);
        let r = Value::FuncRef(Some(3));
        t.fill(1, r, 2).unwrap();
        assert_eq!(t.slice(0, 4).unwrap()[1..3], [r, r]);
        t.copy_within(2, 1, 2).unwrap();
        assert_eq!(t.get(3), Ok(r));
        let src = [Value::FuncRef(Some(9)), Value::FuncRef(Some(8))];
        t.init(0, &src, 1, 1).unwrap();
        assert_eq!(t.get(0), Ok(Value::FuncRef(Some(8))));
        assert!(t.init(3, &src, 0, 2).is_err());
        assert!(t.fill(4, r, 1).is_err());
    }
}
