//! Runtime store, instance types and instantiation.

pub mod global;
pub mod instances;
pub mod instantiate;
pub mod memory;
pub mod segments;
pub mod store;
pub mod table;

pub use global::GlobalInstance;
pub use instances::{ExternVal, FuncInstance, ModuleInstance};
pub use instantiate::instantiate;
pub use memory::{MemoryInstance, PAGE_SIZE};
pub use segments::{DataInstance, ElemInstance};
pub use store::Store;
pub use table::TableInstance;

/// Resize `buf` to `len`, filling new slots with `fill`. Returns `None` instead of aborting
/// when the allocator cannot provide the extra capacity.
pub(crate) fn try_resize<T: Clone>(buf: &mut Vec<T>, len: usize, fill: T) -> Option<()> {
    if let Some(extra) = len.checked_sub(buf.len()) {
        buf.try_reserve_exact(extra).ok()?;
    }
    buf.resize(len, fill);
    Some(())
}

/// Handle to a live module instance within the Store (its index in `Store::modules`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstanceHandle(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_resize_grows_and_fills() {
        let mut v = vec![1u8, 2];
        assert_eq!(try_resize(&mut v, 4, 7), Some(()));
        assert_eq!(v, [1, 2, 7, 7]);
    }

    #[test]
    fn try_resize_reports_unsatisfiable_requests() {
        let mut v = vec![0u8; 4];
        assert_eq!(try_resize(&mut v, usize::MAX, 0), None);
        assert_eq!(v.len(), 4);
    }
}
