//! Host environment: the import resolver interface and an in-memory registry.

pub mod func;

use std::collections::HashMap;

use crate::model::{FuncType, GlobalType, MemoryType, TableType, Value};
pub use func::{HostFunc, HostFunction};

/// Supplies bindings for a module's imports, looked up by `(module, name)`.
/// - Functions are host callables with their declared signature.
/// - Tables and memories are addresses the embedder already allocated in the Store.
/// - Globals are plain values; instantiation allocates a fresh global for each.
pub trait ImportResolver {
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<HostFunction>;
    fn resolve_table(&self, module: &str, name: &str, tt: &TableType) -> Option<usize>;
    fn resolve_memory(&self, module: &str, name: &str, mt: &MemoryType) -> Option<usize>;
    fn resolve_global(&self, module: &str, name: &str, gt: &GlobalType) -> Option<Value>;
}

/// One registered binding.
#[derive(Debug, Clone)]
pub enum HostItem {
    Func(HostFunction),
    Table(usize),
    Memory(usize),
    Global(Value),
}

/// Registry of host bindings keyed by `(module, name)`.
#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    items: HashMap<(String, String), HostItem>,
}

impl HostEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding, replacing any previous one under the same key.
    pub fn define(&mut self, module: &str, name: &str, item: HostItem) -> &mut Self {
        self.items.insert((module.into(), name.into()), item);
        self
    }

    pub fn define_func(&mut self, module: &str, name: &str, func: HostFunction) -> &mut Self {
        self.define(module, name, HostItem::Func(func))
    }

    pub fn define_table(&mut self, module: &str, name: &str, addr: usize) -> &mut Self {
        self.define(module, name, HostItem::Table(addr))
    }

    pub fn define_memory(&mut self, module: &str, name: &str, addr: usize) -> &mut Self {
        self.define(module, name, HostItem::Memory(addr))
    }

    pub fn define_global(&mut self, module: &str, name: &str, value: Value) -> &mut Self {
        self.define(module, name, HostItem::Global(value))
    }

    pub fn get(&self, module: &str, name: &str) -> Option<&HostItem> {
        self.items.get(&(module.to_owned(), name.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl ImportResolver for HostEnv {
    fn resolve_func(&self, module: &str, name: &str, _ty: &FuncType) -> Option<HostFunction> {
        match self.get(module, name)? {
            HostItem::Func(f) => Some(f.clone()),
            _ => None,
        }
    }

    fn resolve_table(&self, module: &str, name: &str, _tt: &TableType) -> Option<usize> {
        match self.get(module, name)? {
            HostItem::Table(addr) => Some(*addr),
            _ => None,
        }
    }

    fn resolve_memory(&self, module: &str, name: &str, _mt: &MemoryType) -> Option<usize> {
        match self.get(module, name)? {
            HostItem::Memory(addr) => Some(*addr),
            _ => None,
        }
    }

    fn resolve_global(&self, module: &str, name: &str, _gt: &GlobalType) -> Option<Value> {
        match self.get(module, name)? {
            HostItem::Global(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValType;

    #[test]
    fn lookup_is_by_module_and_name() {
        let mut env = HostEnv::new();
        env.define_global("env", "g", Value::I32(3))
            .define_memory("env", "memory", 0)
            .define_func(
                "env",
                "log",
                HostFunction::new(FuncType::new([ValType::I32], []), |_, _| Ok(vec![])),
            );
        assert_eq!(env.len(), 3);

        let gt = GlobalType::new(ValType::I32, false);
        assert_eq!(env.resolve_global("env", "g", &gt), Some(Value::I32(3)));
        assert_eq!(env.resolve_global("other", "g", &gt), None);
        assert_eq!(env.resolve_memory("env", "memory", &MemoryType::default()), Some(0));
        // Kind must match too.
        assert_eq!(env.resolve_table("env", "memory", &TableType::default()), None);
        let ty = FuncType::new([ValType::I32], []);
        assert!(env.resolve_func("env", "log", &ty).is_some());
        assert!(env.resolve_func("env", "g", &ty).is_none());
    }
}
