//! Central store for every runtime entity. Entities are appended and never removed; an
//! address is the index into the matching vector.

use super::{
    global::GlobalInstance,
    instances::{ExternVal, FuncInstance, ModuleInstance},
    memory::MemoryInstance,
    segments::{DataInstance, ElemInstance},
    table::TableInstance,
    InstanceHandle,
};
use crate::config::Config;
use crate::error::Trap;

#[derive(Debug, Default)]
pub struct Store {
    pub funcs: Vec<FuncInstance>,
    pub tables: Vec<TableInstance>,
    pub mems: Vec<MemoryInstance>,
    pub globals: Vec<GlobalInstance>,
    pub elems: Vec<ElemInstance>,
    pub datas: Vec<DataInstance>,
    pub modules: Vec<ModuleInstance>,
    config: Config,
    /// Interpreter invocations currently active on this store (host re-entry nests them).
    pub(crate) active_invocations: usize,
}

fn push<T>(v: &mut Vec<T>, item: T) -> usize {
    v.push(item);
    v.len() - 1
}

fn invalid(kind: &'static str, addr: usize) -> Trap {
    Trap::InvalidAddress { kind, addr }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn alloc_func(&mut self, f: FuncInstance) -> usize {
        push(&mut self.funcs, f)
    }

    pub fn alloc_table(&mut self, t: TableInstance) -> usize {
        push(&mut self.tables, t)
    }

    pub fn alloc_memory(&mut self, m: MemoryInstance) -> usize {
        push(&mut self.mems, m)
    }

    pub fn alloc_global(&mut self, g: GlobalInstance) -> usize {
        push(&mut self.globals, g)
    }

    pub fn alloc_elem(&mut self, e: ElemInstance) -> usize {
        push(&mut self.elems, e)
    }

    pub fn alloc_data(&mut self, d: DataInstance) -> usize {
        push(&mut self.datas, d)
    }

    pub fn alloc_module(&mut self, m: ModuleInstance) -> InstanceHandle {
        InstanceHandle(push(&mut self.modules, m))
    }

    pub fn instance(&self, handle: InstanceHandle) -> Result<&ModuleInstance, Trap> {
        self.modules
            .get(handle.0)
            .ok_or(invalid("module", handle.0))
    }

    pub(crate) fn instance_mut(
        &mut self,
        handle: InstanceHandle,
    ) -> Result<&mut ModuleInstance, Trap> {
        self.modules
            .get_mut(handle.0)
            .ok_or(invalid("module", handle.0))
    }

    /// Look up an export of a module instance.
    pub fn export(&self, handle: InstanceHandle, name: &str) -> Option<ExternVal> {
        self.modules.get(handle.0)?.export(name)
    }

    pub fn func(&self, addr: usize) -> Result<&FuncInstance, Trap> {
        self.funcs.get(addr).ok_or(invalid("function", addr))
    }

    pub fn table(&self, addr: usize) -> Result<&TableInstance, Trap> {
        self.tables.get(addr).ok_or(invalid("table", addr))
    }

    pub fn table_mut(&mut self, addr: usize) -> Result<&mut TableInstance, Trap> {
        self.tables.get_mut(addr).ok_or(invalid("table", addr))
    }

    pub fn memory(&self, addr: usize) -> Result<&MemoryInstance, Trap> {
        self.mems.get(addr).ok_or(invalid("memory", addr))
    }

    pub fn memory_mut(&mut self, addr: usize) -> Result<&mut MemoryInstance, Trap> {
        self.mems.get_mut(addr).ok_or(invalid("memory", addr))
    }

    pub fn global(&self, addr: usize) -> Result<&GlobalInstance, Trap> {
        self.globals.get(addr).ok_or(invalid("global", addr))
    }

    pub fn global_mut(&mut self, addr: usize) -> Result<&mut GlobalInstance, Trap> {
        self.globals.get_mut(addr).ok_or(invalid("global", addr))
    }

    pub fn elem(&self, addr: usize) -> Result<&ElemInstance, Trap> {
        self.elems.get(addr).ok_or(invalid("element segment", addr))
    }

    pub fn elem_mut(&mut self, addr: usize) -> Result<&mut ElemInstance, Trap> {
        self.elems
            .get_mut(addr)
            .ok_or(invalid("element segment", addr))
    }

    pub fn data(&self, addr: usize) -> Result<&DataInstance, Trap> {
        self.datas.get(addr).ok_or(invalid("data segment", addr))
    }

    pub fn data_mut(&mut self, addr: usize) -> Result<&mut DataInstance, Trap> {
        self.datas
            .get_mut(addr)
            .ok_or(invalid("data segment", addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GlobalType, Limits, MemoryType, ValType, Value};

    #[test]
    fn addresses_are_append_order() {
        let mut s = Store::new();
        let m0 = s.alloc_memory(MemoryInstance::new(MemoryType {
            limits: Limits::new(0, None),
        })
        .unwrap());
        let m1 = s.alloc_memory(MemoryInstance::new(MemoryType {
            limits: Limits::new(1, None),
        })
        .unwrap());
        assert_eq!((m0, m1), (0, 1));
        assert_eq!(s.memory(1).unwrap().size_pages(), 1);
        assert_eq!(
            s.memory(2).unwrap_err(),
            Trap::InvalidAddress {
                kind: "memory",
                addr: 2
            }
        );

        let g = s.alloc_global(GlobalInstance::new(
            GlobalType::new(ValType::I64, true),
            Value::I64(9),
        ));
        assert_eq!(s.global(g).unwrap().get(), Value::I64(9));
    }

    #[test]
    fn with_config_keeps_limits() {
        let s = Store::with_config(Config::default().with_max_call_depth(3));
        assert_eq!(s.config().max_call_depth, 3);
        assert!(s.instance(InstanceHandle(0)).is_err());
    }
}
