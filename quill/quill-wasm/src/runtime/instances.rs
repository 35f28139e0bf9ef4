//! Function and module instance records owned by the Store.

use std::collections::HashMap;
use std::sync::Arc;

use super::InstanceHandle;
use crate::error::Trap;
use crate::host::HostFunction;
use crate::model::{FuncType, Module};

/// A function instance: a defined function of some module instance, or a host callable.
#[derive(Debug, Clone)]
pub enum FuncInstance {
    Wasm {
        ty: FuncType,
        /// Owning module instance.
        module: InstanceHandle,
        /// Index into `Module::functions` (imports excluded).
        def_index: usize,
    },
    Host(HostFunction),
}

impl FuncInstance {
    pub fn ty(&self) -> &FuncType {
        match self {
            FuncInstance::Wasm { ty, .. } => ty,
            FuncInstance::Host(h) => &h.ty,
        }
    }
}

/// An exported entity, by store address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternVal {
    Func(usize),
    Table(usize),
    Memory(usize),
    Global(usize),
}

/// Store addresses for every index space of one instantiated module, imports first.
#[derive(Debug, Clone, Default)]
pub struct ModuleInstance {
    pub funcs: Vec<usize>,
    pub tables: Vec<usize>,
    pub memories: Vec<usize>,
    pub globals: Vec<usize>,
    pub elems: Vec<usize>,
    pub datas: Vec<usize>,
    pub exports: HashMap<String, ExternVal>,
    /// The decoded module this instance was built from.
    pub module: Arc<Module>,
}

fn lookup(space: &'static str, addrs: &[usize], index: u32) -> Result<usize, Trap> {
    addrs
        .get(index as usize)
        .copied()
        .ok_or(Trap::IndexOutOfRange { space, index })
}

impl ModuleInstance {
    pub fn export(&self, name: &str) -> Option<ExternVal> {
        self.exports.get(name).copied()
    }

    pub fn func_addr(&self, index: u32) -> Result<usize, Trap> {
        lookup("function", &self.funcs, index)
    }

    pub fn table_addr(&self, index: u32) -> Result<usize, Trap> {
        lookup("table", &self.tables, index)
    }

    pub fn memory_addr(&self, index: u32) -> Result<usize, Trap> {
        lookup("memory", &self.memories, index)
    }

    pub fn global_addr(&self, index: u32) -> Result<usize, Trap> {
        lookup("global", &self.globals, index)
    }

    pub fn elem_addr(&self, index: u32) -> Result<usize, Trap> {
        lookup("element segment", &self.elems, index)
    }

    pub fn data_addr(&self, index: u32) -> Result<usize, Trap> {
        lookup("data segment", &self.datas, index)
    }

    pub fn func_type(&self, type_idx: u32) -> Result<&FuncType, Trap> {
        self.module
            .types
            .get(type_idx as usize)
            .ok_or(Trap::IndexOutOfRange {
                space: "type",
                index: type_idx,
            })
    }
}
