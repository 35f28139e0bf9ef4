//! Module-level IR: module structure, function bodies, globals, segments.

use super::instr::Expression;
use super::types::{
    Export, FuncIdx, FuncType, GlobalType, Import, ImportDesc, MemIdx, MemoryType, RefType,
    TableIdx, TableType, TypeIdx, ValType,
};

/// A defined function: signature index, declared locals (expanded, params excluded) and body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Function {
    pub type_idx: TypeIdx,
    pub locals: Vec<ValType>,
    pub body: Expression,
}

/// Global with type and initializer expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: Expression,
}

/// How an element segment is applied at instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElemMode {
    Passive,
    Active { table: TableIdx, offset: Expression },
    Declarative,
}

/// Element segment items, kept in whichever form the binary used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElemItems {
    Funcs(Vec<FuncIdx>),
    Exprs(Vec<Expression>),
}

impl ElemItems {
    pub fn len(&self) -> usize {
        match self {
            ElemItems::Funcs(f) => f.len(),
            ElemItems::Exprs(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSegment {
    pub ty: RefType,
    pub items: ElemItems,
    pub mode: ElemMode,
}

/// How a data segment is applied at instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMode {
    Passive,
    Active { memory: MemIdx, offset: Expression },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    pub mode: DataMode,
    pub init: Vec<u8>,
}

/// Custom section: name plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomSection {
    pub name: String,
    pub payload: Vec<u8>,
}

/// The decoded, immutable module. Sections missing from the binary stay empty / `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    // Types and declarations
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type indices for each defined (non-imported) function, in module order.
    pub func_type_indices: Vec<TypeIdx>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,

    // Exports and start
    pub exports: Vec<Export>,
    pub start: Option<FuncIdx>,

    // Segments and code
    pub elements: Vec<ElementSegment>,
    /// Defined functions; pairs 1:1 with `func_type_indices`.
    pub functions: Vec<Function>,
    pub data_count: Option<u32>,
    pub data: Vec<DataSegment>,
    pub customs: Vec<CustomSection>,

    // Precomputed import counts for index space arithmetic.
    pub imported_funcs: u32,
    pub imported_tables: u32,
    pub imported_memories: u32,
    pub imported_globals: u32,
}

impl Module {
    /// Returns total counts including imports for each index space.
    pub fn total_funcs(&self) -> u32 {
        self.imported_funcs + (self.func_type_indices.len() as u32)
    }
    pub fn total_tables(&self) -> u32 {
        self.imported_tables + (self.tables.len() as u32)
    }
    pub fn total_memories(&self) -> u32 {
        self.imported_memories + (self.memories.len() as u32)
    }
    pub fn total_globals(&self) -> u32 {
        self.imported_globals + (self.globals.len() as u32)
    }

    /// Signature of any function in the module's index space, imported or defined.
    pub fn func_type_of(&self, func_idx: FuncIdx) -> Option<&FuncType> {
        let type_idx = if func_idx < self.imported_funcs {
            self.imports
                .iter()
                .filter_map(|imp| match imp.desc {
                    ImportDesc::Func(t) => Some(t),
                    _ => None,
                })
                .nth(func_idx as usize)?
        } else {
            *self
                .func_type_indices
                .get((func_idx - self.imported_funcs) as usize)?
        };
        self.types.get(type_idx as usize)
    }
}
