//! Public model/IR surface.

pub mod instr;
pub mod module;
pub mod types;

pub use instr::{BlockType, Expression, Instruction, MemArg};
pub use module::{
    CustomSection, DataMode, DataSegment, ElemItems, ElemMode, ElementSegment, Function, Global,
    Module,
};
pub use types::{
    DataIdx, ElemIdx, Export, ExportDesc, FuncIdx, FuncType, GlobalIdx, GlobalType, Import,
    ImportDesc, LabelIdx, Limits, LocalIdx, MemIdx, MemoryType, RefType, TableIdx, TableType,
    TypeIdx, ValType, Value,
};
