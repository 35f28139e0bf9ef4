//! Decoded instructions and expressions.

use std::sync::Arc;

use super::types::{
    DataIdx, ElemIdx, FuncIdx, FuncType, GlobalIdx, LabelIdx, LocalIdx, RefType, TableIdx,
    TypeIdx, ValType,
};

/// Block signature of `block`/`loop`/`if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// `0x40`: no params, no results.
    Empty,
    /// A single result of the given type.
    Value(ValType),
    /// Index into the type section; params and results come from that function type.
    Func(TypeIdx),
}

impl BlockType {
    /// `(param arity, result arity)` of the construct. `None` if a type index does not
    /// name a type in `types`.
    pub fn arity(&self, types: &[FuncType]) -> Option<(usize, usize)> {
        match self {
            BlockType::Empty => Some((0, 0)),
            BlockType::Value(_) => Some((0, 1)),
            BlockType::Func(idx) => types
                .get(*idx as usize)
                .map(|ft| (ft.params.len(), ft.results.len())),
        }
    }
}

/// Memory immediate: alignment hint (log2) and static offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

/// One decoded instruction. Float constants carry raw IEEE-754 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    // control
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(LabelIdx),
    BrIf(LabelIdx),
    BrTable { targets: Box<[LabelIdx]>, default: LabelIdx },
    Return,
    Call(FuncIdx),
    CallIndirect { type_idx: TypeIdx, table: TableIdx },

    // reference
    RefNull(RefType),
    RefIsNull,
    RefFunc(FuncIdx),

    // parametric
    Drop,
    Select,
    SelectTyped(Box<[ValType]>),

    // variable
    LocalGet(LocalIdx),
    LocalSet(LocalIdx),
    LocalTee(LocalIdx),
    GlobalGet(GlobalIdx),
    GlobalSet(GlobalIdx),

    // table
    TableGet(TableIdx),
    TableSet(TableIdx),
    TableInit { elem: ElemIdx, table: TableIdx },
    ElemDrop(ElemIdx),
    TableCopy { dst: TableIdx, src: TableIdx },
    TableGrow(TableIdx),
    TableSize(TableIdx),
    TableFill(TableIdx),

    // memory
    I32Load(MemArg),
    I64Load(MemArg),
    F32Load(MemArg),
    F64Load(MemArg),
    I32Load8S(MemArg),
    I32Load8U(MemArg),
    I32Load16S(MemArg),
    I32Load16U(MemArg),
    I64Load8S(MemArg),
    I64Load8U(MemArg),
    I64Load16S(MemArg),
    I64Load16U(MemArg),
    I64Load32S(MemArg),
    I64Load32U(MemArg),
    I32Store(MemArg),
    I64Store(MemArg),
    F32Store(MemArg),
    F64Store(MemArg),
    I32Store8(MemArg),
    I32Store16(MemArg),
    I64Store8(MemArg),
    I64Store16(MemArg),
    I64Store32(MemArg),
    MemorySize,
    MemoryGrow,
    MemoryInit(DataIdx),
    DataDrop(DataIdx),
    MemoryCopy,
    MemoryFill,

    // numeric: constants
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),

    // numeric: i32 tests/comparisons
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,

    // numeric: i64 tests/comparisons
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,

    // numeric: float comparisons
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,

    // numeric: i32 arithmetic
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,

    // numeric: i64 arithmetic
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    // numeric: f32 arithmetic
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,

    // numeric: f64 arithmetic
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    // numeric: conversions
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,

    // numeric: sign extension
    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,

    // numeric: saturating truncation
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
}

impl Instruction {
    /// True for the three constructs that open a nested label.
    pub fn opens_block(&self) -> bool {
        matches!(
            self,
            Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_)
        )
    }
}

/// An instruction sequence terminated by `end`: a function body, global initializer,
/// element item or segment offset. Cheap to clone; frames share the body with the Module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    instrs: Arc<[Instruction]>,
}

impl Expression {
    pub fn new(instrs: Vec<Instruction>) -> Self {
        Self {
            instrs: instrs.into(),
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instrs
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instrs.get(pc)
    }
}

impl Default for Expression {
    fn default() -> Self {
        Self::new(vec![Instruction::End])
    }
}
