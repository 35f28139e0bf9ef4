//! Instruction and expression decoding.
//!
//! An expression is read instruction by instruction while tracking block nesting; it ends at
//! the `end` that closes depth 0, and that `end` is kept as the last instruction.

use super::{cursor::Cursor, leb128, opcode as op, reader::read_vec};
use crate::error::DecodeError;
use crate::model::{BlockType, Expression, FuncType, Instruction, MemArg, RefType, ValType};

type Result<T> = core::result::Result<T, DecodeError>;

/// Loads and stores in opcode order, `0x28..=0x3E`.
const MEMORY_OPS: [fn(MemArg) -> Instruction; 23] = [
    Instruction::I32Load,
    Instruction::I64Load,
    Instruction::F32Load,
    Instruction::F64Load,
    Instruction::I32Load8S,
    Instruction::I32Load8U,
    Instruction::I32Load16S,
    Instruction::I32Load16U,
    Instruction::I64Load8S,
    Instruction::I64Load8U,
    Instruction::I64Load16S,
    Instruction::I64Load16U,
    Instruction::I64Load32S,
    Instruction::I64Load32U,
    Instruction::I32Store,
    Instruction::I64Store,
    Instruction::F32Store,
    Instruction::F64Store,
    Instruction::I32Store8,
    Instruction::I32Store16,
    Instruction::I64Store8,
    Instruction::I64Store16,
    Instruction::I64Store32,
];

/// Saturating truncations in sub-opcode order, `0xFC 0..=7`.
const TRUNC_SAT_OPS: [Instruction; 8] = [
    Instruction::I32TruncSatF32S,
    Instruction::I32TruncSatF32U,
    Instruction::I32TruncSatF64S,
    Instruction::I32TruncSatF64U,
    Instruction::I64TruncSatF32S,
    Instruction::I64TruncSatF32U,
    Instruction::I64TruncSatF64S,
    Instruction::I64TruncSatF64U,
];

/// Decode one expression. `types` is the module's type section, used to check
/// type-indexed block types.
pub fn read_expression(cur: &mut Cursor, types: &[FuncType]) -> Result<Expression> {
    let mut instrs = Vec::new();
    let mut depth: usize = 0;
    loop {
        let instr = read_instruction(cur, types)?;
        match &instr {
            i if i.opens_block() => depth += 1,
            Instruction::End if depth == 0 => {
                instrs.push(instr);
                break;
            }
            Instruction::End => depth -= 1,
            _ => {}
        }
        instrs.push(instr);
    }
    Ok(Expression::new(instrs))
}

/// Decode a single instruction and its immediates.
pub fn read_instruction(cur: &mut Cursor, types: &[FuncType]) -> Result<Instruction> {
    use Instruction::*;

    let offset = cur.offset();
    let opcode = cur.read_u8()?;
    let instr = match opcode {
        op::UNREACHABLE => Unreachable,
        op::NOP => Nop,
        op::BLOCK => Block(read_block_type(cur, types)?),
        op::LOOP => Loop(read_block_type(cur, types)?),
        op::IF => If(read_block_type(cur, types)?),
        op::ELSE => Else,
        op::END => End,
        op::BR => Br(leb128::read_uleb_u32(cur)?),
        op::BR_IF => BrIf(leb128::read_uleb_u32(cur)?),
        op::BR_TABLE => {
            let targets: Vec<u32> = read_vec(cur, leb128::read_uleb_u32)?;
            let default = leb128::read_uleb_u32(cur)?;
            BrTable {
                targets: targets.into_boxed_slice(),
                default,
            }
        }
        op::RETURN => Return,
        op::CALL => Call(leb128::read_uleb_u32(cur)?),
        op::CALL_INDIRECT => {
            let type_idx = leb128::read_uleb_u32(cur)?;
            let table = leb128::read_uleb_u32(cur)?;
            CallIndirect { type_idx, table }
        }

        op::DROP => Drop,
        op::SELECT => Select,
        op::SELECT_TYPED => {
            let tys: Vec<ValType> = read_vec(cur, read_val_type)?;
            SelectTyped(tys.into_boxed_slice())
        }

        op::LOCAL_GET => LocalGet(leb128::read_uleb_u32(cur)?),
        op::LOCAL_SET => LocalSet(leb128::read_uleb_u32(cur)?),
        op::LOCAL_TEE => LocalTee(leb128::read_uleb_u32(cur)?),
        op::GLOBAL_GET => GlobalGet(leb128::read_uleb_u32(cur)?),
        op::GLOBAL_SET => GlobalSet(leb128::read_uleb_u32(cur)?),
        op::TABLE_GET => TableGet(leb128::read_uleb_u32(cur)?),
        op::TABLE_SET => TableSet(leb128::read_uleb_u32(cur)?),

        op::I32_LOAD..=op::I64_STORE32 => {
            let arg = read_memarg(cur)?;
            MEMORY_OPS[(opcode - op::I32_LOAD) as usize](arg)
        }
        op::MEMORY_SIZE => {
            read_zero_byte(cur)?;
            MemorySize
        }
        op::MEMORY_GROW => {
            read_zero_byte(cur)?;
            MemoryGrow
        }

        op::I32_CONST => I32Const(leb128::read_sleb_i32(cur)?),
        op::I64_CONST => I64Const(leb128::read_sleb_i64(cur)?),
        op::F32_CONST => F32Const(cur.read_u32_le()?),
        op::F64_CONST => F64Const(cur.read_u64_le()?),

        op::REF_NULL => RefNull(read_ref_type(cur)?),
        op::REF_IS_NULL => RefIsNull,
        op::REF_FUNC => RefFunc(leb128::read_uleb_u32(cur)?),

        op::PREFIX_FC => read_prefixed(cur, offset)?,

        other => numeric(other).ok_or(DecodeError::UnknownOpcode {
            opcode: other,
            sub: None,
            offset,
        })?,
    };
    Ok(instr)
}

fn read_prefixed(cur: &mut Cursor, offset: usize) -> Result<Instruction> {
    use super::opcode::fc;
    use Instruction::*;

    let sub = leb128::read_uleb_u32(cur)?;
    let instr = match sub {
        fc::I32_TRUNC_SAT_F32_S..=fc::I64_TRUNC_SAT_F64_U => TRUNC_SAT_OPS[sub as usize].clone(),
        fc::MEMORY_INIT => {
            let data = leb128::read_uleb_u32(cur)?;
            read_zero_byte(cur)?;
            MemoryInit(data)
        }
        fc::DATA_DROP => DataDrop(leb128::read_uleb_u32(cur)?),
        fc::MEMORY_COPY => {
            read_zero_byte(cur)?;
            read_zero_byte(cur)?;
            MemoryCopy
        }
        fc::MEMORY_FILL => {
            read_zero_byte(cur)?;
            MemoryFill
        }
        fc::TABLE_INIT => {
            let elem = leb128::read_uleb_u32(cur)?;
            let table = leb128::read_uleb_u32(cur)?;
            TableInit { elem, table }
        }
        fc::ELEM_DROP => ElemDrop(leb128::read_uleb_u32(cur)?),
        fc::TABLE_COPY => {
            let dst = leb128::read_uleb_u32(cur)?;
            let src = leb128::read_uleb_u32(cur)?;
            TableCopy { dst, src }
        }
        fc::TABLE_GROW => TableGrow(leb128::read_uleb_u32(cur)?),
        fc::TABLE_SIZE => TableSize(leb128::read_uleb_u32(cur)?),
        fc::TABLE_FILL => TableFill(leb128::read_uleb_u32(cur)?),
        _ => {
            return Err(DecodeError::UnknownOpcode {
                opcode: op::PREFIX_FC,
                sub: Some(sub),
                offset,
            })
        }
    };
    Ok(instr)
}

/// Three-way block type: empty, single value type, or s33 type index.
pub fn read_block_type(cur: &mut Cursor, types: &[FuncType]) -> Result<BlockType> {
    let offset = cur.offset();
    let b = cur.peek_u8()?;
    if b == op::BLOCKTYPE_EMPTY {
        cur.read_u8()?;
        return Ok(BlockType::Empty);
    }
    if let Some(vt) = ValType::from_byte(b) {
        cur.read_u8()?;
        return Ok(BlockType::Value(vt));
    }
    let idx = leb128::read_sleb_i33(cur)?;
    if idx < 0 {
        return Err(DecodeError::Malformed {
            offset,
            msg: "invalid block type",
        });
    }
    if idx as usize >= types.len() {
        return Err(DecodeError::Malformed {
            offset,
            msg: "block type index out of range",
        });
    }
    Ok(BlockType::Func(idx as u32))
}

pub(crate) fn read_val_type(cur: &mut Cursor) -> Result<ValType> {
    let offset = cur.offset();
    let b = cur.read_u8()?;
    ValType::from_byte(b).ok_or(DecodeError::Malformed {
        offset,
        msg: "invalid value type",
    })
}

pub(crate) fn read_ref_type(cur: &mut Cursor) -> Result<RefType> {
    let offset = cur.offset();
    match cur.read_u8()? {
        0x70 => Ok(RefType::FuncRef),
        0x6F => Ok(RefType::ExternRef),
        _ => Err(DecodeError::Malformed {
            offset,
            msg: "invalid reference type",
        }),
    }
}

fn read_memarg(cur: &mut Cursor) -> Result<MemArg> {
    let align = leb128::read_uleb_u32(cur)?;
    let offset = leb128::read_uleb_u32(cur)?;
    Ok(MemArg { align, offset })
}

fn read_zero_byte(cur: &mut Cursor) -> Result<()> {
    let offset = cur.offset();
    if cur.read_u8()? != 0x00 {
        return Err(DecodeError::Malformed {
            offset,
            msg: "zero byte expected",
        });
    }
    Ok(())
}

/// Immediate-free numeric opcodes, `0x45..=0xC4`.
fn numeric(opcode: u8) -> Option<Instruction> {
    use Instruction::*;
    Some(match opcode {
        0x45 => I32Eqz,
        0x46 => I32Eq,
        0x47 => I32Ne,
        0x48 => I32LtS,
        0x49 => I32LtU,
        0x4A => I32GtS,
        0x4B => I32GtU,
        0x4C => I32LeS,
        0x4D => I32LeU,
        0x4E => I32GeS,
        0x4F => I32GeU,

        0x50 => I64Eqz,
        0x51 => I64Eq,
        0x52 => I64Ne,
        0x53 => I64LtS,
        0x54 => I64LtU,
        0x55 => I64GtS,
        0x56 => I64GtU,
        0x57 => I64LeS,
        0x58 => I64LeU,
        0x59 => I64GeS,
        0x5A => I64GeU,

        0x5B => F32Eq,
        0x5C => F32Ne,
        0x5D => F32Lt,
        0x5E => F32Gt,
        0x5F => F32Le,
        0x60 => F32Ge,

        0x61 => F64Eq,
        0x62 => F64Ne,
        0x63 => F64Lt,
        0x64 => F64Gt,
        0x65 => F64Le,
        0x66 => F64Ge,

        0x67 => I32Clz,
        0x68 => I32Ctz,
        0x69 => I32Popcnt,
        0x6A => I32Add,
        0x6B => I32Sub,
        0x6C => I32Mul,
        0x6D => I32DivS,
        0x6E => I32DivU,
        0x6F => I32RemS,
        0x70 => I32RemU,
        0x71 => I32And,
        0x72 => I32Or,
        0x73 => I32Xor,
        0x74 => I32Shl,
        0x75 => I32ShrS,
        0x76 => I32ShrU,
        0x77 => I32Rotl,
        0x78 => I32Rotr,

        0x79 => I64Clz,
        0x7A => I64Ctz,
        0x7B => I64Popcnt,
        0x7C => I64Add,
        0x7D => I64Sub,
        0x7E => I64Mul,
        0x7F => I64DivS,
        0x80 => I64DivU,
        0x81 => I64RemS,
        0x82 => I64RemU,
        0x83 => I64And,
        0x84 => I64Or,
        0x85 => I64Xor,
        0x86 => I64Shl,
        0x87 => I64ShrS,
        0x88 => I64ShrU,
        0x89 => I64Rotl,
        0x8A => I64Rotr,

        0x8B => F32Abs,
        0x8C => F32Neg,
        0x8D => F32Ceil,
        0x8E => F32Floor,
        0x8F => F32Trunc,
        0x90 => F32Nearest,
        0x91 => F32Sqrt,
        0x92 => F32Add,
        0x93 => F32Sub,
        0x94 => F32Mul,
        0x95 => F32Div,
        0x96 => F32Min,
        0x97 => F32Max,
        0x98 => F32Copysign,

        0x99 => F64Abs,
        0x9A => F64Neg,
        0x9B => F64Ceil,
        0x9C => F64Floor,
        0x9D => F64Trunc,
        0x9E => F64Nearest,
        0x9F => F64Sqrt,
        0xA0 => F64Add,
        0xA1 => F64Sub,
        0xA2 => F64Mul,
        0xA3 => F64Div,
        0xA4 => F64Min,
        0xA5 => F64Max,
        0xA6 => F64Copysign,

        0xA7 => I32WrapI64,
        0xA8 => I32TruncF32S,
        0xA9 => I32TruncF32U,
        0xAA => I32TruncF64S,
        0xAB => I32TruncF64U,
        0xAC => I64ExtendI32S,
        0xAD => I64ExtendI32U,
        0xAE => I64TruncF32S,
        0xAF => I64TruncF32U,
        0xB0 => I64TruncF64S,
        0xB1 => I64TruncF64U,
        0xB2 => F32ConvertI32S,
        0xB3 => F32ConvertI32U,
        0xB4 => F32ConvertI64S,
        0xB5 => F32ConvertI64U,
        0xB6 => F32DemoteF64,
        0xB7 => F64ConvertI32S,
        0xB8 => F64ConvertI32U,
        0xB9 => F64ConvertI64S,
        0xBA => F64ConvertI64U,
        0xBB => F64PromoteF32,
        0xBC => I32ReinterpretF32,
        0xBD => I64ReinterpretF64,
        0xBE => F32ReinterpretI32,
        0xBF => F64ReinterpretI64,

        0xC0 => I32Extend8S,
        0xC1 => I32Extend16S,
        0xC2 => I64Extend8S,
        0xC3 => I64Extend16S,
        0xC4 => I64Extend32S,
        _ => return None,
    })
}
