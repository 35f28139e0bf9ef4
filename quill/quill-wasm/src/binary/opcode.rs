//! Opcode byte values for the instructions that carry immediates or affect nesting.
//! Immediate-free numeric opcodes are matched directly in the instruction decoder.

pub const UNREACHABLE: u8 = 0x00;
pub const NOP: u8 = 0x01;
pub const BLOCK: u8 = 0x02;
pub const LOOP: u8 = 0x03;
pub const IF: u8 = 0x04;
pub const ELSE: u8 = 0x05;
pub const END: u8 = 0x0B;
pub const BR: u8 = 0x0C;
pub const BR_IF: u8 = 0x0D;
pub const BR_TABLE: u8 = 0x0E;
pub const RETURN: u8 = 0x0F;
pub const CALL: u8 = 0x10;
pub const CALL_INDIRECT: u8 = 0x11;

pub const DROP: u8 = 0x1A;
pub const SELECT: u8 = 0x1B;
pub const SELECT_TYPED: u8 = 0x1C;

pub const LOCAL_GET: u8 = 0x20;
pub const LOCAL_SET: u8 = 0x21;
pub const LOCAL_TEE: u8 = 0x22;
pub const GLOBAL_GET: u8 = 0x23;
pub const GLOBAL_SET: u8 = 0x24;
pub const TABLE_GET: u8 = 0x25;
pub const TABLE_SET: u8 = 0x26;

// Loads 0x28..=0x35, stores 0x36..=0x3E
pub const I32_LOAD: u8 = 0x28;
pub const I64_STORE32: u8 = 0x3E;
pub const MEMORY_SIZE: u8 = 0x3F;
pub const MEMORY_GROW: u8 = 0x40;

pub const I32_CONST: u8 = 0x41;
pub const I64_CONST: u8 = 0x42;
pub const F32_CONST: u8 = 0x43;
pub const F64_CONST: u8 = 0x44;

pub const REF_NULL: u8 = 0xD0;
pub const REF_IS_NULL: u8 = 0xD1;
pub const REF_FUNC: u8 = 0xD2;

/// Prefix for saturating truncation, bulk memory and table instructions.
pub const PREFIX_FC: u8 = 0xFC;

/// Sub-opcodes under `0xFC` (LEB128 u32 after the prefix).
pub mod fc {
    pub const I32_TRUNC_SAT_F32_S: u32 = 0;
    pub const I64_TRUNC_SAT_F64_U: u32 = 7;
    pub const MEMORY_INIT: u32 = 8;
    pub const DATA_DROP: u32 = 9;
    pub const MEMORY_COPY: u32 = 10;
    pub const MEMORY_FILL: u32 = 11;
    pub const TABLE_INIT: u32 = 12;
    pub const ELEM_DROP: u32 = 13;
    pub const TABLE_COPY: u32 = 14;
    pub const TABLE_GROW: u32 = 15;
    pub const TABLE_SIZE: u32 = 16;
    pub const TABLE_FILL: u32 = 17;
}

/// Block type byte for "no params, no results".
pub const BLOCKTYPE_EMPTY: u8 = 0x40;
