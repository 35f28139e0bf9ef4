//! Crate-level error types for quill-wasm.
//!
//! Decode errors and traps are disjoint: the decoder never traps and the interpreter never
//! reports a decode error. Instantiation sits between them and wraps traps raised while
//! evaluating initializers or running the start function.

use thiserror::Error;

use crate::model::ValType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Binary(#[from] crate::binary::BinaryReadError),

    #[error("bad magic number {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported binary version {found}")]
    UnsupportedVersion { found: u32 },

    #[error("unknown section id {id} at offset {offset}")]
    UnknownSection { id: u8, offset: usize },

    #[error("unknown opcode {opcode:#04x}{} at offset {offset}", sub.map(|s| format!(" {s}")).unwrap_or_default())]
    UnknownOpcode {
        opcode: u8,
        sub: Option<u32>,
        offset: usize,
    },

    #[error("section {id} declared {declared} bytes but {consumed} were decoded")]
    SectionSizeMismatch {
        id: u8,
        declared: u32,
        consumed: usize,
    },

    #[error("function section declares {functions} functions but code section has {bodies} bodies")]
    FunctionCodeMismatch { functions: usize, bodies: usize },

    #[error("data count section declares {declared} segments but data section has {found}")]
    DataCountMismatch { declared: u32, found: usize },

    #[error("malformed module at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("unresolved import: {module}.{name}")]
    UnresolvedImport { module: String, name: String },

    #[error("type mismatch ({context}): expected {expected}, found {found}")]
    TypeMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    #[error("index out of bounds ({context}): {index}")]
    IndexOutOfBounds { context: &'static str, index: u32 },

    #[error("{context} exceeds configured limit: requested {requested}, limit {limit}")]
    ResourceLimit {
        context: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("element segment initialization out of bounds")]
    ElemOutOfBounds,

    #[error("data segment initialization out of bounds")]
    DataOutOfBounds,

    #[error("trap while evaluating {context}")]
    InitTrap {
        context: &'static str,
        #[source]
        trap: Trap,
    },

    #[error("trap while running start function")]
    StartTrap(#[source] Trap),
}

/// Abnormal termination of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("value stack exhausted")]
    StackOverflow,

    #[error("call stack exhausted")]
    CallStackExhausted,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValType, found: ValType },

    #[error("integer divide by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("invalid conversion to integer")]
    InvalidConversion,

    #[error("out of bounds memory access at {addr} (+{len})")]
    MemoryOutOfBounds { addr: u64, len: u64 },

    #[error("out of bounds table access")]
    TableOutOfBounds,

    #[error("undefined element {index}")]
    UndefinedElement { index: u32 },

    #[error("uninitialized element {index}")]
    UninitializedElement { index: u32 },

    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,

    #[error("{space} index {index} out of range")]
    IndexOutOfRange { space: &'static str, index: u32 },

    #[error("invalid {kind} address {addr}")]
    InvalidAddress { kind: &'static str, addr: usize },

    #[error("global {index} is immutable")]
    ImmutableGlobal { index: u32 },

    #[error("export not found: {0}")]
    ExportNotFound(String),

    #[error("export {0} is not a function")]
    NotAFunction(String),

    #[error("argument mismatch: expected {expected} values, got {found}")]
    ArgumentMismatch { expected: usize, found: usize },

    #[error("malformed control flow: {0}")]
    MalformedControl(&'static str),

    #[error("host error: {0}")]
    Host(String),

    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),
}
