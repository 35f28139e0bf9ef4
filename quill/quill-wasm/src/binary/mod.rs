//! Binary decoding for the WebAssembly module format: cursor, LEB128, vector/name helpers,
//! section decoders and the instruction decoder.
//! Low-level reads report `BinaryReadError`; the section and instruction layers lift those
//! into `crate::error::DecodeError`.

pub mod cursor;
pub mod instr;
pub mod leb128;
pub mod opcode;
pub mod reader;
pub mod sections;

use thiserror::Error;

/// Result alias for low-level binary reads.
pub type Result<T> = core::result::Result<T, BinaryReadError>;

/// Errors that can occur while reading raw values from a byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryReadError {
    #[error("unexpected EOF at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("LEB128 overflow (target bits={target_bits}) at offset {offset}")]
    Leb128Overflow { target_bits: u8, offset: usize },

    #[error("too many bytes in LEB128 (limit={limit}) at offset {offset}")]
    Leb128TooManyBytes { limit: u8, offset: usize },

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("malformed binary at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}
