//! Execution engine: the interleaved stack, control-flow resolution, numeric semantics and
//! the interpreter loop.

pub mod control;
pub mod interpreter;
pub mod numeric;
pub mod stack;

pub use interpreter::invoke_func;
pub use stack::{Frame, Label, Stack, StackEntry};
