//! Structured control-flow resolution: finding the `else`/`end` that close a construct.

use std::collections::HashMap;

use crate::error::Trap;
use crate::model::Instruction;

/// Positions closing the construct opened at some `block`/`loop`/`if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEnd {
    /// The `else` belonging to an `if`, if present.
    pub else_pc: Option<usize>,
    pub end_pc: usize,
}

/// Scan forward from the opener at `start` for its matching `else` and `end`.
pub fn find_block_end(instrs: &[Instruction], start: usize) -> Result<BlockEnd, Trap> {
    let mut depth = 0usize;
    let mut else_pc = None;
    for (pc, instr) in instrs.iter().enumerate().skip(start + 1) {
        match instr {
            i if i.opens_block() => depth += 1,
            Instruction::Else if depth == 0 => else_pc = Some(pc),
            Instruction::End if depth == 0 => return Ok(BlockEnd { else_pc, end_pc: pc }),
            Instruction::End => depth -= 1,
            _ => {}
        }
    }
    Err(Trap::MalformedControl("unterminated block"))
}

/// Scan results memoised per `(function address, opener pc)` for one invocation.
#[derive(Debug, Default)]
pub struct BlockEnds {
    cache: HashMap<(usize, usize), BlockEnd>,
}

impl BlockEnds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &mut self,
        func_addr: usize,
        instrs: &[Instruction],
        start: usize,
    ) -> Result<BlockEnd, Trap> {
        if let Some(found) = self.cache.get(&(func_addr, start)) {
            return Ok(*found);
        }
        let found = find_block_end(instrs, start)?;
        self.cache.insert((func_addr, start), found);
        Ok(found)
    }
}
