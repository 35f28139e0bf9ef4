//! The interleaved execution stack: operand values, control labels and call frames share one
//! vector, and a side index records where each frame sits.

use crate::error::Trap;
use crate::model::{Expression, ValType, Value};
use crate::runtime::InstanceHandle;

/// Control label pushed on entry to `block`, `loop` or `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    /// Result count of the construct.
    pub arity: usize,
    /// Parameter count of the construct.
    pub params: usize,
    /// Index of the opening instruction.
    pub start: usize,
    /// Index of the matching `end`.
    pub end: usize,
    pub is_loop: bool,
}

impl Label {
    /// Values carried by a branch to this label: a loop restarts with its parameters, every
    /// other construct exits with its results.
    pub fn branch_arity(&self) -> usize {
        if self.is_loop {
            self.params
        } else {
            self.arity
        }
    }
}

/// Activation record of one function call.
#[derive(Debug, Clone)]
pub struct Frame {
    pub module: InstanceHandle,
    pub func_addr: usize,
    pub locals: Vec<Value>,
    /// Resume position while a callee runs.
    pub pc: usize,
    /// Result count of the function.
    pub arity: usize,
    pub body: Expression,
}

#[derive(Debug, Clone)]
pub enum StackEntry {
    Value(Value),
    Label(Label),
    Frame(Frame),
}

/// Where execution continues after a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchTarget {
    /// Continue at this instruction index of the current body.
    Jump(usize),
    /// The branch left every label of the frame; behave like `return`.
    Return,
}

#[derive(Debug)]
pub struct Stack {
    entries: Vec<StackEntry>,
    /// Indices into `entries` of every frame, innermost last.
    frames: Vec<usize>,
    max_entries: usize,
}

impl Stack {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            frames: Vec::new(),
            max_entries,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn push(&mut self, entry: StackEntry) -> Result<(), Trap> {
        if self.entries.len() >= self.max_entries {
            return Err(Trap::StackOverflow);
        }
        self.entries.push(entry);
        Ok(())
    }

    #[inline]
    pub fn push_value(&mut self, v: Value) -> Result<(), Trap> {
        self.push(StackEntry::Value(v))
    }

    pub fn push_values(&mut self, vals: impl IntoIterator<Item = Value>) -> Result<(), Trap> {
        for v in vals {
            self.push_value(v)?;
        }
        Ok(())
    }

    /// Pop the top value of any type.
    pub fn pop_value(&mut self) -> Result<Value, Trap> {
        match self.entries.last() {
            Some(StackEntry::Value(v)) => {
                let v = *v;
                self.entries.pop();
                Ok(v)
            }
            _ => Err(Trap::StackUnderflow),
        }
    }

    /// Top value without removing it.
    pub fn peek_value(&self) -> Result<Value, Trap> {
        match self.entries.last() {
            Some(StackEntry::Value(v)) => Ok(*v),
            _ => Err(Trap::StackUnderflow),
        }
    }

    /// Pop a value of type `ty`. On mismatch or underflow the stack is left unchanged.
    pub fn pop_typed(&mut self, ty: ValType) -> Result<Value, Trap> {
        let v = self.peek_value()?;
        if v.ty() != ty {
            return Err(Trap::TypeMismatch {
                expected: ty,
                found: v.ty(),
            });
        }
        self.entries.pop();
        Ok(v)
    }

    pub fn pop_i32(&mut self) -> Result<i32, Trap> {
        match self.pop_typed(ValType::I32)? {
            Value::I32(v) => Ok(v),
            _ => Err(Trap::StackUnderflow),
        }
    }

    pub fn pop_i64(&mut self) -> Result<i64, Trap> {
        match self.pop_typed(ValType::I64)? {
            Value::I64(v) => Ok(v),
            _ => Err(Trap::StackUnderflow),
        }
    }

    /// Raw bits of an `f32` operand.
    pub fn pop_f32(&mut self) -> Result<u32, Trap> {
        match self.pop_typed(ValType::F32)? {
            Value::F32(v) => Ok(v),
            _ => Err(Trap::StackUnderflow),
        }
    }

    /// Raw bits of an `f64` operand.
    pub fn pop_f64(&mut self) -> Result<u64, Trap> {
        match self.pop_typed(ValType::F64)? {
            Value::F64(v) => Ok(v),
            _ => Err(Trap::StackUnderflow),
        }
    }

    /// Pop a reference value of either reference type.
    pub fn pop_ref(&mut self) -> Result<Value, Trap> {
        let v = self.peek_value()?;
        if !v.ty().is_ref() {
            return Err(Trap::TypeMismatch {
                expected: ValType::FuncRef,
                found: v.ty(),
            });
        }
        self.entries.pop();
        Ok(v)
    }

    /// Pop the top `n` values, returned in push order. Fails without mutating when fewer
    /// than `n` values sit above the nearest label or frame.
    pub fn pop_values(&mut self, n: usize) -> Result<Vec<Value>, Trap> {
        let start = self
            .entries
            .len()
            .checked_sub(n)
            .ok_or(Trap::StackUnderflow)?;
        if !self.entries[start..]
            .iter()
            .all(|e| matches!(e, StackEntry::Value(_)))
        {
            return Err(Trap::StackUnderflow);
        }
        Ok(self
            .entries
            .drain(start..)
            .filter_map(|e| match e {
                StackEntry::Value(v) => Some(v),
                _ => None,
            })
            .collect())
    }

    /// Pop values matching `types` (last type on top), returned in push order.
    pub fn pop_values_typed(&mut self, types: &[ValType]) -> Result<Vec<Value>, Trap> {
        let start = self
            .entries
            .len()
            .checked_sub(types.len())
            .ok_or(Trap::StackUnderflow)?;
        for (entry, ty) in self.entries[start..].iter().zip(types) {
            match entry {
                StackEntry::Value(v) if v.ty() == *ty => {}
                StackEntry::Value(v) => {
                    return Err(Trap::TypeMismatch {
                        expected: *ty,
                        found: v.ty(),
                    })
                }
                _ => return Err(Trap::StackUnderflow),
            }
        }
        self.pop_values(types.len())
    }

    /// Push a label beneath the construct's `label.params` parameter values.
    pub fn push_label(&mut self, label: Label) -> Result<(), Trap> {
        let params = self.pop_values(label.params)?;
        self.push(StackEntry::Label(label))?;
        self.push_values(params)
    }

    pub fn push_frame(&mut self, frame: Frame) -> Result<(), Trap> {
        let at = self.entries.len();
        self.push(StackEntry::Frame(frame))?;
        self.frames.push(at);
        Ok(())
    }

    fn frame_index(&self) -> Result<usize, Trap> {
        self.frames
            .last()
            .copied()
            .ok_or(Trap::MalformedControl("no active frame"))
    }

    pub fn current_frame(&self) -> Result<&Frame, Trap> {
        match self.entries.get(self.frame_index()?) {
            Some(StackEntry::Frame(f)) => Ok(f),
            _ => Err(Trap::MalformedControl("frame index out of sync")),
        }
    }

    pub fn current_frame_mut(&mut self) -> Result<&mut Frame, Trap> {
        let idx = self.frame_index()?;
        match self.entries.get_mut(idx) {
            Some(StackEntry::Frame(f)) => Ok(f),
            _ => Err(Trap::MalformedControl("frame index out of sync")),
        }
    }

    /// Entry index and copy of the `depth`-th label (0 = innermost) of the current frame,
    /// or `None` when the frame has fewer labels.
    fn find_label(&self, depth: u32) -> Result<Option<(usize, Label)>, Trap> {
        let floor = self.frame_index()?;
        let mut seen = 0u32;
        for idx in (floor + 1..self.entries.len()).rev() {
            if let StackEntry::Label(l) = &self.entries[idx] {
                if seen == depth {
                    return Ok(Some((idx, *l)));
                }
                seen += 1;
            }
        }
        Ok(None)
    }

    /// The `depth`-th label of the current frame, counting outward from the innermost.
    pub fn current_label(&self, depth: u32) -> Result<Label, Trap> {
        self.find_label(depth)?
            .map(|(_, l)| l)
            .ok_or(Trap::MalformedControl("label depth exceeds nesting"))
    }

    /// Remove the innermost label, keeping its `arity` result values on top.
    pub fn pop_label(&mut self) -> Result<Label, Trap> {
        let (idx, label) = self
            .find_label(0)?
            .ok_or(Trap::MalformedControl("end without open block"))?;
        let results = self.pop_values(label.arity)?;
        self.entries.truncate(idx);
        self.push_values(results)?;
        Ok(label)
    }

    /// Branch to the `depth`-th label: carry its branch-arity values, discard everything
    /// down to and including the label, then restore the carried values.
    pub fn branch(&mut self, depth: u32) -> Result<BranchTarget, Trap> {
        let Some((idx, label)) = self.find_label(depth)? else {
            return Ok(BranchTarget::Return);
        };
        let carried = self.pop_values(label.branch_arity())?;
        self.entries.truncate(idx);
        self.push_values(carried)?;
        Ok(if label.is_loop {
            BranchTarget::Jump(label.start)
        } else {
            BranchTarget::Jump(label.end + 1)
        })
    }

    /// Remove the current frame and everything above it, keeping its `arity` result values.
    pub fn pop_frame(&mut self) -> Result<Frame, Trap> {
        let idx = self.frame_index()?;
        let arity = self.current_frame()?.arity;
        let results = self.pop_values(arity)?;
        self.entries.truncate(idx + 1);
        self.frames.pop();
        let frame = match self.entries.pop() {
            Some(StackEntry::Frame(f)) => f,
            _ => return Err(Trap::MalformedControl("frame index out of sync")),
        };
        self.push_values(results)?;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(arity: usize) -> Frame {
        Frame {
            module: InstanceHandle(0),
            func_addr: 0,
            locals: Vec::new(),
            pc: 0,
            arity,
            body: Expression::default(),
        }
    }

    fn label(arity: usize, params: usize, is_loop: bool) -> Label {
        Label {
            arity,
            params,
            start: 3,
            end: 9,
            is_loop,
        }
    }

    #[test]
    fn typed_pop_does_not_mutate_on_mismatch() {
        let mut s = Stack::new(16);
        s.push_value(Value::I64(1)).unwrap();
        assert_eq!(
            s.pop_i32(),
            Err(Trap::TypeMismatch {
                expected: ValType::I32,
                found: ValType::I64
            })
        );
        assert_eq!(s.len(), 1);
        assert_eq!(s.pop_i64(), Ok(1));
        assert_eq!(s.pop_value(), Err(Trap::StackUnderflow));
    }

    #[test]
    fn values_do_not_cross_labels() {
        let mut s = Stack::new(16);
        s.push_frame(frame(0)).unwrap();
        s.push_value(Value::I32(1)).unwrap();
        s.push_label(label(0, 0, false)).unwrap();
        assert_eq!(s.pop_value(), Err(Trap::StackUnderflow));
        assert_eq!(s.pop_values(1), Err(Trap::StackUnderflow));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn pop_values_preserves_order() {
        let mut s = Stack::new(16);
        s.push_values([Value::I32(1), Value::I32(2), Value::I32(3)])
            .unwrap();
        assert_eq!(s.pop_values(2).unwrap(), vec![Value::I32(2), Value::I32(3)]);
        assert_eq!(
            s.pop_values_typed(&[ValType::I64]),
            Err(Trap::TypeMismatch {
                expected: ValType::I64,
                found: ValType::I32
            })
        );
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn block_branch_keeps_result_arity() {
        let mut s = Stack::new(16);
        s.push_frame(frame(1)).unwrap();
        s.push_value(Value::I32(7)).unwrap();
        s.push_label(label(1, 0, false)).unwrap();
        s.push_values([Value::I32(1), Value::I32(2)]).unwrap();
        assert_eq!(s.branch(0), Ok(BranchTarget::Jump(10)));
        // frame, 7, 2
        assert_eq!(s.len(), 3);
        assert_eq!(s.pop_i32(), Ok(2));
        assert_eq!(s.pop_i32(), Ok(7));
    }

    #[test]
    fn loop_branch_carries_params() {
        let mut s = Stack::new(16);
        s.push_frame(frame(0)).unwrap();
        s.push_value(Value::I32(5)).unwrap();
        s.push_label(label(2, 1, true)).unwrap();
        // label sits under its parameter
        assert_eq!(s.len(), 3);
        s.push_values([Value::I32(8), Value::I32(9)]).unwrap();
        assert_eq!(s.branch(0), Ok(BranchTarget::Jump(3)));
        assert_eq!(s.len(), 2);
        assert_eq!(s.pop_i32(), Ok(9));
    }

    #[test]
    fn branch_past_all_labels_is_return() {
        let mut s = Stack::new(16);
        s.push_frame(frame(0)).unwrap();
        s.push_label(label(0, 0, false)).unwrap();
        assert_eq!(s.branch(1), Ok(BranchTarget::Return));
        assert_eq!(s.current_label(0).unwrap().end, 9);
    }

    #[test]
    fn nested_branch_drops_inner_labels() {
        let mut s = Stack::new(16);
        s.push_frame(frame(0)).unwrap();
        s.push_label(label(1, 0, false)).unwrap();
        s.push_value(Value::I32(4)).unwrap();
        s.push_label(label(0, 0, false)).unwrap();
        s.push_value(Value::I32(6)).unwrap();
        assert_eq!(s.branch(1), Ok(BranchTarget::Jump(10)));
        assert_eq!(s.len(), 2);
        assert_eq!(s.pop_i32(), Ok(6));
    }

    #[test]
    fn pop_label_keeps_results() {
        let mut s = Stack::new(16);
        s.push_frame(frame(0)).unwrap();
        s.push_label(label(1, 0, false)).unwrap();
        s.push_value(Value::I32(3)).unwrap();
        s.pop_label().unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.pop_i32(), Ok(3));
        assert!(s.pop_label().is_err());
    }

    #[test]
    fn pop_label_restores_multiple_results_in_order() {
        let mut s = Stack::new(16);
        s.push_frame(frame(0)).unwrap();
        s.push_value(Value::I32(9)).unwrap();
        s.push_label(label(2, 0, false)).unwrap();
        s.push_values([Value::I32(1), Value::I32(2)]).unwrap();
        let l = s.pop_label().unwrap();
        assert_eq!(l.arity, 2);
        assert_eq!(s.len(), 4);
        assert_eq!(s.pop_i32(), Ok(2));
        assert_eq!(s.pop_i32(), Ok(1));
        assert_eq!(s.pop_i32(), Ok(9));
    }

    #[test]
    fn pop_frame_keeps_arity_values() {
        let mut s = Stack::new(16);
        s.push_value(Value::I32(100)).unwrap();
        s.push_frame(frame(1)).unwrap();
        s.push_label(label(0, 0, false)).unwrap();
        s.push_values([Value::I32(1), Value::I32(2)]).unwrap();
        let f = s.pop_frame().unwrap();
        assert_eq!(f.arity, 1);
        assert_eq!(s.frame_count(), 0);
        assert_eq!(s.pop_values(2).unwrap(), vec![Value::I32(100), Value::I32(2)]);
    }

    #[test]
    fn entry_cap_traps() {
        let mut s = Stack::new(2);
        s.push_value(Value::I32(1)).unwrap();
        s.push_value(Value::I32(2)).unwrap();
        assert_eq!(s.push_value(Value::I32(3)), Err(Trap::StackOverflow));
    }
}
