//! Interpreter loop over decoded instructions.
//!
//! All execution state lives on one [`Stack`]: operands, labels and frames. The loop keeps
//! the current body and pc in locals and reloads them from the top frame after calls and
//! returns, so host functions may re-enter the interpreter with a fresh machine.

use tracing::{debug, trace};

use super::control::{BlockEnd, BlockEnds};
use super::numeric;
use super::stack::{BranchTarget, Frame, Label, Stack};
use crate::error::Trap;
use crate::model::{BlockType, Expression, Instruction, MemArg, ValType, Value};
use crate::runtime::{FuncInstance, InstanceHandle, ModuleInstance, Store};

/// Function address recorded in frames evaluating initializer expressions.
pub(crate) const CONST_EXPR_FUNC: usize = usize::MAX;

/// What the loop does after one instruction.
enum Flow {
    Next,
    Jump(usize),
    Call(usize),
    Return,
}

struct Machine<'s> {
    store: &'s mut Store,
    stack: Stack,
    block_ends: BlockEnds,
}

/// Invoke the function at `func_addr` with `args`, returning its results.
pub fn invoke_func(store: &mut Store, func_addr: usize, args: &[Value]) -> Result<Vec<Value>, Trap> {
    let ty = store.func(func_addr)?.ty().clone();
    if args.len() != ty.params.len() {
        return Err(Trap::ArgumentMismatch {
            expected: ty.params.len(),
            found: args.len(),
        });
    }
    for (arg, expected) in args.iter().zip(&ty.params) {
        if arg.ty() != *expected {
            return Err(Trap::TypeMismatch {
                expected: *expected,
                found: arg.ty(),
            });
        }
    }
    if store.active_invocations >= store.config().max_reentrancy {
        return Err(Trap::CallStackExhausted);
    }

    store.active_invocations += 1;
    let result = Machine::new(store).run_func(func_addr, args, ty.results.len());
    store.active_invocations -= 1;

    if let Err(trap) = &result {
        debug!(func_addr, %trap, "invocation trapped");
    }
    result
}

/// Evaluate an initializer expression in the context of `module`, yielding one value.
pub(crate) fn eval_const(
    store: &mut Store,
    module: InstanceHandle,
    expr: &Expression,
) -> Result<Value, Trap> {
    let mut m = Machine::new(store);
    m.stack.push_frame(Frame {
        module,
        func_addr: CONST_EXPR_FUNC,
        locals: Vec::new(),
        pc: 0,
        arity: 1,
        body: expr.clone(),
    })?;
    m.run()?;
    m.stack.pop_value()
}

impl<'s> Machine<'s> {
    fn new(store: &'s mut Store) -> Self {
        let stack = Stack::new(store.config().max_stack_entries);
        Self {
            store,
            stack,
            block_ends: BlockEnds::new(),
        }
    }

    fn run_func(
        &mut self,
        func_addr: usize,
        args: &[Value],
        arity: usize,
    ) -> Result<Vec<Value>, Trap> {
        self.stack.push_values(args.iter().copied())?;
        let depth = self.stack.frame_count();
        self.call(func_addr)?;
        if self.stack.frame_count() > depth {
            self.run()?;
        }
        self.stack.pop_values(arity)
    }

    /// Enter `func_addr`: pop its parameters, then either push a frame (module function)
    /// or run the host callable and push its results.
    fn call(&mut self, func_addr: usize) -> Result<(), Trap> {
        let func = self.store.func(func_addr)?;
        match func {
            FuncInstance::Wasm {
                ty,
                module,
                def_index,
            } => {
                if self.stack.frame_count() >= self.store.config().max_call_depth {
                    return Err(Trap::CallStackExhausted);
                }
                let function = self
                    .store
                    .instance(*module)?
                    .module
                    .functions
                    .get(*def_index)
                    .ok_or(Trap::InvalidAddress {
                        kind: "function body",
                        addr: *def_index,
                    })?;
                let mut locals = self.stack.pop_values_typed(&ty.params)?;
                locals.extend(function.locals.iter().map(|t| Value::default_for(*t)));
                trace!(func_addr, def_index = *def_index, "call");
                let frame = Frame {
                    module: *module,
                    func_addr,
                    locals,
                    pc: 0,
                    arity: ty.results.len(),
                    body: function.body.clone(),
                };
                self.stack.push_frame(frame)
            }
            FuncInstance::Host(host) => {
                let host = host.clone();
                let args = self.stack.pop_values_typed(&host.ty.params)?;
                trace!(func_addr, "host call");
                let results = (host.f)(self.store, &args)?;
                if results.len() != host.ty.results.len() {
                    return Err(Trap::Host(format!(
                        "host function returned {} values, expected {}",
                        results.len(),
                        host.ty.results.len()
                    )));
                }
                for (v, expected) in results.iter().zip(&host.ty.results) {
                    if v.ty() != *expected {
                        return Err(Trap::TypeMismatch {
                            expected: *expected,
                            found: v.ty(),
                        });
                    }
                }
                self.stack.push_values(results)
            }
        }
    }

    fn resume(&self) -> Result<(Expression, usize), Trap> {
        let frame = self.stack.current_frame()?;
        Ok((frame.body.clone(), frame.pc))
    }

    /// Execute until the frame on top at entry returns.
    fn run(&mut self) -> Result<(), Trap> {
        let base = self.stack.frame_count().saturating_sub(1);
        let (mut body, mut pc) = self.resume()?;
        loop {
            match self.step(&body, pc)? {
                Flow::Next => pc += 1,
                Flow::Jump(target) => pc = target,
                Flow::Call(func_addr) => {
                    self.stack.current_frame_mut()?.pc = pc + 1;
                    let depth = self.stack.frame_count();
                    self.call(func_addr)?;
                    if self.stack.frame_count() > depth {
                        (body, pc) = self.resume()?;
                    } else {
                        pc += 1;
                    }
                }
                Flow::Return => {
                    let frame = self.stack.pop_frame()?;
                    trace!(func_addr = frame.func_addr, "return");
                    if self.stack.frame_count() <= base {
                        return Ok(());
                    }
                    (body, pc) = self.resume()?;
                }
            }
        }
    }

    fn instance(&self) -> Result<&ModuleInstance, Trap> {
        self.store.instance(self.stack.current_frame()?.module)
    }

    fn branch(&mut self, depth: u32) -> Result<Flow, Trap> {
        Ok(match self.stack.branch(depth)? {
            BranchTarget::Jump(pc) => Flow::Jump(pc),
            BranchTarget::Return => Flow::Return,
        })
    }

    fn block_arity(&self, bt: &BlockType) -> Result<(usize, usize), Trap> {
        let arity = match bt {
            BlockType::Func(_) => bt.arity(&self.instance()?.module.types),
            _ => bt.arity(&[]),
        };
        arity.ok_or(match bt {
            BlockType::Func(idx) => Trap::IndexOutOfRange {
                space: "type",
                index: *idx,
            },
            _ => Trap::MalformedControl("block type"),
        })
    }

    /// Push the label for the construct opened at `pc`. Returns the matching `else` and `end`.
    fn enter_block(
        &mut self,
        body: &Expression,
        pc: usize,
        bt: &BlockType,
        is_loop: bool,
    ) -> Result<BlockEnd, Trap> {
        let (params, arity) = self.block_arity(bt)?;
        let func_addr = self.stack.current_frame()?.func_addr;
        let ends = self.block_ends.get(func_addr, body.instructions(), pc)?;
        self.stack.push_label(Label {
            arity,
            params,
            start: pc,
            end: ends.end_pc,
            is_loop,
        })?;
        Ok(ends)
    }

    fn set_local(&mut self, index: u32, v: Value) -> Result<(), Trap> {
        let slot = self
            .stack
            .current_frame_mut()?
            .locals
            .get_mut(index as usize)
            .ok_or(Trap::IndexOutOfRange {
                space: "local",
                index,
            })?;
        if slot.ty() != v.ty() {
            return Err(Trap::TypeMismatch {
                expected: slot.ty(),
                found: v.ty(),
            });
        }
        *slot = v;
        Ok(())
    }

    fn memory_addr(&self) -> Result<usize, Trap> {
        self.instance()?.memory_addr(0)
    }

    fn table_addr(&self, index: u32) -> Result<usize, Trap> {
        self.instance()?.table_addr(index)
    }

    /// Pop the dynamic address and add the static offset.
    fn effective_addr(&mut self, arg: &MemArg) -> Result<u64, Trap> {
        let base = self.stack.pop_i32()? as u32;
        Ok(u64::from(base) + u64::from(arg.offset))
    }

    fn load<const N: usize>(&mut self, arg: &MemArg) -> Result<[u8; N], Trap> {
        let ea = self.effective_addr(arg)?;
        let addr = self.memory_addr()?;
        self.store.memory(addr)?.load::<N>(ea)
    }

    fn load_value<const N: usize>(
        &mut self,
        arg: &MemArg,
        conv: impl FnOnce([u8; N]) -> Value,
    ) -> Result<(), Trap> {
        let bytes = self.load::<N>(arg)?;
        self.stack.push_value(conv(bytes))
    }

    fn store_bytes(&mut self, arg: &MemArg, bytes: &[u8]) -> Result<(), Trap> {
        let ea = self.effective_addr(arg)?;
        let addr = self.memory_addr()?;
        self.store.memory_mut(addr)?.store(ea, bytes)
    }

    fn pop_u32(&mut self) -> Result<u32, Trap> {
        Ok(self.stack.pop_i32()? as u32)
    }

    fn step(&mut self, body: &Expression, pc: usize) -> Result<Flow, Trap> {
        use Instruction::*;

        let instr = body
            .get(pc)
            .ok_or(Trap::MalformedControl("execution ran past the end of a body"))?;

        match instr {
            // control
            Unreachable => return Err(Trap::Unreachable),
            Nop => {}
            Block(bt) => {
                self.enter_block(body, pc, bt, false)?;
            }
            Loop(bt) => {
                self.enter_block(body, pc, bt, true)?;
            }
            If(bt) => {
                let cond = self.stack.pop_i32()?;
                if cond != 0 {
                    self.enter_block(body, pc, bt, false)?;
                } else {
                    let func_addr = self.stack.current_frame()?.func_addr;
                    let ends = self.block_ends.get(func_addr, body.instructions(), pc)?;
                    match ends.else_pc {
                        Some(else_pc) => {
                            self.enter_block(body, pc, bt, false)?;
                            return Ok(Flow::Jump(else_pc + 1));
                        }
                        None => return Ok(Flow::Jump(ends.end_pc + 1)),
                    }
                }
            }
            // Reached only at the end of a taken `then` arm.
            Else => return Ok(Flow::Jump(self.stack.current_label(0)?.end)),
            End => {
                if pc + 1 == body.len() {
                    return Ok(Flow::Return);
                }
                self.stack.pop_label()?;
            }
            Br(depth) => return self.branch(*depth),
            BrIf(depth) => {
                if self.stack.pop_i32()? != 0 {
                    return self.branch(*depth);
                }
            }
            BrTable { targets, default } => {
                let i = self.pop_u32()? as usize;
                let depth = targets.get(i).copied().unwrap_or(*default);
                return self.branch(depth);
            }
            Return => return Ok(Flow::Return),
            Call(idx) => return Ok(Flow::Call(self.instance()?.func_addr(*idx)?)),
            CallIndirect { type_idx, table } => {
                let i = self.pop_u32()?;
                let inst = self.instance()?;
                let expected = inst.func_type(*type_idx)?;
                let taddr = inst.table_addr(*table)?;
                let entry = self
                    .store
                    .table(taddr)?
                    .get(i)
                    .map_err(|_| Trap::UndefinedElement { index: i })?;
                let func_addr = match entry {
                    Value::FuncRef(Some(addr)) => addr,
                    Value::FuncRef(None) => return Err(Trap::UninitializedElement { index: i }),
                    other => {
                        return Err(Trap::TypeMismatch {
                            expected: ValType::FuncRef,
                            found: other.ty(),
                        })
                    }
                };
                if self.store.func(func_addr)?.ty() != expected {
                    return Err(Trap::IndirectCallTypeMismatch);
                }
                return Ok(Flow::Call(func_addr));
            }

            // reference
            RefNull(ty) => self.stack.push_value(Value::null_ref(*ty))?,
            RefIsNull => {
                let r = self.stack.pop_ref()?;
                self.stack.push_value(Value::I32(r.is_null_ref() as i32))?;
            }
            RefFunc(idx) => {
                let addr = self.instance()?.func_addr(*idx)?;
                self.stack.push_value(Value::FuncRef(Some(addr)))?;
            }

            // parametric
            Drop => {
                self.stack.pop_value()?;
            }
            Select => {
                let cond = self.stack.pop_i32()?;
                let b = self.stack.pop_value()?;
                let a = self.stack.pop_typed(b.ty())?;
                self.stack.push_value(if cond != 0 { a } else { b })?;
            }
            SelectTyped(tys) => {
                let [ty] = &tys[..] else {
                    return Err(Trap::MalformedControl("typed select needs one type"));
                };
                let cond = self.stack.pop_i32()?;
                let b = self.stack.pop_typed(*ty)?;
                let a = self.stack.pop_typed(*ty)?;
                self.stack.push_value(if cond != 0 { a } else { b })?;
            }

            // variable
            LocalGet(idx) => {
                let v = *self
                    .stack
                    .current_frame()?
                    .locals
                    .get(*idx as usize)
                    .ok_or(Trap::IndexOutOfRange {
                        space: "local",
                        index: *idx,
                    })?;
                self.stack.push_value(v)?;
            }
            LocalSet(idx) => {
                let v = self.stack.pop_value()?;
                self.set_local(*idx, v)?;
            }
            LocalTee(idx) => {
                let v = self.stack.peek_value()?;
                self.set_local(*idx, v)?;
            }
            GlobalGet(idx) => {
                let addr = self.instance()?.global_addr(*idx)?;
                let v = self.store.global(addr)?.get();
                self.stack.push_value(v)?;
            }
            GlobalSet(idx) => {
                let addr = self.instance()?.global_addr(*idx)?;
                let v = self.stack.pop_value()?;
                let global = self.store.global_mut(addr)?;
                if !global.ty().mutable {
                    return Err(Trap::ImmutableGlobal { index: *idx });
                }
                global.set(v)?;
            }

            // table
            TableGet(t) => {
                let i = self.pop_u32()?;
                let addr = self.table_addr(*t)?;
                let v = self.store.table(addr)?.get(i)?;
                self.stack.push_value(v)?;
            }
            TableSet(t) => {
                let v = self.stack.pop_ref()?;
                let i = self.pop_u32()?;
                let addr = self.table_addr(*t)?;
                self.store.table_mut(addr)?.set(i, v)?;
            }
            TableSize(t) => {
                let addr = self.table_addr(*t)?;
                let size = self.store.table(addr)?.size();
                self.stack.push_value(Value::I32(size as i32))?;
            }
            TableGrow(t) => {
                let n = self.pop_u32()?;
                let init = self.stack.pop_ref()?;
                let addr = self.table_addr(*t)?;
                let cap = self.store.config().max_table_elements;
                let prev = self.store.table_mut(addr)?.grow(n, init, cap);
                self.stack
                    .push_value(Value::I32(prev.map_or(-1, |p| p as i32)))?;
            }
            TableFill(t) => {
                let n = self.pop_u32()?;
                let v = self.stack.pop_ref()?;
                let i = self.pop_u32()?;
                let addr = self.table_addr(*t)?;
                self.store.table_mut(addr)?.fill(i, v, n)?;
            }
            TableCopy { dst, src } => {
                let n = self.pop_u32()?;
                let s = self.pop_u32()?;
                let d = self.pop_u32()?;
                let dst_addr = self.table_addr(*dst)?;
                let src_addr = self.table_addr(*src)?;
                if dst_addr == src_addr {
                    self.store.table_mut(dst_addr)?.copy_within(d, s, n)?;
                } else {
                    let items = self.store.table(src_addr)?.slice(s, n)?.to_vec();
                    self.store.table_mut(dst_addr)?.init(d, &items, 0, n)?;
                }
            }
            TableInit { elem, table } => {
                let n = self.pop_u32()?;
                let s = self.pop_u32()?;
                let d = self.pop_u32()?;
                let inst = self.instance()?;
                let taddr = inst.table_addr(*table)?;
                let eaddr = inst.elem_addr(*elem)?;
                let store = &mut *self.store;
                let segment = store.elems.get(eaddr).ok_or(Trap::InvalidAddress {
                    kind: "element segment",
                    addr: eaddr,
                })?;
                let target = store.tables.get_mut(taddr).ok_or(Trap::InvalidAddress {
                    kind: "table",
                    addr: taddr,
                })?;
                target.init(d, &segment.refs, s, n)?;
            }
            ElemDrop(idx) => {
                let addr = self.instance()?.elem_addr(*idx)?;
                self.store.elem_mut(addr)?.drop_items();
            }

            // memory
            I32Load(m) => self.load_value::<4>(m, |b| Value::I32(i32::from_le_bytes(b)))?,
            I64Load(m) => self.load_value::<8>(m, |b| Value::I64(i64::from_le_bytes(b)))?,
            F32Load(m) => self.load_value::<4>(m, |b| Value::F32(u32::from_le_bytes(b)))?,
            F64Load(m) => self.load_value::<8>(m, |b| Value::F64(u64::from_le_bytes(b)))?,
            I32Load8S(m) => self.load_value::<1>(m, |b| Value::I32(i8::from_le_bytes(b) as i32))?,
            I32Load8U(m) => self.load_value::<1>(m, |b| Value::I32(u8::from_le_bytes(b) as i32))?,
            I32Load16S(m) => self.load_value::<2>(m, |b| Value::I32(i16::from_le_bytes(b) as i32))?,
            I32Load16U(m) => self.load_value::<2>(m, |b| Value::I32(u16::from_le_bytes(b) as i32))?,
            I64Load8S(m) => self.load_value::<1>(m, |b| Value::I64(i8::from_le_bytes(b) as i64))?,
            I64Load8U(m) => self.load_value::<1>(m, |b| Value::I64(u8::from_le_bytes(b) as i64))?,
            I64Load16S(m) => self.load_value::<2>(m, |b| Value::I64(i16::from_le_bytes(b) as i64))?,
            I64Load16U(m) => self.load_value::<2>(m, |b| Value::I64(u16::from_le_bytes(b) as i64))?,
            I64Load32S(m) => self.load_value::<4>(m, |b| Value::I64(i32::from_le_bytes(b) as i64))?,
            I64Load32U(m) => self.load_value::<4>(m, |b| Value::I64(u32::from_le_bytes(b) as i64))?,
            I32Store(m) => {
                let v = self.stack.pop_i32()?;
                self.store_bytes(m, &v.to_le_bytes())?;
            }
            I64Store(m) => {
                let v = self.stack.pop_i64()?;
                self.store_bytes(m, &v.to_le_bytes())?;
            }
            F32Store(m) => {
                let v = self.stack.pop_f32()?;
                self.store_bytes(m, &v.to_le_bytes())?;
            }
            F64Store(m) => {
                let v = self.stack.pop_f64()?;
                self.store_bytes(m, &v.to_le_bytes())?;
            }
            I32Store8(m) => {
                let v = self.stack.pop_i32()?;
                self.store_bytes(m, &[v as u8])?;
            }
            I32Store16(m) => {
                let v = self.stack.pop_i32()?;
                self.store_bytes(m, &(v as u16).to_le_bytes())?;
            }
            I64Store8(m) => {
                let v = self.stack.pop_i64()?;
                self.store_bytes(m, &[v as u8])?;
            }
            I64Store16(m) => {
                let v = self.stack.pop_i64()?;
                self.store_bytes(m, &(v as u16).to_le_bytes())?;
            }
            I64Store32(m) => {
                let v = self.stack.pop_i64()?;
                self.store_bytes(m, &(v as u32).to_le_bytes())?;
            }
            MemorySize => {
                let addr = self.memory_addr()?;
                let pages = self.store.memory(addr)?.size_pages();
                self.stack.push_value(Value::I32(pages as i32))?;
            }
            MemoryGrow => {
                let delta = self.pop_u32()?;
                let addr = self.memory_addr()?;
                let cap = self.store.config().max_memory_pages;
                let prev = self.store.memory_mut(addr)?.grow(delta, cap);
                self.stack
                    .push_value(Value::I32(prev.map_or(-1, |p| p as i32)))?;
            }
            MemoryInit(idx) => {
                let n = self.pop_u32()?;
                let s = self.pop_u32()?;
                let d = self.pop_u32()?;
                let inst = self.instance()?;
                let maddr = inst.memory_addr(0)?;
                let daddr = inst.data_addr(*idx)?;
                let store = &mut *self.store;
                let segment = store.datas.get(daddr).ok_or(Trap::InvalidAddress {
                    kind: "data segment",
                    addr: daddr,
                })?;
                let mem = store.mems.get_mut(maddr).ok_or(Trap::InvalidAddress {
                    kind: "memory",
                    addr: maddr,
                })?;
                mem.init(d.into(), &segment.bytes, s.into(), n.into())?;
            }
            DataDrop(idx) => {
                let addr = self.instance()?.data_addr(*idx)?;
                self.store.data_mut(addr)?.drop_bytes();
            }
            MemoryCopy => {
                let n = self.pop_u32()?;
                let s = self.pop_u32()?;
                let d = self.pop_u32()?;
                let addr = self.memory_addr()?;
                self.store
                    .memory_mut(addr)?
                    .copy_within(d.into(), s.into(), n.into())?;
            }
            MemoryFill => {
                let n = self.pop_u32()?;
                let val = self.stack.pop_i32()?;
                let d = self.pop_u32()?;
                let addr = self.memory_addr()?;
                self.store
                    .memory_mut(addr)?
                    .fill(d.into(), val as u8, n.into())?;
            }

            // constants
            I32Const(v) => self.stack.push_value(Value::I32(*v))?,
            I64Const(v) => self.stack.push_value(Value::I64(*v))?,
            F32Const(bits) => self.stack.push_value(Value::F32(*bits))?,
            F64Const(bits) => self.stack.push_value(Value::F64(*bits))?,

            other => {
                if !numeric::execute(&mut self.stack, other)? {
                    return Err(Trap::Unimplemented("instruction"));
                }
            }
        }
        Ok(Flow::Next)
    }
}
