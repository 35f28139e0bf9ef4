//! Numeric instruction semantics.
//!
//! Integer arithmetic wraps, shift and rotate counts are taken modulo the bit width, and
//! float operands travel as raw bits so sign and NaN payload survive `abs`/`neg`/`copysign`.

use super::stack::Stack;
use crate::error::Trap;
use crate::model::{Instruction, Value};

const F32_SIGN: u32 = 1 << 31;
const F64_SIGN: u64 = 1 << 63;

/* ---------- integer division ---------- */

pub fn i32_div_s(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    a.checked_div(b).ok_or(Trap::IntegerOverflow)
}

pub fn i32_div_u(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(((a as u32) / (b as u32)) as i32)
}

/// `rem_s(MIN, -1)` is 0, not an overflow.
pub fn i32_rem_s(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(a.wrapping_rem(b))
}

pub fn i32_rem_u(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(((a as u32) % (b as u32)) as i32)
}

pub fn i64_div_s(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    a.checked_div(b).ok_or(Trap::IntegerOverflow)
}

pub fn i64_div_u(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(((a as u64) / (b as u64)) as i64)
}

pub fn i64_rem_s(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(a.wrapping_rem(b))
}

pub fn i64_rem_u(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivisionByZero);
    }
    Ok(((a as u64) % (b as u64)) as i64)
}

/* ---------- float min/max/nearest ---------- */

macro_rules! float_min_max {
    ($min:ident, $max:ident, $t:ty) => {
        /// NaN if either operand is NaN; `-0.0` orders below `+0.0`.
        pub fn $min(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                return a + b;
            }
            if a == b {
                return if a.is_sign_negative() { a } else { b };
            }
            a.min(b)
        }

        /// NaN if either operand is NaN; `+0.0` orders above `-0.0`.
        pub fn $max(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                return a + b;
            }
            if a == b {
                return if a.is_sign_positive() { a } else { b };
            }
            a.max(b)
        }
    };
}

float_min_max!(f32_min, f32_max, f32);
float_min_max!(f64_min, f64_max, f64);

/* ---------- float to int ---------- */

pub fn i32_trunc_s(x: f64) -> Result<i32, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = x.trunc();
    if (-2_147_483_648.0..2_147_483_648.0).contains(&t) {
        Ok(t as i32)
    } else {
        Err(Trap::IntegerOverflow)
    }
}

pub fn i32_trunc_u(x: f64) -> Result<i32, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = x.trunc();
    if t > -1.0 && t < 4_294_967_296.0 {
        Ok(t as u32 as i32)
    } else {
        Err(Trap::IntegerOverflow)
    }
}

pub fn i64_trunc_s(x: f64) -> Result<i64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = x.trunc();
    if (-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&t) {
        Ok(t as i64)
    } else {
        Err(Trap::IntegerOverflow)
    }
}

pub fn i64_trunc_u(x: f64) -> Result<i64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = x.trunc();
    if t > -1.0 && t < 18_446_744_073_709_551_616.0 {
        Ok(t as u64 as i64)
    } else {
        Err(Trap::IntegerOverflow)
    }
}

/* ---------- stack helpers ---------- */

fn i32_bool(b: bool) -> Value {
    Value::I32(b as i32)
}

fn unop_i32(s: &mut Stack, f: impl FnOnce(i32) -> i32) -> Result<(), Trap> {
    let a = s.pop_i32()?;
    s.push_value(Value::I32(f(a)))
}

fn unop_i64(s: &mut Stack, f: impl FnOnce(i64) -> i64) -> Result<(), Trap> {
    let a = s.pop_i64()?;
    s.push_value(Value::I64(f(a)))
}

fn binop_i32(s: &mut Stack, f: impl FnOnce(i32, i32) -> Result<i32, Trap>) -> Result<(), Trap> {
    let rhs = s.pop_i32()?;
    let lhs = s.pop_i32()?;
    s.push_value(Value::I32(f(lhs, rhs)?))
}

fn binop_i64(s: &mut Stack, f: impl FnOnce(i64, i64) -> Result<i64, Trap>) -> Result<(), Trap> {
    let rhs = s.pop_i64()?;
    let lhs = s.pop_i64()?;
    s.push_value(Value::I64(f(lhs, rhs)?))
}

fn cmpop_i32(s: &mut Stack, f: impl FnOnce(i32, i32) -> bool) -> Result<(), Trap> {
    let rhs = s.pop_i32()?;
    let lhs = s.pop_i32()?;
    s.push_value(i32_bool(f(lhs, rhs)))
}

fn cmpop_i64(s: &mut Stack, f: impl FnOnce(i64, i64) -> bool) -> Result<(), Trap> {
    let rhs = s.pop_i64()?;
    let lhs = s.pop_i64()?;
    s.push_value(i32_bool(f(lhs, rhs)))
}

fn unop_f32(s: &mut Stack, f: impl FnOnce(f32) -> f32) -> Result<(), Trap> {
    let a = f32::from_bits(s.pop_f32()?);
    s.push_value(Value::from_f32(f(a)))
}

fn unop_f64(s: &mut Stack, f: impl FnOnce(f64) -> f64) -> Result<(), Trap> {
    let a = f64::from_bits(s.pop_f64()?);
    s.push_value(Value::from_f64(f(a)))
}

fn bitop_f32(s: &mut Stack, f: impl FnOnce(u32) -> u32) -> Result<(), Trap> {
    let a = s.pop_f32()?;
    s.push_value(Value::F32(f(a)))
}

fn bitop_f64(s: &mut Stack, f: impl FnOnce(u64) -> u64) -> Result<(), Trap> {
    let a = s.pop_f64()?;
    s.push_value(Value::F64(f(a)))
}

fn binop_f32(s: &mut Stack, f: impl FnOnce(f32, f32) -> f32) -> Result<(), Trap> {
    let rhs = f32::from_bits(s.pop_f32()?);
    let lhs = f32::from_bits(s.pop_f32()?);
    s.push_value(Value::from_f32(f(lhs, rhs)))
}

fn binop_f64(s: &mut Stack, f: impl FnOnce(f64, f64) -> f64) -> Result<(), Trap> {
    let rhs = f64::from_bits(s.pop_f64()?);
    let lhs = f64::from_bits(s.pop_f64()?);
    s.push_value(Value::from_f64(f(lhs, rhs)))
}

fn cmpop_f32(s: &mut Stack, f: impl FnOnce(f32, f32) -> bool) -> Result<(), Trap> {
    let rhs = f32::from_bits(s.pop_f32()?);
    let lhs = f32::from_bits(s.pop_f32()?);
    s.push_value(i32_bool(f(lhs, rhs)))
}

fn cmpop_f64(s: &mut Stack, f: impl FnOnce(f64, f64) -> bool) -> Result<(), Trap> {
    let rhs = f64::from_bits(s.pop_f64()?);
    let lhs = f64::from_bits(s.pop_f64()?);
    s.push_value(i32_bool(f(lhs, rhs)))
}

/// Convert the top operand with `f`, which receives the popped value.
fn convert<T>(
    s: &mut Stack,
    pop: impl FnOnce(&mut Stack) -> Result<T, Trap>,
    f: impl FnOnce(T) -> Result<Value, Trap>,
) -> Result<(), Trap> {
    let a = pop(s)?;
    s.push_value(f(a)?)
}

fn as_f32(bits: u32) -> f64 {
    f32::from_bits(bits) as f64
}

/// Execute `instr` if it is a numeric instruction. Returns `false`, leaving the stack
/// untouched, for anything else.
pub fn execute(s: &mut Stack, instr: &Instruction) -> Result<bool, Trap> {
    use Instruction::*;

    match instr {
        // i32 comparisons
        I32Eqz => unop_i32(s, |a| (a == 0) as i32)?,
        I32Eq => cmpop_i32(s, |a, b| a == b)?,
        I32Ne => cmpop_i32(s, |a, b| a != b)?,
        I32LtS => cmpop_i32(s, |a, b| a < b)?,
        I32LtU => cmpop_i32(s, |a, b| (a as u32) < (b as u32))?,
        I32GtS => cmpop_i32(s, |a, b| a > b)?,
        I32GtU => cmpop_i32(s, |a, b| (a as u32) > (b as u32))?,
        I32LeS => cmpop_i32(s, |a, b| a <= b)?,
        I32LeU => cmpop_i32(s, |a, b| (a as u32) <= (b as u32))?,
        I32GeS => cmpop_i32(s, |a, b| a >= b)?,
        I32GeU => cmpop_i32(s, |a, b| (a as u32) >= (b as u32))?,

        // i64 comparisons
        I64Eqz => convert(s, Stack::pop_i64, |a| Ok(i32_bool(a == 0)))?,
        I64Eq => cmpop_i64(s, |a, b| a == b)?,
        I64Ne => cmpop_i64(s, |a, b| a != b)?,
        I64LtS => cmpop_i64(s, |a, b| a < b)?,
        I64LtU => cmpop_i64(s, |a, b| (a as u64) < (b as u64))?,
        I64GtS => cmpop_i64(s, |a, b| a > b)?,
        I64GtU => cmpop_i64(s, |a, b| (a as u64) > (b as u64))?,
        I64LeS => cmpop_i64(s, |a, b| a <= b)?,
        I64LeU => cmpop_i64(s, |a, b| (a as u64) <= (b as u64))?,
        I64GeS => cmpop_i64(s, |a, b| a >= b)?,
        I64GeU => cmpop_i64(s, |a, b| (a as u64) >= (b as u64))?,

        // float comparisons
        F32Eq => cmpop_f32(s, |a, b| a == b)?,
        F32Ne => cmpop_f32(s, |a, b| a != b)?,
        F32Lt => cmpop_f32(s, |a, b| a < b)?,
        F32Gt => cmpop_f32(s, |a, b| a > b)?,
        F32Le => cmpop_f32(s, |a, b| a <= b)?,
        F32Ge => cmpop_f32(s, |a, b| a >= b)?,
        F64Eq => cmpop_f64(s, |a, b| a == b)?,
        F64Ne => cmpop_f64(s, |a, b| a != b)?,
        F64Lt => cmpop_f64(s, |a, b| a < b)?,
        F64Gt => cmpop_f64(s, |a, b| a > b)?,
        F64Le => cmpop_f64(s, |a, b| a <= b)?,
        F64Ge => cmpop_f64(s, |a, b| a >= b)?,

        // i32 arithmetic
        I32Clz => unop_i32(s, |a| a.leading_zeros() as i32)?,
        I32Ctz => unop_i32(s, |a| a.trailing_zeros() as i32)?,
        I32Popcnt => unop_i32(s, |a| a.count_ones() as i32)?,
        I32Add => binop_i32(s, |a, b| Ok(a.wrapping_add(b)))?,
        I32Sub => binop_i32(s, |a, b| Ok(a.wrapping_sub(b)))?,
        I32Mul => binop_i32(s, |a, b| Ok(a.wrapping_mul(b)))?,
        I32DivS => binop_i32(s, i32_div_s)?,
        I32DivU => binop_i32(s, i32_div_u)?,
        I32RemS => binop_i32(s, i32_rem_s)?,
        I32RemU => binop_i32(s, i32_rem_u)?,
        I32And => binop_i32(s, |a, b| Ok(a & b))?,
        I32Or => binop_i32(s, |a, b| Ok(a | b))?,
        I32Xor => binop_i32(s, |a, b| Ok(a ^ b))?,
        I32Shl => binop_i32(s, |a, b| Ok(a.wrapping_shl(b as u32)))?,
        I32ShrS => binop_i32(s, |a, b| Ok(a.wrapping_shr(b as u32)))?,
        I32ShrU => binop_i32(s, |a, b| Ok((a as u32).wrapping_shr(b as u32) as i32))?,
        I32Rotl => binop_i32(s, |a, b| Ok(a.rotate_left(b as u32 % 32)))?,
        I32Rotr => binop_i32(s, |a, b| Ok(a.rotate_right(b as u32 % 32)))?,

        // i64 arithmetic
        I64Clz => unop_i64(s, |a| a.leading_zeros() as i64)?,
        I64Ctz => unop_i64(s, |a| a.trailing_zeros() as i64)?,
        I64Popcnt => unop_i64(s, |a| a.count_ones() as i64)?,
        I64Add => binop_i64(s, |a, b| Ok(a.wrapping_add(b)))?,
        I64Sub => binop_i64(s, |a, b| Ok(a.wrapping_sub(b)))?,
        I64Mul => binop_i64(s, |a, b| Ok(a.wrapping_mul(b)))?,
        I64DivS => binop_i64(s, i64_div_s)?,
        I64DivU => binop_i64(s, i64_div_u)?,
        I64RemS => binop_i64(s, i64_rem_s)?,
        I64RemU => binop_i64(s, i64_rem_u)?,
        I64And => binop_i64(s, |a, b| Ok(a & b))?,
        I64Or => binop_i64(s, |a, b| Ok(a | b))?,
        I64Xor => binop_i64(s, |a, b| Ok(a ^ b))?,
        I64Shl => binop_i64(s, |a, b| Ok(a.wrapping_shl(b as u32)))?,
        I64ShrS => binop_i64(s, |a, b| Ok(a.wrapping_shr(b as u32)))?,
        I64ShrU => binop_i64(s, |a, b| Ok((a as u64).wrapping_shr(b as u32) as i64))?,
        I64Rotl => binop_i64(s, |a, b| Ok(a.rotate_left((b as u64 % 64) as u32)))?,
        I64Rotr => binop_i64(s, |a, b| Ok(a.rotate_right((b as u64 % 64) as u32)))?,

        // f32 arithmetic
        F32Abs => bitop_f32(s, |a| a & !F32_SIGN)?,
        F32Neg => bitop_f32(s, |a| a ^ F32_SIGN)?,
        F32Ceil => unop_f32(s, f32::ceil)?,
        F32Floor => unop_f32(s, f32::floor)?,
        F32Trunc => unop_f32(s, f32::trunc)?,
        F32Nearest => unop_f32(s, f32::round_ties_even)?,
        F32Sqrt => unop_f32(s, f32::sqrt)?,
        F32Add => binop_f32(s, |a, b| a + b)?,
        F32Sub => binop_f32(s, |a, b| a - b)?,
        F32Mul => binop_f32(s, |a, b| a * b)?,
        F32Div => binop_f32(s, |a, b| a / b)?,
        F32Min => binop_f32(s, f32_min)?,
        F32Max => binop_f32(s, f32_max)?,
        F32Copysign => {
            let sign = s.pop_f32()? & F32_SIGN;
            bitop_f32(s, |a| (a & !F32_SIGN) | sign)?
        }

        // f64 arithmetic
        F64Abs => bitop_f64(s, |a| a & !F64_SIGN)?,
        F64Neg => bitop_f64(s, |a| a ^ F64_SIGN)?,
        F64Ceil => unop_f64(s, f64::ceil)?,
        F64Floor => unop_f64(s, f64::floor)?,
        F64Trunc => unop_f64(s, f64::trunc)?,
        F64Nearest => unop_f64(s, f64::round_ties_even)?,
        F64Sqrt => unop_f64(s, f64::sqrt)?,
        F64Add => binop_f64(s, |a, b| a + b)?,
        F64Sub => binop_f64(s, |a, b| a - b)?,
        F64Mul => binop_f64(s, |a, b| a * b)?,
        F64Div => binop_f64(s, |a, b| a / b)?,
        F64Min => binop_f64(s, f64_min)?,
        F64Max => binop_f64(s, f64_max)?,
        F64Copysign => {
            let sign = s.pop_f64()? & F64_SIGN;
            bitop_f64(s, |a| (a & !F64_SIGN) | sign)?
        }

        // conversions
        I32WrapI64 => convert(s, Stack::pop_i64, |a| Ok(Value::I32(a as i32)))?,
        I32TruncF32S => convert(s, Stack::pop_f32, |a| i32_trunc_s(as_f32(a)).map(Value::I32))?,
        I32TruncF32U => convert(s, Stack::pop_f32, |a| i32_trunc_u(as_f32(a)).map(Value::I32))?,
        I32TruncF64S => {
            convert(s, Stack::pop_f64, |a| i32_trunc_s(f64::from_bits(a)).map(Value::I32))?
        }
        I32TruncF64U => {
            convert(s, Stack::pop_f64, |a| i32_trunc_u(f64::from_bits(a)).map(Value::I32))?
        }
        I64ExtendI32S => convert(s, Stack::pop_i32, |a| Ok(Value::I64(a as i64)))?,
        I64ExtendI32U => convert(s, Stack::pop_i32, |a| Ok(Value::I64(a as u32 as i64)))?,
        I64TruncF32S => convert(s, Stack::pop_f32, |a| i64_trunc_s(as_f32(a)).map(Value::I64))?,
        I64TruncF32U => convert(s, Stack::pop_f32, |a| i64_trunc_u(as_f32(a)).map(Value::I64))?,
        I64TruncF64S => {
            convert(s, Stack::pop_f64, |a| i64_trunc_s(f64::from_bits(a)).map(Value::I64))?
        }
        I64TruncF64U => {
            convert(s, Stack::pop_f64, |a| i64_trunc_u(f64::from_bits(a)).map(Value::I64))?
        }
        F32ConvertI32S => convert(s, Stack::pop_i32, |a| Ok(Value::from_f32(a as f32)))?,
        F32ConvertI32U => convert(s, Stack::pop_i32, |a| Ok(Value::from_f32(a as u32 as f32)))?,
        F32ConvertI64S => convert(s, Stack::pop_i64, |a| Ok(Value::from_f32(a as f32)))?,
        F32ConvertI64U => convert(s, Stack::pop_i64, |a| Ok(Value::from_f32(a as u64 as f32)))?,
        F32DemoteF64 => {
            convert(s, Stack::pop_f64, |a| Ok(Value::from_f32(f64::from_bits(a) as f32)))?
        }
        F64ConvertI32S => convert(s, Stack::pop_i32, |a| Ok(Value::from_f64(a as f64)))?,
        F64ConvertI32U => convert(s, Stack::pop_i32, |a| Ok(Value::from_f64(a as u32 as f64)))?,
        F64ConvertI64S => convert(s, Stack::pop_i64, |a| Ok(Value::from_f64(a as f64)))?,
        F64ConvertI64U => convert(s, Stack::pop_i64, |a| Ok(Value::from_f64(a as u64 as f64)))?,
        F64PromoteF32 => convert(s, Stack::pop_f32, |a| Ok(Value::from_f64(as_f32(a))))?,
        I32ReinterpretF32 => convert(s, Stack::pop_f32, |a| Ok(Value::I32(a as i32)))?,
        I64ReinterpretF64 => convert(s, Stack::pop_f64, |a| Ok(Value::I64(a as i64)))?,
        F32ReinterpretI32 => convert(s, Stack::pop_i32, |a| Ok(Value::F32(a as u32)))?,
        F64ReinterpretI64 => convert(s, Stack::pop_i64, |a| Ok(Value::F64(a as u64)))?,

        // sign extension
        I32Extend8S => unop_i32(s, |a| a as i8 as i32)?,
        I32Extend16S => unop_i32(s, |a| a as i16 as i32)?,
        I64Extend8S => unop_i64(s, |a| a as i8 as i64)?,
        I64Extend16S => unop_i64(s, |a| a as i16 as i64)?,
        I64Extend32S => unop_i64(s, |a| a as i32 as i64)?,

        // saturating truncation: `as` clamps and maps NaN to 0
        I32TruncSatF32S => convert(s, Stack::pop_f32, |a| Ok(Value::I32(f32::from_bits(a) as i32)))?,
        I32TruncSatF32U => {
            convert(s, Stack::pop_f32, |a| Ok(Value::I32(f32::from_bits(a) as u32 as i32)))?
        }
        I32TruncSatF64S => convert(s, Stack::pop_f64, |a| Ok(Value::I32(f64::from_bits(a) as i32)))?,
        I32TruncSatF64U => {
            convert(s, Stack::pop_f64, |a| Ok(Value::I32(f64::from_bits(a) as u32 as i32)))?
        }
        I64TruncSatF32S => convert(s, Stack::pop_f32, |a| Ok(Value::I64(f32::from_bits(a) as i64)))?,
        I64TruncSatF32U => {
            convert(s, Stack::pop_f32, |a| Ok(Value::I64(f32::from_bits(a) as u64 as i64)))?
        }
        I64TruncSatF64S => convert(s, Stack::pop_f64, |a| Ok(Value::I64(f64::from_bits(a) as i64)))?,
        I64TruncSatF64U => {
            convert(s, Stack::pop_f64, |a| Ok(Value::I64(f64::from_bits(a) as u64 as i64)))?
        }

        _ => return Ok(false),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run(instr: Instruction, args: &[Value]) -> Result<Value, Trap> {
        let mut s = Stack::new(64);
        s.push_values(args.iter().copied())?;
        assert!(execute(&mut s, &instr)?);
        s.pop_value()
    }

    #[test]
    fn division_traps() {
        assert_eq!(i32_div_s(1, 0), Err(Trap::DivisionByZero));
        assert_eq!(i32_div_s(i32::MIN, -1), Err(Trap::IntegerOverflow));
        assert_eq!(i32_rem_s(i32::MIN, -1), Ok(0));
        assert_eq!(i32_div_u(-1, 2), Ok(i32::MAX));
        assert_eq!(i64_div_s(i64::MIN, -1), Err(Trap::IntegerOverflow));
        assert_eq!(i64_rem_s(i64::MIN, -1), Ok(0));
        assert_eq!(i64_rem_u(7, 0), Err(Trap::DivisionByZero));
        assert_eq!(i32_rem_s(-7, 2), Ok(-1));
    }

    #[test]
    fn shifts_use_count_modulo_width() {
        assert_eq!(run(Instruction::I32Shl, &[Value::I32(1), Value::I32(33)]), Ok(Value::I32(2)));
        assert_eq!(
            run(Instruction::I32ShrU, &[Value::I32(-1), Value::I32(32 + 28)]),
            Ok(Value::I32(0xF))
        );
        assert_eq!(
            run(Instruction::I64Rotl, &[Value::I64(1), Value::I64(65)]),
            Ok(Value::I64(2))
        );
        assert_eq!(
            run(Instruction::I32Rotr, &[Value::I32(1), Value::I32(-1)]),
            Ok(Value::I32(2))
        );
    }

    #[test]
    fn min_max_zero_and_nan() {
        assert!(f32_min(-0.0, 0.0).is_sign_negative());
        assert!(f32_min(0.0, -0.0).is_sign_negative());
        assert!(f64_max(-0.0, 0.0).is_sign_positive());
        assert!(f64_max(0.0, -0.0).is_sign_positive());
        assert!(f32_min(f32::NAN, 1.0).is_nan());
        assert!(f64_max(1.0, f64::NAN).is_nan());
        assert_eq!(f64_min(1.0, 2.0), 1.0);
    }

    #[test]
    fn nearest_rounds_half_to_even() {
        assert_eq!(
            run(Instruction::F64Nearest, &[Value::from_f64(2.5)]),
            Ok(Value::from_f64(2.0))
        );
        assert_eq!(
            run(Instruction::F32Nearest, &[Value::from_f32(-3.5)]),
            Ok(Value::from_f32(-4.0))
        );
    }

    #[test]
    fn trapping_truncation() {
        assert_eq!(i32_trunc_s(f64::NAN), Err(Trap::InvalidConversion));
        assert_eq!(i32_trunc_s(2_147_483_648.0), Err(Trap::IntegerOverflow));
        assert_eq!(i32_trunc_s(-2_147_483_648.9), Ok(i32::MIN));
        assert_eq!(i32_trunc_u(-0.9), Ok(0));
        assert_eq!(i32_trunc_u(-1.0), Err(Trap::IntegerOverflow));
        assert_eq!(i32_trunc_u(4_294_967_295.0), Ok(-1));
        assert_eq!(i64_trunc_s(9.2e18), Ok(9_200_000_000_000_000_000));
        assert_eq!(i64_trunc_s(1.9e19), Err(Trap::IntegerOverflow));
        assert_eq!(i64_trunc_u(f64::INFINITY), Err(Trap::IntegerOverflow));
        assert_eq!(
            run(Instruction::I32TruncF32S, &[Value::from_f32(f32::NAN)]),
            Err(Trap::InvalidConversion)
        );
    }

    #[test]
    fn saturating_truncation() {
        assert_eq!(
            run(Instruction::I32TruncSatF32S, &[Value::from_f32(f32::NAN)]),
            Ok(Value::I32(0))
        );
        assert_eq!(
            run(Instruction::I32TruncSatF64U, &[Value::from_f64(-5.0)]),
            Ok(Value::I32(0))
        );
        assert_eq!(
            run(Instruction::I64TruncSatF64S, &[Value::from_f64(1e300)]),
            Ok(Value::I64(i64::MAX))
        );
    }

    #[test]
    fn sign_bit_ops_keep_nan_payload() {
        let nan = 0x7FC0_0001u32;
        assert_eq!(
            run(Instruction::F32Neg, &[Value::F32(nan)]),
            Ok(Value::F32(nan | F32_SIGN))
        );
        assert_eq!(
            run(Instruction::F32Copysign, &[Value::F32(nan), Value::from_f32(-1.0)]),
            Ok(Value::F32(nan | F32_SIGN))
        );
        assert_eq!(
            run(Instruction::F64Abs, &[Value::from_f64(-2.0)]),
            Ok(Value::from_f64(2.0))
        );
    }

    #[test]
    fn conversions_and_extension() {
        assert_eq!(run(Instruction::I32Extend8S, &[Value::I32(0x80)]), Ok(Value::I32(-128)));
        assert_eq!(
            run(Instruction::I64ExtendI32U, &[Value::I32(-1)]),
            Ok(Value::I64(0xFFFF_FFFF))
        );
        assert_eq!(
            run(Instruction::F64ConvertI64U, &[Value::I64(-1)]),
            Ok(Value::from_f64(18_446_744_073_709_551_616.0))
        );
        assert_eq!(
            run(Instruction::I32ReinterpretF32, &[Value::from_f32(1.0)]),
            Ok(Value::I32(0x3F80_0000))
        );
        assert_eq!(run(Instruction::I64Eqz, &[Value::I64(0)]), Ok(Value::I32(1)));
    }

    #[test]
    fn non_numeric_left_alone() {
        let mut s = Stack::new(4);
        assert_eq!(execute(&mut s, &Instruction::Nop), Ok(false));
        assert!(s.is_empty());
    }

    #[test]
    fn operand_type_mismatch_traps() {
        assert!(matches!(
            run(Instruction::I32Add, &[Value::I32(1), Value::I64(1)]),
            Err(Trap::TypeMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn i32_arith_wraps(a in any::<i32>(), b in any::<i32>()) {
            prop_assert_eq!(run(Instruction::I32Add, &[Value::I32(a), Value::I32(b)]), Ok(Value::I32(a.wrapping_add(b))));
            prop_assert_eq!(run(Instruction::I32Sub, &[Value::I32(a), Value::I32(b)]), Ok(Value::I32(a.wrapping_sub(b))));
            prop_assert_eq!(run(Instruction::I32Mul, &[Value::I32(a), Value::I32(b)]), Ok(Value::I32(a.wrapping_mul(b))));
        }

        #[test]
        fn i64_arith_wraps(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(run(Instruction::I64Add, &[Value::I64(a), Value::I64(b)]), Ok(Value::I64(a.wrapping_add(b))));
            prop_assert_eq!(run(Instruction::I64Mul, &[Value::I64(a), Value::I64(b)]), Ok(Value::I64(a.wrapping_mul(b))));
        }

        #[test]
        fn unsigned_div_matches_rust(a in any::<u32>(), b in 1u32..) {
            prop_assert_eq!(i32_div_u(a as i32, b as i32), Ok((a / b) as i32));
            prop_assert_eq!(i32_rem_u(a as i32, b as i32), Ok((a % b) as i32));
        }
    }
}
