//! Global instance: a typed value cell with declared mutability.

use crate::error::Trap;
use crate::model::{GlobalType, Value};

#[derive(Debug, Clone)]
pub struct GlobalInstance {
    ty: GlobalType,
    val: Value,
}

impl GlobalInstance {
    pub fn new(ty: GlobalType, init: Value) -> Self {
        Self { ty, val: init }
    }

    pub fn get(&self) -> Value {
        self.val
    }

    /// Replace the value. Mutability is enforced by the caller (`global.set` resolves the
    /// index first); the value type is checked here.
    pub fn set(&mut self, v: Value) -> Result<(), Trap> {
        if v.ty() != self.ty.val_type {
            return Err(Trap::TypeMismatch {
                expected: self.ty.val_type,
                found: v.ty(),
            });
        }
        self.val = v;
        Ok(())
    }

    pub fn ty(&self) -> &GlobalType {
        &self.ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValType;

    #[test]
    fn set_checks_value_type() {
        let mut g = GlobalInstance::new(GlobalType::new(ValType::I32, true), Value::I32(1));
        g.set(Value::I32(5)).unwrap();
        assert_eq!(g.get(), Value::I32(5));
        assert_eq!(
            g.set(Value::I64(5)),
            Err(Trap::TypeMismatch {
                expected: ValType::I32,
                found: ValType::I64
            })
        );
    }
}
