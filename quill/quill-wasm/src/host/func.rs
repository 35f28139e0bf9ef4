use std::fmt;
use std::sync::Arc;

use crate::error::Trap;
use crate::model::{FuncType, Value};
use crate::runtime::Store;

/// Host function callable from module code. It receives the store so it can inspect memory
/// or re-enter the interpreter through [`crate::invoke`].
pub type HostFunc = dyn Fn(&mut Store, &[Value]) -> Result<Vec<Value>, Trap> + Send + Sync;

/// A host callable together with the signature it implements.
#[derive(Clone)]
pub struct HostFunction {
    pub ty: FuncType,
    pub f: Arc<HostFunc>,
}

impl HostFunction {
    pub fn new<F>(ty: FuncType, f: F) -> Self
    where
        F: Fn(&mut Store, &[Value]) -> Result<Vec<Value>, Trap> + Send + Sync + 'static,
    {
        Self { ty, f: Arc::new(f) }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction").field("ty", &self.ty).finish()
    }
}
