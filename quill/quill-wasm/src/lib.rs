//! quill-wasm: WebAssembly binary decoder and stack-machine interpreter.
//!
//! `decode` turns module bytes into a [`Module`], `instantiate` links it into a [`Store`]
//! against an [`ImportResolver`], and `invoke` calls an exported function.

pub mod binary;
pub mod config;
pub mod error;
pub mod host;
pub mod model;
pub mod runtime;
pub mod vm;

use tracing::instrument;

pub use config::Config;
pub use error::{DecodeError, LinkError, Trap};
pub use host::{HostEnv, HostFunction, HostItem, ImportResolver};
pub use model::{FuncType, Module, ValType, Value};
pub use runtime::{instantiate, ExternVal, InstanceHandle, Store};

/// Decode a WebAssembly binary into a [`Module`].
#[instrument(skip_all, fields(len = bytes.len()))]
pub fn decode(bytes: &[u8]) -> Result<Module, DecodeError> {
    binary::sections::decode_module(bytes)
}

/// Invoke the function exported as `name` by the instance `handle`.
///
/// Host functions may call this re-entrantly with the store they receive.
#[instrument(skip(store, args), fields(instance = handle.0))]
pub fn invoke(
    store: &mut Store,
    handle: InstanceHandle,
    name: &str,
    args: &[Value],
) -> Result<Vec<Value>, Trap> {
    match store.instance(handle)?.export(name) {
        Some(ExternVal::Func(addr)) => vm::invoke_func(store, addr, args),
        Some(_) => Err(Trap::NotAFunction(name.to_owned())),
        None => Err(Trap::ExportNotFound(name.to_owned())),
    }
}
