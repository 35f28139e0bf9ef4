//! Module instantiation: bind imports, allocate definitions, run initializers, build exports
//! and run the start function.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, instrument};

use super::{
    DataInstance, ElemInstance, ExternVal, FuncInstance, GlobalInstance, InstanceHandle,
    MemoryInstance, ModuleInstance, Store, TableInstance,
};
use crate::error::{LinkError, Trap};
use crate::host::ImportResolver;
use crate::model::{
    DataMode, ElemItems, ElemMode, ExportDesc, Expression, ImportDesc, Module, ValType, Value,
};
use crate::vm::interpreter::{eval_const, invoke_func};

fn mismatch(context: &'static str, expected: impl Debug, found: impl Debug) -> LinkError {
    LinkError::TypeMismatch {
        context,
        expected: format!("{expected:?}"),
        found: format!("{found:?}"),
    }
}

fn out_of_bounds(context: &'static str) -> impl Fn(Trap) -> LinkError {
    move |trap| match trap {
        Trap::IndexOutOfRange { index, .. } => LinkError::IndexOutOfBounds { context, index },
        trap => LinkError::InitTrap { context, trap },
    }
}

fn instance_mut(store: &mut Store, handle: InstanceHandle) -> Result<&mut ModuleInstance, LinkError> {
    store.instance_mut(handle).map_err(|trap| LinkError::InitTrap {
        context: "module instance",
        trap,
    })
}

fn instance(store: &Store, handle: InstanceHandle) -> Result<&ModuleInstance, LinkError> {
    store.instance(handle).map_err(|trap| LinkError::InitTrap {
        context: "module instance",
        trap,
    })
}

/// Evaluate an initializer against the (possibly partial) instance.
fn eval(
    store: &mut Store,
    handle: InstanceHandle,
    expr: &Expression,
    context: &'static str,
) -> Result<Value, LinkError> {
    eval_const(store, handle, expr).map_err(|trap| LinkError::InitTrap { context, trap })
}

fn eval_offset(
    store: &mut Store,
    handle: InstanceHandle,
    expr: &Expression,
    context: &'static str,
) -> Result<u32, LinkError> {
    let value = eval(store, handle, expr, context)?;
    value
        .as_i32()
        .map(|v| v as u32)
        .ok_or_else(|| mismatch(context, ValType::I32, value.ty()))
}

/// Instantiate `module` into `store`, resolving its imports through `resolver`.
///
/// Steps, in order: imports, defined functions/tables/memories, globals, element segments,
/// data segments, exports, start function. Segment and global initializers run on the
/// interpreter against the instance built so far.
#[instrument(skip_all, fields(imports = module.imports.len(), functions = module.functions.len()))]
pub fn instantiate(
    store: &mut Store,
    module: Arc<Module>,
    resolver: &impl ImportResolver,
) -> Result<InstanceHandle, LinkError> {
    let handle = store.alloc_module(ModuleInstance {
        module: Arc::clone(&module),
        ..ModuleInstance::default()
    });

    let mut funcs = Vec::with_capacity(module.total_funcs() as usize);
    let mut tables = Vec::with_capacity(module.total_tables() as usize);
    let mut memories = Vec::with_capacity(module.total_memories() as usize);
    let mut globals = Vec::with_capacity(module.total_globals() as usize);

    // 1) Resolve imports
    for imp in &module.imports {
        let unresolved = || LinkError::UnresolvedImport {
            module: imp.module.clone(),
            name: imp.name.clone(),
        };
        match &imp.desc {
            ImportDesc::Func(type_idx) => {
                let ty = module
                    .types
                    .get(*type_idx as usize)
                    .ok_or(LinkError::IndexOutOfBounds {
                        context: "import type",
                        index: *type_idx,
                    })?;
                let host = resolver
                    .resolve_func(&imp.module, &imp.name, ty)
                    .ok_or_else(unresolved)?;
                if host.ty != *ty {
                    return Err(mismatch("function import", ty, &host.ty));
                }
                funcs.push(store.alloc_func(FuncInstance::Host(host)));
            }
            ImportDesc::Table(tt) => {
                let addr = resolver
                    .resolve_table(&imp.module, &imp.name, tt)
                    .ok_or_else(unresolved)?;
                let table = store.table(addr).map_err(|_| unresolved())?;
                if table.ty().elem != tt.elem {
                    return Err(mismatch("table import element type", tt.elem, table.ty().elem));
                }
                if table.size() < tt.limits.min {
                    return Err(LinkError::TypeMismatch {
                        context: "table import limits",
                        expected: format!("min >= {}", tt.limits.min),
                        found: format!("size {}", table.size()),
                    });
                }
                tables.push(addr);
            }
            ImportDesc::Memory(mt) => {
                let addr = resolver
                    .resolve_memory(&imp.module, &imp.name, mt)
                    .ok_or_else(unresolved)?;
                let mem = store.memory(addr).map_err(|_| unresolved())?;
                if mem.size_pages() < mt.limits.min {
                    return Err(LinkError::TypeMismatch {
                        context: "memory import limits",
                        expected: format!("min >= {}", mt.limits.min),
                        found: format!("size {}", mem.size_pages()),
                    });
                }
                memories.push(addr);
            }
            ImportDesc::Global(gt) => {
                let value = resolver
                    .resolve_global(&imp.module, &imp.name, gt)
                    .ok_or_else(unresolved)?;
                if value.ty() != gt.val_type {
                    return Err(mismatch("global import", gt.val_type, value.ty()));
                }
                globals.push(store.alloc_global(GlobalInstance::new(*gt, value)));
            }
        }
    }

    // 2) Define functions, tables, memories
    for (def_index, type_idx) in module.func_type_indices.iter().enumerate() {
        let ty = module
            .func_type_of(module.imported_funcs + def_index as u32)
            .ok_or(LinkError::IndexOutOfBounds {
                context: "function type",
                index: *type_idx,
            })?
            .clone();
        funcs.push(store.alloc_func(FuncInstance::Wasm {
            ty,
            module: handle,
            def_index,
        }));
    }

    let max_elements = store.config().max_table_elements;
    for tt in &module.tables {
        if tt.limits.min > max_elements {
            return Err(LinkError::ResourceLimit {
                context: "table",
                requested: tt.limits.min.into(),
                limit: max_elements.into(),
            });
        }
        let table = TableInstance::new(*tt).ok_or(LinkError::ResourceLimit {
            context: "table allocation",
            requested: tt.limits.min.into(),
            limit: max_elements.into(),
        })?;
        tables.push(store.alloc_table(table));
    }

    let max_pages = store.config().max_memory_pages;
    for mt in &module.memories {
        if mt.limits.min > max_pages {
            return Err(LinkError::ResourceLimit {
                context: "memory",
                requested: mt.limits.min.into(),
                limit: max_pages.into(),
            });
        }
        let memory = MemoryInstance::new(*mt).ok_or(LinkError::ResourceLimit {
            context: "memory allocation",
            requested: mt.limits.min.into(),
            limit: max_pages.into(),
        })?;
        memories.push(store.alloc_memory(memory));
    }

    {
        let inst = instance_mut(store, handle)?;
        inst.funcs = funcs;
        inst.tables = tables;
        inst.memories = memories;
        inst.globals = globals;
    }

    // 3) Globals, each visible to the initializers after it
    for global in &module.globals {
        let value = eval(store, handle, &global.init, "global initializer")?;
        if value.ty() != global.ty.val_type {
            return Err(mismatch("global initializer", global.ty.val_type, value.ty()));
        }
        let addr = store.alloc_global(GlobalInstance::new(global.ty, value));
        instance_mut(store, handle)?.globals.push(addr);
    }

    // 4) Element segments
    let mut elems = Vec::with_capacity(module.elements.len());
    for seg in &module.elements {
        let refs = match &seg.items {
            ElemItems::Funcs(indices) => {
                let inst = instance(store, handle)?;
                indices
                    .iter()
                    .map(|idx| inst.func_addr(*idx).map(|addr| Value::FuncRef(Some(addr))))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(out_of_bounds("element function"))?
            }
            ElemItems::Exprs(exprs) => {
                let mut refs = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    refs.push(eval(store, handle, expr, "element item")?);
                }
                refs
            }
        };
        elems.push(store.alloc_elem(ElemInstance { refs }));
    }
    instance_mut(store, handle)?.elems = elems.clone();

    for (seg, &addr) in module.elements.iter().zip(&elems) {
        match &seg.mode {
            ElemMode::Passive => {}
            ElemMode::Declarative => store
                .elem_mut(addr)
                .map_err(out_of_bounds("element segment"))?
                .drop_items(),
            ElemMode::Active { table, offset } => {
                let dst = eval_offset(store, handle, offset, "element offset")?;
                let taddr = instance(store, handle)?
                    .table_addr(*table)
                    .map_err(out_of_bounds("element table"))?;
                // Taking the items also performs the implicit elem.drop.
                let refs = std::mem::take(
                    &mut store.elem_mut(addr).map_err(out_of_bounds("element segment"))?.refs,
                );
                store
                    .table_mut(taddr)
                    .and_then(|t| t.init(dst, &refs, 0, refs.len() as u32))
                    .map_err(|_| LinkError::ElemOutOfBounds)?;
            }
        }
    }

    // 5) Data segments
    let datas: Vec<usize> = module
        .data
        .iter()
        .map(|seg| {
            store.alloc_data(DataInstance {
                bytes: seg.init.clone(),
            })
        })
        .collect();
    instance_mut(store, handle)?.datas = datas.clone();

    for (seg, &addr) in module.data.iter().zip(&datas) {
        if let DataMode::Active { memory, offset } = &seg.mode {
            let dst = eval_offset(store, handle, offset, "data offset")?;
            let maddr = instance(store, handle)?
                .memory_addr(*memory)
                .map_err(out_of_bounds("data memory"))?;
            let bytes = std::mem::take(
                &mut store.data_mut(addr).map_err(out_of_bounds("data segment"))?.bytes,
            );
            store
                .memory_mut(maddr)
                .and_then(|m| m.init(dst.into(), &bytes, 0, bytes.len() as u64))
                .map_err(|_| LinkError::DataOutOfBounds)?;
        }
    }

    // 6) Exports
    let mut exports = HashMap::with_capacity(module.exports.len());
    {
        let inst = instance(store, handle)?;
        for ex in &module.exports {
            let val = match ex.desc {
                ExportDesc::Func(idx) => inst.func_addr(idx).map(ExternVal::Func),
                ExportDesc::Table(idx) => inst.table_addr(idx).map(ExternVal::Table),
                ExportDesc::Memory(idx) => inst.memory_addr(idx).map(ExternVal::Memory),
                ExportDesc::Global(idx) => inst.global_addr(idx).map(ExternVal::Global),
            }
            .map_err(out_of_bounds("export"))?;
            exports.insert(ex.name.clone(), val);
        }
    }
    instance_mut(store, handle)?.exports = exports;

    // 7) Start function
    if let Some(start) = module.start {
        let addr = instance(store, handle)?
            .func_addr(start)
            .map_err(out_of_bounds("start function"))?;
        debug!(start, addr, "running start function");
        invoke_func(store, addr, &[]).map_err(LinkError::StartTrap)?;
    }

    debug!(instance = handle.0, "module instantiated");
    Ok(handle)
}
