//! Module sections: ids, headers, payload decoders and the top-level module decoder.
//!
//! Each payload is decoded from its own bounded cursor and must be consumed exactly.

use tracing::{debug, trace};

use super::{
    cursor::Cursor,
    instr::{read_expression, read_ref_type, read_val_type},
    leb128,
    reader::{read_len_prefixed_bytes, read_name, read_vec},
};
use crate::error::DecodeError;
use crate::model::{
    CustomSection, DataMode, DataSegment, ElemItems, ElemMode, ElementSegment, Export, ExportDesc,
    Expression, FuncIdx, FuncType, Function, Global, GlobalType, Import, ImportDesc, Limits,
    MemoryType, Module, RefType, TableType, ValType,
};

type Result<T> = core::result::Result<T, DecodeError>;

/// `\0asm`
pub const MAGIC: u32 = 0x6D_73_61_00;
pub const VERSION: u32 = 1;

/// Upper bound on declared locals per function body.
pub const MAX_LOCALS: u64 = 50_000;

/// Section identifiers in the module binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => SectionId::Custom,
            1 => SectionId::Type,
            2 => SectionId::Import,
            3 => SectionId::Function,
            4 => SectionId::Table,
            5 => SectionId::Memory,
            6 => SectionId::Global,
            7 => SectionId::Export,
            8 => SectionId::Start,
            9 => SectionId::Element,
            10 => SectionId::Code,
            11 => SectionId::Data,
            12 => SectionId::DataCount,
            _ => return None,
        })
    }

    /// Position in the canonical order. DataCount sits between Element and Code even though
    /// its id is the largest.
    fn ordering_key(self) -> u8 {
        match self {
            SectionId::Custom => 0,
            SectionId::DataCount => 10,
            SectionId::Code => 11,
            SectionId::Data => 12,
            other => other as u8,
        }
    }
}

/// A section's id, payload length and the absolute offset its payload starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub id: SectionId,
    pub payload_len: u32,
    pub payload_offset: usize,
}

/// Read `[id: u8][size: uleb32]`.
pub fn read_section_header(cur: &mut Cursor) -> Result<SectionHeader> {
    let offset = cur.offset();
    let id_byte = cur.read_u8()?;
    let id = SectionId::from_byte(id_byte).ok_or(DecodeError::UnknownSection {
        id: id_byte,
        offset,
    })?;
    let payload_len = leb128::read_uleb_u32(cur)?;
    Ok(SectionHeader {
        id,
        payload_len,
        payload_offset: cur.offset(),
    })
}

/* ---------- Type readers ---------- */

pub(crate) fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    let offset = cur.offset();
    match cur.read_u8()? {
        0x00 => Ok(Limits::new(leb128::read_uleb_u32(cur)?, None)),
        0x01 => {
            let min = leb128::read_uleb_u32(cur)?;
            let max = leb128::read_uleb_u32(cur)?;
            if max < min {
                return Err(DecodeError::Malformed {
                    offset,
                    msg: "limits maximum below minimum",
                });
            }
            Ok(Limits::new(min, Some(max)))
        }
        _ => Err(DecodeError::Malformed {
            offset,
            msg: "invalid limits flag",
        }),
    }
}

fn read_func_type(cur: &mut Cursor) -> Result<FuncType> {
    let offset = cur.offset();
    if cur.read_u8()? != 0x60 {
        return Err(DecodeError::Malformed {
            offset,
            msg: "expected function type form 0x60",
        });
    }
    let params: Vec<ValType> = read_vec(cur, read_val_type)?;
    let results: Vec<ValType> = read_vec(cur, read_val_type)?;
    Ok(FuncType::new(params, results))
}

fn read_table_type(cur: &mut Cursor) -> Result<TableType> {
    let elem = read_ref_type(cur)?;
    let limits = read_limits(cur)?;
    Ok(TableType { elem, limits })
}

fn read_memory_type(cur: &mut Cursor) -> Result<MemoryType> {
    let limits = read_limits(cur)?;
    Ok(MemoryType { limits })
}

fn read_global_type(cur: &mut Cursor) -> Result<GlobalType> {
    let val_type = read_val_type(cur)?;
    let offset = cur.offset();
    let mutable = match cur.read_u8()? {
        0x00 => false,
        0x01 => true,
        _ => {
            return Err(DecodeError::Malformed {
                offset,
                msg: "invalid global mutability",
            })
        }
    };
    Ok(GlobalType::new(val_type, mutable))
}

fn read_index(cur: &mut Cursor) -> Result<u32> {
    Ok(leb128::read_uleb_u32(cur)?)
}

/* ---------- Section readers ---------- */

struct Imports {
    imports: Vec<Import>,
    funcs: u32,
    tables: u32,
    memories: u32,
    globals: u32,
}

fn read_import_section(cur: &mut Cursor) -> Result<Imports> {
    let imports: Vec<Import> = read_vec(cur, |c| {
        let module = read_name(c)?;
        let name = read_name(c)?;
        let offset = c.offset();
        let desc = match c.read_u8()? {
            0x00 => ImportDesc::Func(read_index(c)?),
            0x01 => ImportDesc::Table(read_table_type(c)?),
            0x02 => ImportDesc::Memory(read_memory_type(c)?),
            0x03 => ImportDesc::Global(read_global_type(c)?),
            _ => {
                return Err(DecodeError::Malformed {
                    offset,
                    msg: "invalid import kind",
                })
            }
        };
        Ok(Import { module, name, desc })
    })?;

    let mut out = Imports {
        imports: Vec::new(),
        funcs: 0,
        tables: 0,
        memories: 0,
        globals: 0,
    };
    for imp in &imports {
        match imp.desc {
            ImportDesc::Func(_) => out.funcs += 1,
            ImportDesc::Table(_) => out.tables += 1,
            ImportDesc::Memory(_) => out.memories += 1,
            ImportDesc::Global(_) => out.globals += 1,
        }
    }
    out.imports = imports;
    Ok(out)
}

fn read_global_section(cur: &mut Cursor, types: &[FuncType]) -> Result<Vec<Global>> {
    read_vec(cur, |c| {
        let ty = read_global_type(c)?;
        let init = read_expression(c, types)?;
        Ok(Global { ty, init })
    })
}

fn read_export_section(cur: &mut Cursor) -> Result<Vec<Export>> {
    read_vec(cur, |c| {
        let name = read_name(c)?;
        let offset = c.offset();
        let desc = match c.read_u8()? {
            0x00 => ExportDesc::Func(read_index(c)?),
            0x01 => ExportDesc::Table(read_index(c)?),
            0x02 => ExportDesc::Memory(read_index(c)?),
            0x03 => ExportDesc::Global(read_index(c)?),
            _ => {
                return Err(DecodeError::Malformed {
                    offset,
                    msg: "invalid export kind",
                })
            }
        };
        Ok(Export { name, desc })
    })
}

fn read_elem_kind(cur: &mut Cursor) -> Result<RefType> {
    let offset = cur.offset();
    match cur.read_u8()? {
        0x00 => Ok(RefType::FuncRef),
        _ => Err(DecodeError::Malformed {
            offset,
            msg: "invalid element kind",
        }),
    }
}

fn read_func_indices(cur: &mut Cursor) -> Result<ElemItems> {
    Ok(ElemItems::Funcs(read_vec(cur, read_index)?))
}

fn read_item_exprs(cur: &mut Cursor, types: &[FuncType]) -> Result<ElemItems> {
    Ok(ElemItems::Exprs(read_vec(cur, |c| read_expression(c, types))?))
}

/// One element segment. The flag's bits select passive/declarative (bit 0), an explicit
/// table index or declarative mode (bit 1), and expression items (bit 2).
fn read_element_segment(cur: &mut Cursor, types: &[FuncType]) -> Result<ElementSegment> {
    let offset = cur.offset();
    let flags = leb128::read_uleb_u32(cur)?;
    let active = |table, offset: Expression| ElemMode::Active { table, offset };

    let seg = match flags {
        0 => {
            let offset = read_expression(cur, types)?;
            let items = read_func_indices(cur)?;
            ElementSegment { ty: RefType::FuncRef, items, mode: active(0, offset) }
        }
        1 => {
            let ty = read_elem_kind(cur)?;
            let items = read_func_indices(cur)?;
            ElementSegment { ty, items, mode: ElemMode::Passive }
        }
        2 => {
            let table = read_index(cur)?;
            let offset = read_expression(cur, types)?;
            let ty = read_elem_kind(cur)?;
            let items = read_func_indices(cur)?;
            ElementSegment { ty, items, mode: active(table, offset) }
        }
        3 => {
            let ty = read_elem_kind(cur)?;
            let items = read_func_indices(cur)?;
            ElementSegment { ty, items, mode: ElemMode::Declarative }
        }
        4 => {
            let offset = read_expression(cur, types)?;
            let items = read_item_exprs(cur, types)?;
            ElementSegment { ty: RefType::FuncRef, items, mode: active(0, offset) }
        }
        5 => {
            let ty = read_ref_type(cur)?;
            let items = read_item_exprs(cur, types)?;
            ElementSegment { ty, items, mode: ElemMode::Passive }
        }
        6 => {
            let table = read_index(cur)?;
            let offset = read_expression(cur, types)?;
            let ty = read_ref_type(cur)?;
            let items = read_item_exprs(cur, types)?;
            ElementSegment { ty, items, mode: active(table, offset) }
        }
        7 => {
            let ty = read_ref_type(cur)?;
            let items = read_item_exprs(cur, types)?;
            ElementSegment { ty, items, mode: ElemMode::Declarative }
        }
        _ => {
            return Err(DecodeError::Malformed {
                offset,
                msg: "invalid element segment flags",
            })
        }
    };
    Ok(seg)
}

fn read_data_segment(cur: &mut Cursor, types: &[FuncType]) -> Result<DataSegment> {
    let offset = cur.offset();
    let mode = match leb128::read_uleb_u32(cur)? {
        0 => DataMode::Active {
            memory: 0,
            offset: read_expression(cur, types)?,
        },
        1 => DataMode::Passive,
        2 => {
            let memory = read_index(cur)?;
            DataMode::Active {
                memory,
                offset: read_expression(cur, types)?,
            }
        }
        _ => {
            return Err(DecodeError::Malformed {
                offset,
                msg: "invalid data segment flags",
            })
        }
    };
    let init = read_len_prefixed_bytes(cur)?;
    Ok(DataSegment { mode, init })
}

/// A code entry before it is paired with its Function-section type index.
struct Body {
    locals: Vec<ValType>,
    expr: Expression,
}

fn read_code_entry(cur: &mut Cursor, types: &[FuncType]) -> Result<Body> {
    let size = leb128::read_uleb_u32(cur)? as usize;
    let mut sub = cur.sub_cursor(size)?;

    let groups_offset = sub.offset();
    let groups: Vec<(u32, ValType)> = read_vec(&mut sub, |c| {
        let n = leb128::read_uleb_u32(c)?;
        Ok::<_, DecodeError>((n, read_val_type(c)?))
    })?;
    let total: u64 = groups.iter().map(|(n, _)| u64::from(*n)).sum();
    if total > MAX_LOCALS {
        return Err(DecodeError::Malformed {
            offset: groups_offset,
            msg: "too many locals",
        });
    }
    let mut locals = Vec::with_capacity(total as usize);
    for (n, ty) in groups {
        locals.extend(std::iter::repeat(ty).take(n as usize));
    }

    let expr = read_expression(&mut sub, types)?;
    if !sub.is_eof() {
        return Err(DecodeError::Malformed {
            offset: sub.offset(),
            msg: "function body size mismatch",
        });
    }
    Ok(Body { locals, expr })
}

/* ---------- Top-level module decoder ---------- */

/// Decode a complete module from raw bytes.
pub fn decode_module(bytes: &[u8]) -> Result<Module> {
    let mut cur = Cursor::new(bytes);

    let magic = cur.read_u32_le()?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic { found: magic });
    }
    let version = cur.read_u32_le()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion { found: version });
    }

    let mut module = Module::default();
    let mut bodies: Vec<Body> = Vec::new();
    let mut last_key: u8 = 0;

    while !cur.is_eof() {
        let header = read_section_header(&mut cur)?;
        let mut payload = cur.sub_cursor(header.payload_len as usize)?;
        debug!(
            id = ?header.id,
            size = header.payload_len,
            offset = header.payload_offset,
            "decoding section"
        );

        if header.id != SectionId::Custom {
            let key = header.id.ordering_key();
            if key == last_key {
                return Err(DecodeError::Malformed {
                    offset: header.payload_offset,
                    msg: "duplicate section",
                });
            }
            if key < last_key {
                return Err(DecodeError::Malformed {
                    offset: header.payload_offset,
                    msg: "section out of order",
                });
            }
            last_key = key;
        }

        let types = &module.types;
        match header.id {
            SectionId::Custom => {
                let name = read_name(&mut payload)?;
                let rest = payload.read_bytes(payload.remaining())?.to_vec();
                trace!(%name, len = rest.len(), "custom section");
                module.customs.push(CustomSection {
                    name,
                    payload: rest,
                });
            }
            SectionId::Type => module.types = read_vec(&mut payload, read_func_type)?,
            SectionId::Import => {
                let imports = read_import_section(&mut payload)?;
                module.imports = imports.imports;
                module.imported_funcs = imports.funcs;
                module.imported_tables = imports.tables;
                module.imported_memories = imports.memories;
                module.imported_globals = imports.globals;
            }
            SectionId::Function => module.func_type_indices = read_vec(&mut payload, read_index)?,
            SectionId::Table => module.tables = read_vec(&mut payload, read_table_type)?,
            SectionId::Memory => module.memories = read_vec(&mut payload, read_memory_type)?,
            SectionId::Global => module.globals = read_global_section(&mut payload, types)?,
            SectionId::Export => module.exports = read_export_section(&mut payload)?,
            SectionId::Start => {
                module.start = Some(read_index(&mut payload)? as FuncIdx);
            }
            SectionId::Element => {
                module.elements = read_vec(&mut payload, |c| read_element_segment(c, types))?
            }
            SectionId::DataCount => module.data_count = Some(read_index(&mut payload)?),
            SectionId::Code => bodies = read_vec(&mut payload, |c| read_code_entry(c, types))?,
            SectionId::Data => {
                module.data = read_vec(&mut payload, |c| read_data_segment(c, types))?
            }
        }

        if !payload.is_eof() {
            return Err(DecodeError::SectionSizeMismatch {
                id: header.id as u8,
                declared: header.payload_len,
                consumed: payload.consumed(),
            });
        }
    }

    if module.func_type_indices.len() != bodies.len() {
        return Err(DecodeError::FunctionCodeMismatch {
            functions: module.func_type_indices.len(),
            bodies: bodies.len(),
        });
    }
    if let Some(declared) = module.data_count {
        if declared as usize != module.data.len() {
            return Err(DecodeError::DataCountMismatch {
                declared,
                found: module.data.len(),
            });
        }
    }

    module.functions = module
        .func_type_indices
        .iter()
        .zip(bodies)
        .map(|(&type_idx, body)| Function {
            type_idx,
            locals: body.locals,
            body: body.expr,
        })
        .collect();

    debug!(
        types = module.types.len(),
        imports = module.imports.len(),
        functions = module.functions.len(),
        exports = module.exports.len(),
        "module decoded"
    );
    Ok(module)
}
