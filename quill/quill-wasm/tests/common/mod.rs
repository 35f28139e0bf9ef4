//! Hand-rolled module byte builder shared by the integration tests.
#![allow(dead_code)]

pub const I32: u8 = 0x7F;
pub const I64: u8 = 0x7E;
pub const F32: u8 = 0x7D;
pub const F64: u8 = 0x7C;
pub const FUNCREF: u8 = 0x70;

pub const KIND_FUNC: u8 = 0x00;
pub const KIND_TABLE: u8 = 0x01;
pub const KIND_MEMORY: u8 = 0x02;
pub const KIND_GLOBAL: u8 = 0x03;

pub fn uleb(mut n: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (n & 0x7F) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub fn sleb(mut n: i64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (n & 0x7F) as u8;
        n >>= 7;
        let done = (n == 0 && byte & 0x40 == 0) || (n == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub fn name(s: &str) -> Vec<u8> {
    let mut out = uleb(s.len() as u64);
    out.extend_from_slice(s.as_bytes());
    out
}

/// Length-prefixed vector of already encoded items.
pub fn vec_of(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = uleb(items.len() as u64);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

/// `i32.const n; end` as an initializer expression.
pub fn i32_const_expr(n: i32) -> Vec<u8> {
    let mut out = vec![0x41];
    out.extend(sleb(n.into()));
    out.push(0x0B);
    out
}

/// Builds a module section by section. Sections are emitted in the order they are added.
#[derive(Default)]
pub struct ModuleBuilder {
    sections: Vec<(u8, Vec<u8>)>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(mut self, id: u8, payload: Vec<u8>) -> Self {
        self.sections.push((id, payload));
        self
    }

    /// Type section from `(params, results)` value-type byte lists.
    pub fn types(self, sigs: &[(&[u8], &[u8])]) -> Self {
        let items: Vec<Vec<u8>> = sigs
            .iter()
            .map(|(params, results)| {
                let mut t = vec![0x60];
                t.extend(uleb(params.len() as u64));
                t.extend_from_slice(params);
                t.extend(uleb(results.len() as u64));
                t.extend_from_slice(results);
                t
            })
            .collect();
        self.section(1, vec_of(&items))
    }

    /// Import section from `(module, name, kind, descriptor bytes)`.
    pub fn imports(self, imports: &[(&str, &str, u8, Vec<u8>)]) -> Self {
        let items: Vec<Vec<u8>> = imports
            .iter()
            .map(|(module, field, kind, desc)| {
                let mut i = name(module);
                i.extend(name(field));
                i.push(*kind);
                i.extend_from_slice(desc);
                i
            })
            .collect();
        self.section(2, vec_of(&items))
    }

    pub fn functions(self, type_indices: &[u32]) -> Self {
        let items: Vec<Vec<u8>> = type_indices.iter().map(|t| uleb((*t).into())).collect();
        self.section(3, vec_of(&items))
    }

    pub fn table(self, min: u32, max: Option<u32>) -> Self {
        let mut t = vec![FUNCREF];
        t.extend(limits(min, max));
        self.section(4, vec_of(&[t]))
    }

    pub fn memory(self, min: u32, max: Option<u32>) -> Self {
        self.section(5, vec_of(&[limits(min, max)]))
    }

    /// Global section from `(value type, mutable, init expression)`.
    pub fn globals(self, globals: &[(u8, bool, Vec<u8>)]) -> Self {
        let items: Vec<Vec<u8>> = globals
            .iter()
            .map(|(ty, mutable, init)| {
                let mut g = vec![*ty, u8::from(*mutable)];
                g.extend_from_slice(init);
                g
            })
            .collect();
        self.section(6, vec_of(&items))
    }

    /// Export section from `(name, kind, index)`.
    pub fn exports(self, exports: &[(&str, u8, u32)]) -> Self {
        let items: Vec<Vec<u8>> = exports
            .iter()
            .map(|(field, kind, idx)| {
                let mut e = name(field);
                e.push(*kind);
                e.extend(uleb((*idx).into()));
                e
            })
            .collect();
        self.section(7, vec_of(&items))
    }

    pub fn start(self, func: u32) -> Self {
        self.section(8, uleb(func.into()))
    }

    /// Element section with flag-0 segments: `(offset, function indices)` into table 0.
    pub fn elements(self, segments: &[(i32, &[u32])]) -> Self {
        let items: Vec<Vec<u8>> = segments
            .iter()
            .map(|(offset, funcs)| {
                let mut s = vec![0x00];
                s.extend(i32_const_expr(*offset));
                let idxs: Vec<Vec<u8>> = funcs.iter().map(|f| uleb((*f).into())).collect();
                s.extend(vec_of(&idxs));
                s
            })
            .collect();
        self.section(9, vec_of(&items))
    }

    /// Code section from `(local groups as (count, type), body bytes including final end)`.
    pub fn code(self, bodies: &[(&[(u32, u8)], Vec<u8>)]) -> Self {
        let items: Vec<Vec<u8>> = bodies
            .iter()
            .map(|(locals, body)| {
                let groups: Vec<Vec<u8>> = locals
                    .iter()
                    .map(|(n, ty)| {
                        let mut g = uleb((*n).into());
                        g.push(*ty);
                        g
                    })
                    .collect();
                let mut func = vec_of(&groups);
                func.extend_from_slice(body);
                let mut entry = uleb(func.len() as u64);
                entry.extend(func);
                entry
            })
            .collect();
        self.section(10, vec_of(&items))
    }

    /// Data section with flag-0 segments: `(offset, bytes)` into memory 0.
    pub fn data(self, segments: &[(i32, &[u8])]) -> Self {
        let items: Vec<Vec<u8>> = segments
            .iter()
            .map(|(offset, bytes)| {
                let mut s = vec![0x00];
                s.extend(i32_const_expr(*offset));
                s.extend(uleb(bytes.len() as u64));
                s.extend_from_slice(bytes);
                s
            })
            .collect();
        self.section(11, vec_of(&items))
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = b"\0asm".to_vec();
        out.extend_from_slice(&1u32.to_le_bytes());
        for (id, payload) in self.sections {
            out.push(id);
            out.extend(uleb(payload.len() as u64));
            out.extend(payload);
        }
        out
    }
}

pub fn limits(min: u32, max: Option<u32>) -> Vec<u8> {
    match max {
        None => {
            let mut l = vec![0x00];
            l.extend(uleb(min.into()));
            l
        }
        Some(max) => {
            let mut l = vec![0x01];
            l.extend(uleb(min.into()));
            l.extend(uleb(max.into()));
            l
        }
    }
}

/// Recursive Fibonacci: `(func (param i32) (result i32))` calling itself as function `self_idx`.
pub fn fib_body(self_idx: u32) -> Vec<u8> {
    let call = |v: &mut Vec<u8>| {
        v.push(0x10);
        v.extend(uleb(self_idx.into()));
    };
    let mut b = vec![
        0x20, 0x00, // local.get 0
        0x41, 0x02, // i32.const 2
        0x48, // i32.lt_s
        0x04, I32, // if (result i32)
        0x20, 0x00, // local.get 0
        0x05, // else
        0x20, 0x00, 0x41, 0x01, 0x6B, // n - 1
    ];
    call(&mut b);
    b.extend([0x20, 0x00, 0x41, 0x02, 0x6B]); // n - 2
    call(&mut b);
    b.extend([0x6A, 0x0B, 0x0B]); // i32.add; end; end
    b
}

/// A module exporting `fib`.
pub fn fib_module() -> Vec<u8> {
    ModuleBuilder::new()
        .types(&[(&[I32], &[I32])])
        .functions(&[0])
        .exports(&[("fib", KIND_FUNC, 0)])
        .code(&[(&[], fib_body(0))])
        .build()
}
