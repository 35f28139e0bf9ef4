mod common;

use common::*;
use proptest::prelude::*;
use quill_wasm::model::{ExportDesc, Instruction};
use quill_wasm::{decode, DecodeError, FuncType, ValType};

#[test]
fn decodes_a_complete_module() {
    let m = decode(&fib_module()).unwrap();
    assert_eq!(m.types, vec![FuncType::new([ValType::I32], [ValType::I32])]);
    assert_eq!(m.func_type_indices, vec![0]);
    assert_eq!(m.exports.len(), 1);
    assert_eq!(m.exports[0].name, "fib");
    assert_eq!(m.exports[0].desc, ExportDesc::Func(0));

    let body = m.functions[0].body.instructions();
    assert_eq!(body.first(), Some(&Instruction::LocalGet(0)));
    assert_eq!(body.last(), Some(&Instruction::End));
    assert!(body.contains(&Instruction::Call(0)));
}

#[test]
fn function_types_span_imports_and_definitions() {
    let bytes = ModuleBuilder::new()
        .types(&[(&[I32], &[I32]), (&[], &[I64])])
        .section(2, {
            let mut i = name("env");
            i.extend(name("tick"));
            i.extend([KIND_FUNC, 0x01]);
            vec_of(&[i])
        })
        .functions(&[0])
        .code(&[(&[], vec![0x20, 0x00, 0x0B])])
        .build();
    let m = decode(&bytes).unwrap();
    assert_eq!(m.imported_funcs, 1);
    assert_eq!(m.func_type_of(0), Some(&FuncType::new([], [ValType::I64])));
    assert_eq!(
        m.func_type_of(1),
        Some(&FuncType::new([ValType::I32], [ValType::I32]))
    );
    assert_eq!(m.func_type_of(2), None);
}

#[test]
fn header_only_module_is_empty() {
    let m = decode(&ModuleBuilder::new().build()).unwrap();
    assert!(m.types.is_empty());
    assert!(m.functions.is_empty());
    assert_eq!(m.start, None);
}

#[test]
fn corrupted_magic_is_rejected_before_sections() {
    let mut bytes = fib_module();
    bytes[0] = 0x01;
    // Garbage after the header must not matter.
    bytes.truncate(12);
    assert_eq!(
        decode(&bytes),
        Err(DecodeError::BadMagic { found: 0x6D73_6101 })
    );
}

#[test]
fn unsupported_version_is_rejected() {
    let mut bytes = ModuleBuilder::new().build();
    bytes[4] = 2;
    assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion { found: 2 }));
}

#[test]
fn function_and_code_counts_must_agree() {
    let bytes = ModuleBuilder::new()
        .types(&[(&[], &[])])
        .functions(&[0, 0])
        .code(&[(&[], vec![0x0B])])
        .build();
    assert_eq!(
        decode(&bytes),
        Err(DecodeError::FunctionCodeMismatch {
            functions: 2,
            bodies: 1
        })
    );
}

#[test]
fn section_payload_must_be_consumed_exactly() {
    let mut payload = vec_of(&[vec![0x60, 0x00, 0x00]]);
    payload.push(0xAA);
    let bytes = ModuleBuilder::new().section(1, payload).build();
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::SectionSizeMismatch { id: 1, .. })
    ));
}

#[test]
fn unknown_section_and_opcode_are_reported() {
    let bytes = ModuleBuilder::new().section(0x2A, vec![]).build();
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::UnknownSection { id: 0x2A, .. })
    ));

    let bytes = ModuleBuilder::new()
        .types(&[(&[], &[])])
        .functions(&[0])
        .code(&[(&[], vec![0xFF, 0x0B])])
        .build();
    assert!(matches!(
        decode(&bytes),
        Err(DecodeError::UnknownOpcode { opcode: 0xFF, sub: None, .. })
    ));
}

#[test]
fn truncated_input_never_yields_a_partial_module() {
    let bytes = fib_module();
    assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    for len in 9..bytes.len() {
        // A prefix may end on a section boundary; it must then hold no half-declared functions.
        if let Ok(m) = decode(&bytes[..len]) {
            assert!(m.func_type_indices.is_empty(), "prefix of {len} bytes");
            assert!(m.functions.is_empty(), "prefix of {len} bytes");
        }
    }
}

#[test]
fn custom_sections_keep_name_and_payload() {
    let mut payload = name("meta");
    payload.extend([1, 2, 3]);
    let bytes = ModuleBuilder::new()
        .section(0, payload)
        .types(&[(&[], &[])])
        .build();
    let m = decode(&bytes).unwrap();
    assert_eq!(m.customs.len(), 1);
    assert_eq!(m.customs[0].name, "meta");
    assert_eq!(m.customs[0].payload, vec![1, 2, 3]);
}

proptest! {
    #[test]
    fn arbitrary_bodies_never_panic(body in proptest::collection::vec(any::<u8>(), 0..64)) {
        let bytes = ModuleBuilder::new()
            .types(&[(&[], &[])])
            .functions(&[0])
            .code(&[(&[], body)])
            .build();
        let _ = decode(&bytes);
    }

    #[test]
    fn arbitrary_bytes_after_header_never_panic(tail in proptest::collection::vec(any::<u8>(), 0..128)) {
        let mut bytes = ModuleBuilder::new().build();
        bytes.extend(tail);
        let _ = decode(&bytes);
    }
}
