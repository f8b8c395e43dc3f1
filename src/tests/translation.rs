use crate::dex::{CatchHandler, DalvikInstruction, DexFile, MethodId, TryItem};
use crate::jvm::instructions::JvmInstruction;
use crate::jvm::ops::*;
use crate::jvm::optimization::OptimizationOptions;
use crate::jvm::{ClassWriter, ConstantPool, IrWriter};

use super::fixtures::*;

#[test]
fn empty_void_method_is_a_single_return() {
    let dex = DexFile::new();
    let method = static_method("f", "()V", 0, vec![DalvikInstruction::new(0x0e, 0, 1, vec![])]);
    let attr = code_attr(&dex, &method, &OptimizationOptions::default()).unwrap();
    assert_eq!(code_of(&attr), &[RETURN]);
    assert_eq!(handler_count(&attr), 0);
}

#[test]
fn int_literal_in_float_register_pushes_float_bits() {
    let dex = DexFile::new();
    // const v0, 0xbf800000; return v0
    let method = static_method(
        "f",
        "()F",
        1,
        vec![
            DalvikInstruction::new(0x14, 0, 3, vec![0, 0xbf80_0000u32 as i32]),
            DalvikInstruction::new(0x0f, 3, 4, vec![0]),
        ],
    );

    for options in [OptimizationOptions::NONE, OptimizationOptions::PRETTY] {
        let attr = code_attr(&dex, &method, &options).unwrap();
        let code = code_of(&attr);
        assert!(contains_seq(code, &[ICONST_M1, I2F]), "{:?}", code);
        assert_eq!(code.last(), Some(&FRETURN));
    }

    let attr = code_attr(&dex, &method, &OptimizationOptions::PRETTY).unwrap();
    assert_eq!(code_of(&attr), &[ICONST_M1, I2F, FRETURN]);
}

fn huge_switch() -> crate::dex::DexMethod {
    // packed-switch over 70000 keys, all of them leaving through the second return
    let switch = DalvikInstruction::new(0x2b, 0, 3, vec![0, 8]).with_switch((0..70_000).map(|k| (k, 4)));
    static_method(
        "dispatch",
        "(I)V",
        1,
        vec![
            switch,
            DalvikInstruction::new(0x0e, 3, 4, vec![]),
            DalvikInstruction::new(0x0e, 4, 5, vec![]),
        ],
    )
}

#[test]
fn oversized_switch_needs_the_optimized_retry() {
    let method = huge_switch();
    let dex = DexFile::new();

    let err = code_attr(&dex, &method, &OptimizationOptions::default()).unwrap_err();
    assert!(err.is_limit_exceeded());

    let cls = class("a/B", vec![method]);
    let bytes = ClassWriter::new(&dex, OptimizationOptions::default()).to_class_file(&cls).unwrap();
    assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
    // the retry always uses the split pool, which is written at full size
    assert_eq!(&bytes[8..10], &[0xff, 0xff]);
}

#[test]
fn null_or_int_array_needs_no_cast() {
    let mut dex = DexFile::new();
    let int_arr = dex.add_type("[I") as i32;
    // v0 = (p0 == 0) ? null : new int[p0]; return v0.length
    let method = static_method(
        "len",
        "(I)I",
        2,
        vec![
            DalvikInstruction::new(0x38, 0, 2, vec![1, 6]),
            DalvikInstruction::new(0x23, 2, 4, vec![0, 1, int_arr]),
            DalvikInstruction::new(0x28, 4, 5, vec![7]),
            DalvikInstruction::new(0x00, 5, 6, vec![]),
            DalvikInstruction::new(0x12, 6, 7, vec![0, 0]),
            DalvikInstruction::new(0x21, 7, 8, vec![0, 0]),
            DalvikInstruction::new(0x0f, 8, 9, vec![0]),
        ],
    );

    let mut pool = ConstantPool::simple();
    let code = method.code.as_ref().unwrap();
    let ir = IrWriter::write_bytecode(&dex, &method, code, &mut pool, &OptimizationOptions::NONE).unwrap();
    let insns: Vec<&JvmInstruction> = ir.flat.iter().map(|id| ir.insn(*id)).collect();
    assert!(insns.contains(&&JvmInstruction::other(ARRAYLENGTH)));
    assert!(!insns.iter().any(|i| matches!(i, JvmInstruction::Other(b) if b[0] == CHECKCAST)));

    assert!(code_attr(&dex, &method, &OptimizationOptions::PRETTY).is_ok());
    assert!(code_attr(&dex, &method, &OptimizationOptions::ALL).is_ok());
}

#[test]
fn guarded_call_gets_one_handler_row() {
    let mut dex = DexFile::new();
    let callee = dex.add_method(MethodId::from_descriptor("a/B", "g", "()V").unwrap());
    let mut method = static_method(
        "f",
        "()V",
        0,
        vec![
            DalvikInstruction::new(0x71, 0, 3, vec![callee as i32]),
            DalvikInstruction::new(0x0e, 3, 4, vec![]),
            DalvikInstruction::new(0x0e, 4, 5, vec![]),
        ],
    );
    if let Some(code) = method.code.as_mut() {
        code.tries = vec![TryItem {
            start: 0,
            end: 3,
            handlers: vec![CatchHandler { class_name: Some("java/io/IOException".to_string()), target: 4 }],
        }];
    }

    let attr = code_attr(&dex, &method, &OptimizationOptions::PRETTY).unwrap();
    let code = code_of(&attr);
    // invokestatic, return, then the handler: pop and return
    assert_eq!(code.len(), 6);
    assert_eq!(&code[3..], &[RETURN, POP, RETURN]);
    assert_eq!(handler_count(&attr), 1);
    let at = 8 + code.len() + 2;
    assert_eq!(&attr[at..at + 6], &[0, 0, 0, 3, 0, 4]);
}

#[test]
fn malformed_body_reports_where() {
    let dex = DexFile::new();
    // move-result with nothing before it
    let method = static_method("f", "()V", 1, vec![DalvikInstruction::new(0x0a, 0, 1, vec![0])]);
    let cls = class("a/Bad", vec![method]);
    let err = ClassWriter::new(&dex, OptimizationOptions::default()).to_class_file(&cls).unwrap_err();
    assert!(!err.is_limit_exceeded());
    assert!(err.to_string().ends_with("for method f of class a/Bad"), "{}", err);
}
