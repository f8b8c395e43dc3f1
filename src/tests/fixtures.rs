use crate::dex::dex_file::{ACC_PUBLIC, ACC_STATIC};
use crate::dex::{CodeItem, DalvikInstruction, DexClass, DexFile, DexMethod, MethodId};
use crate::error::TranslateError;
use crate::jvm::assembler;
use crate::jvm::optimization::{self, OptimizationOptions};
use crate::jvm::{ConstantPool, IrWriter};

pub fn static_method(name: &str, desc: &str, registers: u16, instructions: Vec<DalvikInstruction>) -> DexMethod {
    DexMethod {
        id: MethodId::from_descriptor("a/B", name, desc).unwrap(),
        access: ACC_PUBLIC | ACC_STATIC,
        code: Some(CodeItem::new(registers, vec![], instructions)),
    }
}

pub fn class(name: &str, methods: Vec<DexMethod>) -> DexClass {
    DexClass {
        name: name.to_string(),
        access: ACC_PUBLIC,
        super_class: Some("java/lang/Object".to_string()),
        interfaces: vec![],
        fields: vec![],
        methods,
    }
}

pub fn dex_with(classes: Vec<DexClass>) -> DexFile {
    let mut dex = DexFile::new();
    dex.classes = classes;
    dex
}

/// Runs one method through the whole pipeline and returns its `Code` attribute body.
pub fn code_attr(dex: &DexFile, method: &DexMethod, options: &OptimizationOptions) -> Result<Vec<u8>, TranslateError> {
    let mut pool = if options.split_pool {
        ConstantPool::split()
    } else {
        ConstantPool::simple()
    };
    let code = method.code.as_ref().unwrap();
    let mut ir = IrWriter::write_bytecode(dex, method, code, &mut pool, options)?;
    optimization::run_optimizations(&mut ir, options);
    optimization::allocate_registers(&mut ir, options);
    let mut attrs = assembler::finish_code_attrs(&mut pool, std::slice::from_mut(&mut ir), options)?;
    Ok(attrs.remove(0))
}

/// The bytecode inside a `Code` attribute body.
pub fn code_of(attr: &[u8]) -> &[u8] {
    let len = u32::from_be_bytes([attr[4], attr[5], attr[6], attr[7]]) as usize;
    &attr[8..8 + len]
}

/// Exception table length of a `Code` attribute body.
pub fn handler_count(attr: &[u8]) -> u16 {
    let at = 8 + code_of(attr).len();
    u16::from_be_bytes([attr[at], attr[at + 1]])
}

pub fn contains_seq(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
