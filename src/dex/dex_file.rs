use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dex::instructions::{DalvikInstruction, ImplicitCasts};
use crate::dex::opcodes::DalvikOpcode;
use crate::dex::RefResolver;
use crate::error::TranslateError;
use crate::types::MethodDescriptor;

pub const ACC_PUBLIC: u32 = 0x1;
pub const ACC_PRIVATE: u32 = 0x2;
pub const ACC_PROTECTED: u32 = 0x4;
pub const ACC_STATIC: u32 = 0x8;
pub const ACC_FINAL: u32 = 0x10;
pub const ACC_SYNCHRONIZED: u32 = 0x20;
pub const ACC_SUPER: u32 = 0x20;
pub const ACC_VOLATILE: u32 = 0x40;
pub const ACC_BRIDGE: u32 = 0x40;
pub const ACC_TRANSIENT: u32 = 0x80;
pub const ACC_VARARGS: u32 = 0x80;
pub const ACC_NATIVE: u32 = 0x100;
pub const ACC_INTERFACE: u32 = 0x200;
pub const ACC_ABSTRACT: u32 = 0x400;
pub const ACC_STRICT: u32 = 0x800;
pub const ACC_SYNTHETIC: u32 = 0x1000;
pub const ACC_ANNOTATION: u32 = 0x2000;
pub const ACC_ENUM: u32 = 0x4000;
pub const ACC_CONSTRUCTOR: u32 = 0x10000;
pub const ACC_DECLARED_SYNCHRONIZED: u32 = 0x20000;

/// Flags that carry over to a class file, per kind of member.
pub const CLASS_FLAGS: u32 =
    ACC_PUBLIC | ACC_FINAL | ACC_SUPER | ACC_INTERFACE | ACC_ABSTRACT | ACC_SYNTHETIC | ACC_ANNOTATION | ACC_ENUM;
pub const FIELD_FLAGS: u32 = ACC_PUBLIC
    | ACC_PRIVATE
    | ACC_PROTECTED
    | ACC_STATIC
    | ACC_FINAL
    | ACC_VOLATILE
    | ACC_TRANSIENT
    | ACC_SYNTHETIC
    | ACC_ENUM;
pub const METHOD_FLAGS: u32 = ACC_PUBLIC
    | ACC_PRIVATE
    | ACC_PROTECTED
    | ACC_STATIC
    | ACC_FINAL
    | ACC_SYNCHRONIZED
    | ACC_BRIDGE
    | ACC_VARARGS
    | ACC_NATIVE
    | ACC_ABSTRACT
    | ACC_STRICT
    | ACC_SYNTHETIC;

pub(crate) const THROWABLE: &str = "java/lang/Throwable";
pub(crate) const THROWABLE_DESC: &str = "Ljava/lang/Throwable;";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldId
{
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
}

impl FieldId
{
    pub fn new(class_name: &str, name: &str, descriptor: &str) -> Self
    {
        FieldId { class_name: class_name.to_string(), name: name.to_string(), descriptor: descriptor.to_string() }
    }
}

/// A method reference. `class_name` is in internal form, or an array
/// descriptor for methods invoked on arrays (e.g. `[I.clone()`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId
{
    pub class_name: String,
    pub name: String,
    pub param_types: Vec<String>,
    pub return_type: String,
}

impl MethodId
{
    /// # Examples
    ///
    /// ```
    ///  use jarify::dex::MethodId;
    ///
    ///  let m = MethodId::from_descriptor("a/B", "run", "(IJ)V").unwrap();
    ///  assert_eq!(m.param_types, vec!["I", "J"]);
    ///  assert_eq!(m.descriptor(), "(IJ)V");
    /// ```
    pub fn from_descriptor(class_name: &str, name: &str, descriptor: &str) -> Result<MethodId, TranslateError>
    {
        let parsed = MethodDescriptor::from_desc(descriptor)?;
        Ok(MethodId {
            class_name: class_name.to_string(),
            name: name.to_string(),
            param_types: parsed.args.iter().map(|a| a.to_desc()).collect(),
            return_type: parsed.result.to_desc(),
        })
    }

    pub fn descriptor(&self) -> String
    {
        let mut s = String::from("(");
        for p in &self.param_types
        {
            s.push_str(p);
        }
        s.push(')');
        s.push_str(&self.return_type);
        s
    }

    /// Parameter descriptors laid out one per register: `this` first for
    /// instance methods, and a `None` slot after every long or double.
    pub fn spaced_param_types(&self, is_static: bool) -> Vec<Option<String>>
    {
        let mut results = Vec::with_capacity(self.param_types.len() + 1);
        if !is_static
        {
            if self.class_name.starts_with('[')
            {
                results.push(Some(self.class_name.clone()));
            }
            else
            {
                results.push(Some(format!("L{};", self.class_name)));
            }
        }
        for p in &self.param_types
        {
            results.push(Some(p.clone()));
            if p == "J" || p == "D"
            {
                results.push(None);
            }
        }
        results
    }
}

/// Static field initializer as stored in the dex file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstantValue
{
    /// Covers boolean, byte, short, char, int and float bit patterns.
    Int(i32),
    /// Covers long and double bit patterns.
    Long(i64),
    String(String),
    /// Class name in internal form.
    Type(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexField
{
    pub id: FieldId,
    pub access: u32,
    pub constant: Option<ConstantValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexMethod
{
    pub id: MethodId,
    pub access: u32,
    pub code: Option<CodeItem>,
}

impl DexMethod
{
    pub fn is_static(&self) -> bool
    {
        self.access & ACC_STATIC != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchHandler
{
    /// Internal class name, `None` for a catch-all.
    pub class_name: Option<String>,
    pub target: u32,
}

impl CatchHandler
{
    pub fn class_name(&self) -> &str
    {
        self.class_name.as_deref().unwrap_or(THROWABLE)
    }
}

/// A guarded region `[start, end)` in code units with its handlers in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryItem
{
    pub start: u32,
    pub end: u32,
    pub handlers: Vec<CatchHandler>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeItem
{
    pub registers: u16,
    pub tries: Vec<TryItem>,
    pub instructions: Vec<DalvikInstruction>,
}

impl CodeItem
{
    pub fn new(registers: u16, tries: Vec<TryItem>, instructions: Vec<DalvikInstruction>) -> Self
    {
        CodeItem { registers, tries, instructions }
    }

    pub fn catch_addresses(&self) -> BTreeSet<u32>
    {
        self.tries.iter().flat_map(|t| t.handlers.iter().map(|h| h.target)).collect()
    }

    /// Fills in the hints the translator needs but the bytecode leaves implicit:
    /// the type produced for each `move-result*` and the registers narrowed by
    /// an `instance-of` test feeding an `if-eqz`/`if-nez`.
    pub fn link_hints(&mut self, dex: &dyn RefResolver) -> Result<(), TranslateError>
    {
        let catch_addresses = self.catch_addresses();
        let ops = &mut self.instructions;

        for i in 0..ops.len().saturating_sub(1)
        {
            if ops[i + 1].kind != DalvikOpcode::MoveResult
            {
                continue;
            }
            let prev = &ops[i];
            let hint = if prev.kind.is_invoke()
            {
                let ret = &dex.method_id(prev.index(0)?)?.return_type;
                if ret != "V" { Some(ret.clone()) } else { None }
            }
            else if prev.kind == DalvikOpcode::FilledNewArray
            {
                Some(dex.type_desc(prev.index(0)?)?.to_string())
            }
            else if catch_addresses.contains(&ops[i + 1].position)
            {
                Some(THROWABLE_DESC.to_string())
            }
            else
            {
                None
            };
            if hint.is_some()
            {
                ops[i + 1].prev_result = hint;
            }
        }

        for i in 1..ops.len()
        {
            if !(ops[i].opcode == 0x38 || ops[i].opcode == 0x39) || ops[i - 1].kind != DalvikOpcode::InstanceOf
            {
                continue;
            }
            let prev = &ops[i - 1];
            let type_idx = prev.index(2)?;
            let tested = prev.reg(1)?;
            let mut registers = BTreeSet::new();
            registers.insert(tested as u16);
            if i > 1 && ops[i - 2].kind == DalvikOpcode::Move && ops[i - 2].reg(0)? == tested
            {
                registers.insert(ops[i - 2].reg(1)? as u16);
            }
            registers.remove(&(prev.reg(0)? as u16));
            if !registers.is_empty()
            {
                ops[i].implicit_casts = Some(ImplicitCasts { type_idx, registers });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexClass
{
    /// Internal form, e.g. `java/lang/String`.
    pub name: String,
    pub access: u32,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<DexField>,
    pub methods: Vec<DexMethod>,
}

/// Reference pools of one dex file plus its classes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DexFile
{
    pub strings: Vec<String>,
    /// Type descriptors.
    pub types: Vec<String>,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    pub classes: Vec<DexClass>,
}

impl DexFile
{
    pub fn new() -> Self
    {
        DexFile::default()
    }

    pub fn add_string(&mut self, s: &str) -> u32
    {
        Self::intern(&mut self.strings, s.to_string())
    }

    pub fn add_type(&mut self, desc: &str) -> u32
    {
        Self::intern(&mut self.types, desc.to_string())
    }

    pub fn add_field(&mut self, field: FieldId) -> u32
    {
        Self::intern(&mut self.fields, field)
    }

    pub fn add_method(&mut self, method: MethodId) -> u32
    {
        Self::intern(&mut self.methods, method)
    }

    /// Runs [`CodeItem::link_hints`] over every method body.
    pub fn link_hints(&mut self) -> Result<(), TranslateError>
    {
        let mut classes = std::mem::take(&mut self.classes);
        let result = classes.iter_mut().try_for_each(|class| {
            let name = class.name.clone();
            class
                .methods
                .iter_mut()
                .filter_map(|m| m.code.as_mut().map(|code| (m.id.name.clone(), code)))
                .try_for_each(|(method, code)| {
                    code.link_hints(&*self).map_err(|e| err!(e, "method {} of {}", method, name))
                })
        });
        self.classes = classes;
        result
    }

    fn intern<T: PartialEq>(pool: &mut Vec<T>, value: T) -> u32
    {
        if let Some(i) = pool.iter().position(|v| *v == value)
        {
            return i as u32;
        }
        pool.push(value);
        (pool.len() - 1) as u32
    }
}

impl RefResolver for DexFile
{
    fn string(&self, idx: u32) -> Result<&str, TranslateError>
    {
        match self.strings.get(idx as usize)
        {
            Some(s) => Ok(s),
            None => fail!("String index {} out of range", idx),
        }
    }

    fn type_desc(&self, idx: u32) -> Result<&str, TranslateError>
    {
        match self.types.get(idx as usize)
        {
            Some(s) => Ok(s),
            None => fail!("Type index {} out of range", idx),
        }
    }

    fn field_id(&self, idx: u32) -> Result<&FieldId, TranslateError>
    {
        match self.fields.get(idx as usize)
        {
            Some(f) => Ok(f),
            None => fail!("Field index {} out of range", idx),
        }
    }

    fn method_id(&self, idx: u32) -> Result<&MethodId, TranslateError>
    {
        match self.methods.get(idx as usize)
        {
            Some(m) => Ok(m),
            None => fail!("Method index {} out of range", idx),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn spaced_params_pad_wide_types()
    {
        let m = MethodId::from_descriptor("a/B", "f", "(JILjava/lang/String;D)V").unwrap();
        assert_eq!(
            m.spaced_param_types(false),
            vec![
                Some("La/B;".to_string()),
                Some("J".to_string()),
                None,
                Some("I".to_string()),
                Some("Ljava/lang/String;".to_string()),
                Some("D".to_string()),
                None,
            ]
        );
        let arr = MethodId::from_descriptor("[I", "clone", "()Ljava/lang/Object;").unwrap();
        assert_eq!(arr.spaced_param_types(false), vec![Some("[I".to_string())]);
        assert!(arr.spaced_param_types(true).is_empty());
    }

    #[test]
    fn links_result_and_cast_hints()
    {
        let mut dex = DexFile::new();
        let run = dex.add_method(MethodId::from_descriptor("a/B", "get", "()Ljava/lang/String;").unwrap());
        let str_type = dex.add_type("Ljava/lang/String;");
        let mut code = CodeItem::new(
            4,
            vec![TryItem { start: 0, end: 3, handlers: vec![CatchHandler { class_name: None, target: 12 }] }],
            vec![
                DalvikInstruction::new(0x71, 0, 3, vec![run as i32]),
                DalvikInstruction::new(0x0c, 3, 4, vec![0]),
                DalvikInstruction::new(0x07, 4, 5, vec![1, 0]),
                DalvikInstruction::new(0x20, 5, 7, vec![2, 1, str_type as i32]),
                DalvikInstruction::new(0x38, 7, 9, vec![2, 11]),
                DalvikInstruction::new(0x0e, 9, 10, vec![]),
                DalvikInstruction::new(0x00, 10, 11, vec![]),
                DalvikInstruction::new(0x0e, 11, 12, vec![]),
                DalvikInstruction::new(0x0d, 12, 13, vec![3]),
                DalvikInstruction::new(0x27, 13, 14, vec![3]),
            ],
        );
        code.link_hints(&dex).unwrap();
        assert_eq!(code.instructions[1].prev_result.as_deref(), Some("Ljava/lang/String;"));
        assert_eq!(code.instructions[8].prev_result.as_deref(), Some(THROWABLE_DESC));
        let casts = code.instructions[4].implicit_casts.as_ref().unwrap();
        assert_eq!(casts.type_idx, str_type);
        assert_eq!(casts.registers.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn resolver_reports_bad_indices()
    {
        let dex = DexFile::new();
        assert!(dex.string(0).is_err());
        assert!(dex.method_id(3).is_err());
        let mut dex = DexFile::new();
        let t = dex.add_type("Lfoo/Bar;");
        assert_eq!(dex.class_type(t).unwrap(), "foo/Bar");
        assert_eq!(dex.add_type("Lfoo/Bar;"), t);
    }
}
