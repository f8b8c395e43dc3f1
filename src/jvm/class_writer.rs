//! Writes a whole class file for one Dalvik class.

use log::info;

use crate::dex::dex_file::{ACC_INTERFACE, ACC_SUPER, CLASS_FLAGS, FIELD_FLAGS, METHOD_FLAGS};
use crate::dex::{ConstantValue, DexClass, DexField, DexMethod, RefResolver};
use crate::error::TranslateError;
use crate::jvm::assembler::{self, CODE};
use crate::jvm::constant_pool::ConstantPool;
use crate::jvm::ir_writer::IrWriter;
use crate::jvm::optimization::{self, OptimizationOptions};
use crate::jvm::{write_u2, write_u4, write_x};

const MAGIC: u32 = 0xCAFE_BABE;
const MAJOR_VERSION: u16 = 49;
const CONSTANT_VALUE: &str = "ConstantValue";

pub struct ClassWriter<'a>
{
    dex: &'a dyn RefResolver,
    options: OptimizationOptions,
}

impl<'a> ClassWriter<'a>
{
    pub fn new(dex: &'a dyn RefResolver, options: OptimizationOptions) -> Self
    {
        ClassWriter { dex, options }
    }

    /// Translates `cls`. A class that hits a class file limit is retried
    /// once with every optimization enabled.
    pub fn to_class_file(&self, cls: &DexClass) -> Result<Vec<u8>, TranslateError>
    {
        let result = match self.write_with_options(cls, &self.options)
        {
            Err(e) if e.is_limit_exceeded() && !self.options.is_all() =>
            {
                info!("[class_writer] Retrying {} with all optimization enabled", cls.name);
                self.write_with_options(cls, &OptimizationOptions::ALL)
            }
            result => result,
        };
        result.map_err(|e| err!(e, "class {}", cls.name))
    }

    fn write_with_options(&self, cls: &DexClass, options: &OptimizationOptions) -> Result<Vec<u8>, TranslateError>
    {
        let mut pool = if options.split_pool { ConstantPool::split() } else { ConstantPool::simple() };
        let body = self.class_file_after_pool(cls, &mut pool, options)?;

        let mut out = Vec::with_capacity(body.len() + 10 + pool.count() * 4);
        write_u4(&mut out, MAGIC);
        write_u2(&mut out, 0);
        write_u2(&mut out, MAJOR_VERSION);
        pool.write(&mut out);
        write_x(&mut out, &body);
        Ok(out)
    }

    fn class_file_after_pool(
        &self,
        cls: &DexClass,
        pool: &mut ConstantPool,
        options: &OptimizationOptions,
    ) -> Result<Vec<u8>, TranslateError>
    {
        let mut access = cls.access & CLASS_FLAGS;
        if access & ACC_INTERFACE == 0
        {
            access |= ACC_SUPER;
        }

        let mut out = Vec::new();
        write_u2(&mut out, access as u16);
        write_u2(&mut out, pool.class_ref(&cls.name)?);
        let super_ref = match &cls.super_class
        {
            Some(name) => pool.class_ref(name)?,
            None => 0,
        };
        write_u2(&mut out, super_ref);

        write_u2(&mut out, cls.interfaces.len() as u16);
        for name in &cls.interfaces
        {
            write_u2(&mut out, pool.class_ref(name)?);
        }

        write_u2(&mut out, cls.fields.len() as u16);
        for field in &cls.fields
        {
            write_field(pool, &mut out, field).map_err(|e| err!(e, "field {}", field.id.name))?;
        }

        self.write_methods(pool, &mut out, &cls.methods, options)?;

        // no attributes
        write_u2(&mut out, 0);
        Ok(out)
    }

    fn write_methods(
        &self,
        pool: &mut ConstantPool,
        out: &mut Vec<u8>,
        methods: &[DexMethod],
        options: &OptimizationOptions,
    ) -> Result<(), TranslateError>
    {
        let mut irs = Vec::new();
        for method in methods
        {
            if let Some(code) = &method.code
            {
                let mut ir = IrWriter::write_bytecode(self.dex, method, code, pool, options)
                    .map_err(|e| err!(e, "method {}", method.id.name))?;
                optimization::run_optimizations(&mut ir, options);
                optimization::allocate_registers(&mut ir, options);
                irs.push(ir);
            }
        }

        let mut attrs = assembler::finish_code_attrs(pool, &mut irs, options)?.into_iter();

        write_u2(out, methods.len() as u16);
        for method in methods
        {
            write_u2(out, (method.access & METHOD_FLAGS) as u16);
            write_u2(out, pool.utf8_ref(&method.id.name)?);
            write_u2(out, pool.utf8_ref(&method.id.descriptor())?);

            let attr = if method.code.is_some() { attrs.next() } else { None };
            match attr
            {
                Some(attr) =>
                {
                    write_u2(out, 1);
                    write_u2(out, pool.utf8_ref(CODE)?);
                    write_u4(out, attr.len() as u32);
                    write_x(out, &attr);
                }
                None =>
                {
                    write_u2(out, 0);
                }
            }
        }
        Ok(())
    }
}

fn write_field(pool: &mut ConstantPool, out: &mut Vec<u8>, field: &DexField) -> Result<(), TranslateError>
{
    let descriptor = field.id.descriptor.as_str();
    write_u2(out, (field.access & FIELD_FLAGS) as u16);
    write_u2(out, pool.utf8_ref(&field.id.name)?);
    write_u2(out, pool.utf8_ref(descriptor)?);

    let value = match &field.constant
    {
        Some(value) => value,
        None =>
        {
            write_u2(out, 0);
            return Ok(());
        }
    };

    write_u2(out, 1);
    write_u2(out, pool.utf8_ref(CONSTANT_VALUE)?);
    write_u4(out, 2);

    // the field type decides the entry kind, not the stored value
    let index = match (descriptor, value)
    {
        ("Z" | "B" | "S" | "C" | "I", ConstantValue::Int(v)) => pool.int_ref(*v)?,
        ("F", ConstantValue::Int(v)) => pool.float_ref(*v as u32)?,
        ("J", ConstantValue::Long(v)) => pool.long_ref(*v)?,
        ("D", ConstantValue::Long(v)) => pool.double_ref(*v as u64)?,
        ("Ljava/lang/String;", ConstantValue::String(s)) => pool.string_ref(s)?,
        ("Ljava/lang/Class;", ConstantValue::Type(name)) => pool.class_ref(name)?,
        _ => fail!("Unknown constant {:?} for descriptor {}", value, descriptor),
    };
    write_u2(out, index);
    Ok(())
}
