//! Class file constant pool with two allocation layouts.
//!
//! The simple layout appends entries in request order. The split layout
//! reserves the whole 65535 entry index space up front and grows from both
//! ends: entries that may be loaded with a one byte `ldc` index are taken from
//! the bottom, everything else from the top, leaving the middle free for
//! constants allocated late. Unused slots are written as empty Utf8 entries.

use std::collections::HashMap;

use crate::dex::{FieldId, MethodId};
use crate::error::TranslateError;
use crate::jvm::{write_u1, write_u2, write_u4, write_u8, write_x};

pub const CONSTANT_UTF8: u8 = 1;
pub const CONSTANT_INTEGER: u8 = 3;
pub const CONSTANT_FLOAT: u8 = 4;
pub const CONSTANT_LONG: u8 = 5;
pub const CONSTANT_DOUBLE: u8 = 6;
pub const CONSTANT_CLASS: u8 = 7;
pub const CONSTANT_STRING: u8 = 8;
pub const CONSTANT_FIELDREF: u8 = 9;
pub const CONSTANT_METHODREF: u8 = 10;
pub const CONSTANT_INTERFACE_METHODREF: u8 = 11;
pub const CONSTANT_NAME_AND_TYPE: u8 = 12;

const POOL_SIZE: usize = 65535;

/// One pool entry. Floating point values are kept as raw bits so that equal
/// bit patterns (including NaN) share a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolData
{
    /// Modified UTF-8 bytes.
    Utf8(Vec<u8>),
    Int(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    NameAndType(u16, u16),
}

impl PoolData
{
    pub fn tag(&self) -> u8
    {
        match self
        {
            PoolData::Utf8(_) => CONSTANT_UTF8,
            PoolData::Int(_) => CONSTANT_INTEGER,
            PoolData::Float(_) => CONSTANT_FLOAT,
            PoolData::Long(_) => CONSTANT_LONG,
            PoolData::Double(_) => CONSTANT_DOUBLE,
            PoolData::Class(_) => CONSTANT_CLASS,
            PoolData::String(_) => CONSTANT_STRING,
            PoolData::Fieldref(..) => CONSTANT_FIELDREF,
            PoolData::Methodref(..) => CONSTANT_METHODREF,
            PoolData::InterfaceMethodref(..) => CONSTANT_INTERFACE_METHODREF,
            PoolData::NameAndType(..) => CONSTANT_NAME_AND_TYPE,
        }
    }

    /// Long and double entries occupy two indices.
    pub fn width(&self) -> usize
    {
        match self
        {
            PoolData::Long(_) | PoolData::Double(_) => 2,
            _ => 1,
        }
    }

    /// Entries an `ldc` may reference, worth keeping below index 256.
    fn prefers_low(&self) -> bool
    {
        matches!(self, PoolData::Int(_) | PoolData::Float(_) | PoolData::String(_))
    }

    fn write(&self, out: &mut Vec<u8>)
    {
        write_u1(out, self.tag());
        match self
        {
            PoolData::Utf8(bytes) =>
            {
                write_u2(out, bytes.len() as u16);
                write_x(out, bytes);
            }
            PoolData::Int(v) =>
            {
                write_u4(out, *v as u32);
            }
            PoolData::Float(bits) =>
            {
                write_u4(out, *bits);
            }
            PoolData::Long(v) =>
            {
                write_u8(out, *v as u64);
            }
            PoolData::Double(bits) =>
            {
                write_u8(out, *bits);
            }
            PoolData::Class(i) | PoolData::String(i) =>
            {
                write_u2(out, *i);
            }
            PoolData::Fieldref(a, b)
            | PoolData::Methodref(a, b)
            | PoolData::InterfaceMethodref(a, b)
            | PoolData::NameAndType(a, b) =>
            {
                write_u2(out, *a);
                write_u2(out, *b);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolLayout
{
    Simple,
    Split { bottom: usize, top: usize },
}

#[derive(Debug, Clone)]
pub struct ConstantPool
{
    lookup: HashMap<PoolData, u16>,
    values: Vec<Option<PoolData>>,
    layout: PoolLayout,
}

impl ConstantPool
{
    pub fn simple() -> Self
    {
        ConstantPool { lookup: HashMap::new(), values: vec![None], layout: PoolLayout::Simple }
    }

    pub fn split() -> Self
    {
        ConstantPool {
            lookup: HashMap::new(),
            values: vec![None; POOL_SIZE],
            layout: PoolLayout::Split { bottom: 1, top: POOL_SIZE },
        }
    }

    pub fn is_split(&self) -> bool
    {
        matches!(self.layout, PoolLayout::Split { .. })
    }

    /// Free indices left.
    pub fn space(&self) -> usize
    {
        match self.layout
        {
            PoolLayout::Simple => POOL_SIZE - self.values.len(),
            PoolLayout::Split { bottom, top } => top - bottom,
        }
    }

    /// Free indices left below 256.
    pub fn low_space(&self) -> usize
    {
        let used = match self.layout
        {
            PoolLayout::Simple => self.values.len(),
            PoolLayout::Split { bottom, .. } => bottom,
        };
        256usize.saturating_sub(used)
    }

    /// Number of entries (including index 0) in the written table.
    pub fn count(&self) -> usize
    {
        self.values.len()
    }

    pub fn contains(&self, data: &PoolData) -> bool
    {
        self.lookup.contains_key(data)
    }

    pub fn get_entry(&self, index: u16) -> Option<&PoolData>
    {
        self.values.get(index as usize).and_then(|v| v.as_ref())
    }

    fn obtain_index(&mut self, low: bool, width: usize) -> Result<u16, TranslateError>
    {
        if self.space() < width
        {
            limit!("Constant pool is full");
        }
        let index = match &mut self.layout
        {
            PoolLayout::Simple =>
            {
                let index = self.values.len();
                self.values.resize(index + width, None);
                index
            }
            PoolLayout::Split { bottom, top } =>
            {
                if low
                {
                    let index = *bottom;
                    *bottom += width;
                    index
                }
                else
                {
                    *top -= width;
                    *top
                }
            }
        };
        Ok(index as u16)
    }

    fn set(&mut self, data: PoolData, index: u16)
    {
        self.lookup.insert(data.clone(), index);
        self.values[index as usize] = Some(data);
    }

    fn get(&mut self, data: PoolData) -> Result<u16, TranslateError>
    {
        if let Some(index) = self.lookup.get(&data)
        {
            return Ok(*index);
        }
        let index = self.obtain_index(data.prefers_low(), data.width())?;
        self.set(data, index);
        Ok(index)
    }

    /// Allocates without deduplication; callers check `contains` first.
    pub fn insert_directly(&mut self, data: PoolData, low: bool) -> Result<u16, TranslateError>
    {
        let index = self.obtain_index(low, data.width())?;
        self.set(data, index);
        Ok(index)
    }

    /// Index of a numeric constant, allocating it if there is room.
    /// `None` means the pool is too full to take it.
    pub fn data_ref(&mut self, data: PoolData) -> Result<Option<u16>, TranslateError>
    {
        if let Some(index) = self.lookup.get(&data)
        {
            return Ok(Some(*index));
        }
        if data.width() > self.space()
        {
            return Ok(None);
        }
        let index = self.obtain_index(true, data.width())?;
        self.set(data, index);
        Ok(Some(index))
    }

    pub fn utf8_ref(&mut self, s: &str) -> Result<u16, TranslateError>
    {
        let bytes = cesu8::to_java_cesu8(s).into_owned();
        if bytes.len() > 65535
        {
            limit!("Utf8 constant of {} bytes is too long", bytes.len());
        }
        self.get(PoolData::Utf8(bytes))
    }

    /// `name` is an internal class name or an array descriptor.
    pub fn class_ref(&mut self, name: &str) -> Result<u16, TranslateError>
    {
        let utf = self.utf8_ref(name)?;
        self.get(PoolData::Class(utf))
    }

    pub fn string_ref(&mut self, s: &str) -> Result<u16, TranslateError>
    {
        let utf = self.utf8_ref(s)?;
        self.get(PoolData::String(utf))
    }

    pub fn name_and_type_ref(&mut self, name: &str, desc: &str) -> Result<u16, TranslateError>
    {
        let n = self.utf8_ref(name)?;
        let d = self.utf8_ref(desc)?;
        self.get(PoolData::NameAndType(n, d))
    }

    pub fn field_ref(&mut self, field: &FieldId) -> Result<u16, TranslateError>
    {
        let class = self.class_ref(&field.class_name)?;
        let nat = self.name_and_type_ref(&field.name, &field.descriptor)?;
        self.get(PoolData::Fieldref(class, nat))
    }

    pub fn method_ref(&mut self, method: &MethodId) -> Result<u16, TranslateError>
    {
        let class = self.class_ref(&method.class_name)?;
        let nat = self.name_and_type_ref(&method.name, &method.descriptor())?;
        self.get(PoolData::Methodref(class, nat))
    }

    pub fn interface_method_ref(&mut self, method: &MethodId) -> Result<u16, TranslateError>
    {
        let class = self.class_ref(&method.class_name)?;
        let nat = self.name_and_type_ref(&method.name, &method.descriptor())?;
        self.get(PoolData::InterfaceMethodref(class, nat))
    }

    pub fn int_ref(&mut self, v: i32) -> Result<u16, TranslateError>
    {
        self.get(PoolData::Int(v))
    }

    pub fn float_ref(&mut self, bits: u32) -> Result<u16, TranslateError>
    {
        self.get(PoolData::Float(bits))
    }

    pub fn long_ref(&mut self, v: i64) -> Result<u16, TranslateError>
    {
        self.get(PoolData::Long(v))
    }

    pub fn double_ref(&mut self, bits: u64) -> Result<u16, TranslateError>
    {
        self.get(PoolData::Double(bits))
    }

    pub fn write(&self, out: &mut Vec<u8>)
    {
        write_u2(out, self.values.len() as u16);
        match self.layout
        {
            PoolLayout::Simple =>
            {
                for item in self.values.iter().flatten()
                {
                    item.write(out);
                }
            }
            PoolLayout::Split { bottom, top } =>
            {
                for item in self.values[..bottom].iter().flatten()
                {
                    item.write(out);
                }
                for _ in bottom..top
                {
                    write_x(out, &[CONSTANT_UTF8, 0, 0]);
                }
                for item in self.values[top..].iter().flatten()
                {
                    item.write(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn same_constant_same_index()
    {
        let mut pool = ConstantPool::simple();
        let a = pool.utf8_ref("Code").unwrap();
        let b = pool.utf8_ref("Code").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 1);
        let c = pool.class_ref("java/lang/Object").unwrap();
        assert_eq!(pool.class_ref("java/lang/Object").unwrap(), c);
        assert_eq!(pool.count(), 4);
    }

    #[test]
    fn wide_entries_take_two_slots()
    {
        let mut pool = ConstantPool::simple();
        assert_eq!(pool.long_ref(7).unwrap(), 1);
        assert_eq!(pool.int_ref(7).unwrap(), 3);
        let mut out = Vec::new();
        pool.write(&mut out);
        assert_eq!(out[..2], [0, 4]);
        assert_eq!(out[2], CONSTANT_LONG);
        assert_eq!(out[11], CONSTANT_INTEGER);
        assert_eq!(out.len(), 2 + 9 + 5);
    }

    #[test]
    fn simple_pool_runs_out()
    {
        let mut pool = ConstantPool::simple();
        let mut allocated = 0;
        let err = loop
        {
            match pool.int_ref(allocated)
            {
                Ok(_) => allocated += 1,
                Err(e) => break e,
            }
        };
        assert!(err.is_limit_exceeded());
        assert_eq!(allocated, 65534);
        assert_eq!(pool.count(), 65535);
        assert_eq!(pool.data_ref(PoolData::Int(-5)).unwrap(), None);
        assert_eq!(pool.data_ref(PoolData::Int(3)).unwrap(), Some(4));
    }

    #[test]
    fn split_pool_grows_from_both_ends()
    {
        let mut pool = ConstantPool::split();
        let utf = pool.utf8_ref("x").unwrap();
        let s = pool.string_ref("x").unwrap();
        assert_eq!(utf, 65534);
        assert_eq!(s, 1);
        assert_eq!(pool.double_ref(0).unwrap(), 65532);
        assert_eq!(pool.space(), 65535 - 2 - 3);
        assert_eq!(pool.low_space(), 254);
        assert_eq!(pool.count(), 65535);

        let mut out = Vec::new();
        pool.write(&mut out);
        assert_eq!(out[..2], [0xff, 0xff]);
        // String entry, then the placeholders
        assert_eq!(out[2..5], [CONSTANT_STRING, 0xff, 0xfe]);
        assert_eq!(out[5..8], [CONSTANT_UTF8, 0, 0]);
        assert_eq!(out.len(), 2 + 3 + 3 * pool.space() + 9 + 4);
    }

    #[test]
    fn utf8_is_java_modified()
    {
        let mut pool = ConstantPool::simple();
        let i = pool.utf8_ref("a\0b").unwrap();
        assert_eq!(pool.get_entry(i), Some(&PoolData::Utf8(vec![b'a', 0xc0, 0x80, b'b'])));
    }
}
