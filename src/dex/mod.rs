//! In-memory model of the Dalvik side of the translation: reference pools,
//! classes, method bodies and decoded instructions.

pub mod dex_file;
pub mod instructions;
pub mod opcodes;

pub use dex_file::{
    CatchHandler, CodeItem, ConstantValue, DexClass, DexField, DexFile, DexMethod, FieldId, MethodId, TryItem,
};
pub use instructions::{ArrayData, DalvikInstruction, ImplicitCasts, Payload};
pub use opcodes::DalvikOpcode;

use crate::error::TranslateError;

/// Resolves pool indices found in instruction operands.
pub trait RefResolver
{
    fn string(&self, idx: u32) -> Result<&str, TranslateError>;
    fn type_desc(&self, idx: u32) -> Result<&str, TranslateError>;
    fn field_id(&self, idx: u32) -> Result<&FieldId, TranslateError>;
    fn method_id(&self, idx: u32) -> Result<&MethodId, TranslateError>;

    /// Class name in internal form (`java/lang/String`), or an array descriptor as is.
    fn class_type(&self, idx: u32) -> Result<&str, TranslateError>
    {
        let desc = self.type_desc(idx)?;
        Ok(strip_class_desc(desc))
    }
}

/// `Lfoo/Bar;` to `foo/Bar`; anything else is returned unchanged.
pub(crate) fn strip_class_desc(desc: &str) -> &str
{
    if desc.starts_with('L') && desc.ends_with(';') && desc.len() >= 2
    {
        &desc[1..desc.len() - 1]
    }
    else
    {
        desc
    }
}

// Little-endian reads for payload tables
pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, TranslateError>
{
    if bytes.len() < *ix + 1
    {
        fail!("Unexpected end of stream reading u1 at index {}", *ix);
    }
    let result = bytes[*ix];
    *ix += 1;
    Ok(result)
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, TranslateError>
{
    if bytes.len() < *ix + 2
    {
        fail!("Unexpected end of stream reading u2 at index {}", *ix);
    }
    let result = ((bytes[*ix + 1] as u16) << 8) | (bytes[*ix] as u16);
    *ix += 2;
    Ok(result)
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize) -> Result<u32, TranslateError>
{
    if bytes.len() < *ix + 4
    {
        fail!("Unexpected end of stream reading u4 at index {}", *ix);
    }
    let result =
        ((bytes[*ix + 3] as u32) << 24) | ((bytes[*ix + 2] as u32) << 16) | ((bytes[*ix + 1] as u32) << 8) | (bytes[*ix] as u32);
    *ix += 4;
    Ok(result)
}

pub(crate) fn read_u8(bytes: &[u8], ix: &mut usize) -> Result<u64, TranslateError>
{
    let low = read_u4(bytes, ix)? as u64;
    let high = read_u4(bytes, ix)? as u64;
    Ok((high << 32) | low)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn reads_little_endian()
    {
        let bytes = [0x78, 0x56, 0x34, 0x12, 0xef, 0xcd, 0xab, 0x89, 0x01];
        let mut ix = 0;
        assert_eq!(read_u8(&bytes, &mut ix).unwrap(), 0x89abcdef12345678);
        assert_eq!(read_u1(&bytes, &mut ix).unwrap(), 1);
        assert!(read_u2(&bytes, &mut ix).is_err());
    }

    #[test]
    fn strips_class_descriptors()
    {
        assert_eq!(strip_class_desc("Ljava/lang/Object;"), "java/lang/Object");
        assert_eq!(strip_class_desc("[Ljava/lang/Object;"), "[Ljava/lang/Object;");
        assert_eq!(strip_class_desc("I"), "I");
    }
}
