//! The JVM side of the translation: instruction selection, optimization,
//! constant pool management and class file assembly.

pub mod array_ops;
pub mod assembler;
pub mod class_writer;
pub mod constant_pool;
pub mod constants;
pub mod instructions;
pub mod ir_block;
pub mod ir_writer;
pub mod math_ops;
pub mod ops;
pub mod optimization;
mod select;

pub use class_writer::ClassWriter;
pub use constant_pool::{ConstantPool, PoolData};
pub use instructions::{InsnId, JvmInstruction, RegKey};
pub use ir_writer::IrWriter;
pub use optimization::OptimizationOptions;

use crate::typeinference::Scalars;

// Class files are big-endian throughout
pub(crate) fn write_u1(buffer: &mut Vec<u8>, val: u8) -> usize
{
    buffer.push(val);
    1
}

pub(crate) fn write_u2(buffer: &mut Vec<u8>, val: u16) -> usize
{
    buffer.extend_from_slice(&val.to_be_bytes());
    2
}

pub(crate) fn write_u4(buffer: &mut Vec<u8>, val: u32) -> usize
{
    buffer.extend_from_slice(&val.to_be_bytes());
    4
}

pub(crate) fn write_u8(buffer: &mut Vec<u8>, val: u64) -> usize
{
    buffer.extend_from_slice(&val.to_be_bytes());
    8
}

pub(crate) fn write_x(buffer: &mut Vec<u8>, val: &[u8]) -> usize
{
    buffer.extend_from_slice(val);
    val.len()
}

/// Opcode followed by a 16 bit operand, the shape of most pool referencing instructions.
pub(crate) fn op_u2(op: u8, val: u16) -> Vec<u8>
{
    let mut v = Vec::with_capacity(3);
    write_u1(&mut v, op);
    write_u2(&mut v, val);
    v
}

/// Offset of a typed load/store/return opcode from its int variant, in the
/// `I L F D A` order the JVM uses.
pub(crate) fn ilfda_ord(st: Scalars) -> u8
{
    if st == Scalars::LONG
    {
        1
    }
    else if st == Scalars::FLOAT
    {
        2
    }
    else if st == Scalars::DOUBLE
    {
        3
    }
    else if st == Scalars::OBJ
    {
        4
    }
    else
    {
        0
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn writes_big_endian()
    {
        let mut v = Vec::new();
        assert_eq!(write_u2(&mut v, 0x1234), 2);
        assert_eq!(write_u4(&mut v, 0xCAFEBABE), 4);
        assert_eq!(write_u8(&mut v, 1), 8);
        assert_eq!(v[..6], [0x12, 0x34, 0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(v[13], 1);
        assert_eq!(op_u2(ops::LDC_W, 300), vec![ops::LDC_W, 1, 44]);
    }

    #[test]
    fn typed_opcode_offsets()
    {
        assert_eq!(ops::IRETURN + ilfda_ord(Scalars::OBJ), 0xb0);
        assert_eq!(ops::ILOAD + ilfda_ord(Scalars::DOUBLE), ops::DLOAD);
    }
}
