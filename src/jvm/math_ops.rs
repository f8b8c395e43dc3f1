//! Dalvik arithmetic opcodes mapped onto their JVM counterparts.

use crate::jvm::ops::*;
use crate::typeinference::Scalars;

/// A unary operation: JVM opcode, operand type and result type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnaryOp {
    pub op: u8,
    pub src: Scalars,
    pub dest: Scalars,
}

/// A binary operation: JVM opcode and the types of both operands.
/// The result has the type of the first operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryOp {
    pub op: u8,
    pub st: Scalars,
    pub st2: Scalars,
}

pub fn unary(opcode: u8) -> Option<UnaryOp> {
    let (i, f, l, d) = (Scalars::INT, Scalars::FLOAT, Scalars::LONG, Scalars::DOUBLE);
    let (op, src, dest) = match opcode {
        0x7b => (INEG, i, i),
        0x7c => (IXOR, i, i),
        0x7d => (LNEG, l, l),
        0x7e => (LXOR, l, l),
        0x7f => (FNEG, f, f),
        0x80 => (DNEG, d, d),
        0x81 => (I2L, i, l),
        0x82 => (I2F, i, f),
        0x83 => (I2D, i, d),
        0x84 => (L2I, l, i),
        0x85 => (L2F, l, f),
        0x86 => (L2D, l, d),
        0x87 => (F2I, f, i),
        0x88 => (F2L, f, l),
        0x89 => (F2D, f, d),
        0x8a => (D2I, d, i),
        0x8b => (D2L, d, l),
        0x8c => (D2F, d, f),
        0x8d => (I2B, i, i),
        0x8e => (I2C, i, i),
        0x8f => (I2S, i, i),
        _ => return None,
    };
    Some(UnaryOp { op, src, dest })
}

/// Covers both the three-register forms (0x90..0xaf) and the
/// two-address forms (0xb0..0xcf), which repeat the same order.
pub fn binary(opcode: u8) -> Option<BinaryOp> {
    if !(0x90..=0xcf).contains(&opcode) {
        return None;
    }
    let (i, f, l, d) = (Scalars::INT, Scalars::FLOAT, Scalars::LONG, Scalars::DOUBLE);
    let (op, st, st2) = match (opcode - 0x90) % 0x20 {
        0 => (IADD, i, i),
        1 => (ISUB, i, i),
        2 => (IMUL, i, i),
        3 => (IDIV, i, i),
        4 => (IREM, i, i),
        5 => (IAND, i, i),
        6 => (IOR, i, i),
        7 => (IXOR, i, i),
        8 => (ISHL, i, i),
        9 => (ISHR, i, i),
        10 => (IUSHR, i, i),
        11 => (LADD, l, l),
        12 => (LSUB, l, l),
        13 => (LMUL, l, l),
        14 => (LDIV, l, l),
        15 => (LREM, l, l),
        16 => (LAND, l, l),
        17 => (LOR, l, l),
        18 => (LXOR, l, l),
        19 => (LSHL, l, i),
        20 => (LSHR, l, i),
        21 => (LUSHR, l, i),
        22 => (FADD, f, f),
        23 => (FSUB, f, f),
        24 => (FMUL, f, f),
        25 => (FDIV, f, f),
        26 => (FREM, f, f),
        27 => (DADD, d, d),
        28 => (DSUB, d, d),
        29 => (DMUL, d, d),
        30 => (DDIV, d, d),
        _ => (DREM, d, d),
    };
    Some(BinaryOp { op, st, st2 })
}

/// Integer operations with a literal operand (lit16 then lit8 forms).
/// `rsub` maps to `ISUB` with the operands swapped by the caller.
pub fn binary_lit(opcode: u8) -> Option<u8> {
    let ops = [IADD, ISUB, IMUL, IDIV, IREM, IAND, IOR, IXOR];
    match opcode {
        0xd0..=0xd7 => Some(ops[(opcode - 0xd0) as usize]),
        0xd8..=0xdf => Some(ops[(opcode - 0xd8) as usize]),
        0xe0 => Some(ISHL),
        0xe1 => Some(ISHR),
        0xe2 => Some(IUSHR),
        _ => None,
    }
}

/// Division and remainder are the only arithmetic that can throw.
pub fn can_throw(jvm_op: u8) -> bool {
    matches!(jvm_op, IDIV | IREM | LDIV | LREM)
}
