use once_cell::sync::Lazy;
use rangemap::RangeInclusiveMap;
use serde::{Deserialize, Serialize};

/// Dalvik opcode families. Every raw opcode byte maps onto exactly one family;
/// opcodes without JVM meaning (unused slots, odex-only forms) fall back to `Nop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DalvikOpcode
{
    Nop,
    Move,
    MoveWide,
    MoveResult,
    Return,
    Const32,
    Const64,
    ConstString,
    ConstClass,
    MonitorEnter,
    MonitorExit,
    CheckCast,
    InstanceOf,
    ArrayLen,
    NewInstance,
    NewArray,
    FilledNewArray,
    FillArrayData,
    Throw,
    Goto,
    Switch,
    Cmp,
    If,
    IfZ,
    ArrayGet,
    ArrayPut,
    InstanceGet,
    InstancePut,
    StaticGet,
    StaticPut,
    InvokeVirtual,
    InvokeSuper,
    InvokeDirect,
    InvokeStatic,
    InvokeInterface,
    UnaryOp,
    BinaryOp,
    BinaryOpConst,
}

static FAMILIES: Lazy<RangeInclusiveMap<u8, DalvikOpcode>> = Lazy::new(|| {
    use DalvikOpcode::*;
    let mut map = RangeInclusiveMap::new();
    let ranges = [
        (0x00, 0x00, Nop),
        (0x01, 0x03, Move),
        (0x04, 0x06, MoveWide),
        (0x07, 0x09, Move),
        (0x0a, 0x0d, MoveResult),
        (0x0e, 0x11, Return),
        (0x12, 0x15, Const32),
        (0x16, 0x19, Const64),
        (0x1a, 0x1b, ConstString),
        (0x1c, 0x1c, ConstClass),
        (0x1d, 0x1d, MonitorEnter),
        (0x1e, 0x1e, MonitorExit),
        (0x1f, 0x1f, CheckCast),
        (0x20, 0x20, InstanceOf),
        (0x21, 0x21, ArrayLen),
        (0x22, 0x22, NewInstance),
        (0x23, 0x23, NewArray),
        (0x24, 0x25, FilledNewArray),
        (0x26, 0x26, FillArrayData),
        (0x27, 0x27, Throw),
        (0x28, 0x2a, Goto),
        (0x2b, 0x2c, Switch),
        (0x2d, 0x31, Cmp),
        (0x32, 0x37, If),
        (0x38, 0x3d, IfZ),
        (0x3e, 0x43, Nop),
        (0x44, 0x4a, ArrayGet),
        (0x4b, 0x51, ArrayPut),
        (0x52, 0x58, InstanceGet),
        (0x59, 0x5f, InstancePut),
        (0x60, 0x66, StaticGet),
        (0x67, 0x6d, StaticPut),
        (0x6e, 0x6e, InvokeVirtual),
        (0x6f, 0x6f, InvokeSuper),
        (0x70, 0x70, InvokeDirect),
        (0x71, 0x71, InvokeStatic),
        (0x72, 0x72, InvokeInterface),
        (0x73, 0x73, Nop),
        (0x74, 0x74, InvokeVirtual),
        (0x75, 0x75, InvokeSuper),
        (0x76, 0x76, InvokeDirect),
        (0x77, 0x77, InvokeStatic),
        (0x78, 0x78, InvokeInterface),
        (0x79, 0x7a, Nop),
        (0x7b, 0x8f, UnaryOp),
        (0x90, 0xcf, BinaryOp),
        (0xd0, 0xe2, BinaryOpConst),
        (0xe3, 0xff, Nop),
    ];
    for (start, end, family) in ranges
    {
        map.insert(start..=end, family);
    }
    map
});

impl DalvikOpcode
{
    pub fn from_opcode(opcode: u8) -> DalvikOpcode
    {
        FAMILIES.get(&opcode).copied().unwrap_or(DalvikOpcode::Nop)
    }

    pub fn is_invoke(&self) -> bool
    {
        matches!(
            self,
            DalvikOpcode::InvokeVirtual
                | DalvikOpcode::InvokeSuper
                | DalvikOpcode::InvokeDirect
                | DalvikOpcode::InvokeStatic
                | DalvikOpcode::InvokeInterface
        )
    }

    pub fn is_control_flow(&self) -> bool
    {
        matches!(self, DalvikOpcode::Goto | DalvikOpcode::If | DalvikOpcode::IfZ | DalvikOpcode::Switch)
    }

    /// Families that may raise an exception at runtime. Handlers guarding
    /// anything else are unreachable from that instruction.
    pub fn can_throw(&self) -> bool
    {
        use DalvikOpcode::*;
        matches!(
            self,
            InvokeVirtual
                | InvokeSuper
                | InvokeDirect
                | InvokeStatic
                | InvokeInterface
                | MonitorEnter
                | MonitorExit
                | CheckCast
                | ArrayLen
                | NewArray
                | NewInstance
                | FilledNewArray
                | FillArrayData
                | Throw
                | ArrayGet
                | ArrayPut
                | InstanceGet
                | InstancePut
                | StaticGet
                | StaticPut
                | BinaryOp
                | BinaryOpConst
        )
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn families_cover_every_byte()
    {
        assert_eq!(DalvikOpcode::from_opcode(0x00), DalvikOpcode::Nop);
        assert_eq!(DalvikOpcode::from_opcode(0x0d), DalvikOpcode::MoveResult);
        assert_eq!(DalvikOpcode::from_opcode(0x19), DalvikOpcode::Const64);
        assert_eq!(DalvikOpcode::from_opcode(0x73), DalvikOpcode::Nop);
        assert_eq!(DalvikOpcode::from_opcode(0x78), DalvikOpcode::InvokeInterface);
        assert_eq!(DalvikOpcode::from_opcode(0xb0), DalvikOpcode::BinaryOp);
        assert_eq!(DalvikOpcode::from_opcode(0xe2), DalvikOpcode::BinaryOpConst);
        assert_eq!(DalvikOpcode::from_opcode(0xff), DalvikOpcode::Nop);
        for op in 0..=255u8
        {
            // every byte resolves without falling through the lookup
            assert!(FAMILIES.get(&op).is_some(), "opcode 0x{:02x}", op);
        }
    }

    #[test]
    fn throwing_families()
    {
        assert!(DalvikOpcode::from_opcode(0x6e).can_throw());
        assert!(!DalvikOpcode::from_opcode(0x01).can_throw());
        assert!(!DalvikOpcode::from_opcode(0x28).can_throw());
        assert!(DalvikOpcode::from_opcode(0x28).is_control_flow());
    }
}
