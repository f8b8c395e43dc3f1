use bitflags::bitflags;

use crate::dex::MethodId;

bitflags! {
    /// Set of JVM static types a register's bit pattern can be used as.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Scalars: u8 {
        const INT = 1 << 0;
        const FLOAT = 1 << 1;
        const OBJ = 1 << 2;
        const LONG = 1 << 3;
        const DOUBLE = 1 << 4;

        /// A zero literal is a valid int, float and null reference.
        const ZERO = Self::INT.bits() | Self::FLOAT.bits() | Self::OBJ.bits();
        const C32 = Self::INT.bits() | Self::FLOAT.bits();
        const C64 = Self::LONG.bits() | Self::DOUBLE.bits();
        const ALL = Self::ZERO.bits() | Self::C64.bits();
    }
}

impl Scalars {
    pub const INVALID: Scalars = Scalars::empty();

    /// Static type of a descriptor, keyed on its first character.
    pub fn from_desc(desc: &str) -> Scalars {
        match desc.as_bytes().first() {
            Some(b'Z' | b'B' | b'C' | b'S' | b'I') => Scalars::INT,
            Some(b'F') => Scalars::FLOAT,
            Some(b'J') => Scalars::LONG,
            Some(b'D') => Scalars::DOUBLE,
            Some(b'L' | b'[') => Scalars::OBJ,
            _ => Scalars::INVALID,
        }
    }

    pub fn is_wide(self) -> bool {
        self.intersects(Scalars::C64)
    }

    /// Static type of each parameter register, `INVALID` for the upper half of wide values.
    pub fn param_types(method: &MethodId, is_static: bool) -> Vec<Scalars> {
        method
            .spaced_param_types(is_static)
            .iter()
            .map(|p| p.as_deref().map_or(Scalars::INVALID, Scalars::from_desc))
            .collect()
    }
}
