//! The target instruction model.
//!
//! Instructions live in an [`InsnArena`] and are referred to by [`InsnId`].
//! The flattened method body, jump target sets and exception ranges all hold
//! ids, so rewriting passes can refer to an instruction without borrowing it.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Index, IndexMut};

use crate::error::TranslateError;
use crate::jvm::constant_pool::{ConstantPool, PoolData};
use crate::jvm::constants;
use crate::jvm::ops::*;
use crate::jvm::{ilfda_ord, op_u2, write_u1, write_u2, write_u4};
use crate::typeinference::Scalars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub u32);

/// A Dalvik register viewed as one static type. Each view gets its own local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegKey
{
    pub reg: u32,
    pub st: Scalars,
}

impl RegKey
{
    pub fn new(reg: usize, st: Scalars) -> Self
    {
        RegKey { reg: reg as u32, st }
    }

    pub fn is_wide(&self) -> bool
    {
        self.st.is_wide()
    }
}

/// Load or store of a local. The bytecode is filled in by register allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegAccess
{
    pub key: RegKey,
    pub store: bool,
    pub bytecode: Option<Vec<u8>>,
}

impl RegAccess
{
    pub fn new(key: RegKey, store: bool) -> Self
    {
        RegAccess { key, store, bytecode: None }
    }

    pub fn is_wide(&self) -> bool
    {
        self.key.is_wide()
    }

    /// Shortest encoding of a typed load or store of local `local`.
    pub fn encode(local: u16, st: Scalars, store: bool) -> Vec<u8>
    {
        let offset = if store { ISTORE - ILOAD } else { 0 };
        let ord = ilfda_ord(st);
        if local < 4
        {
            vec![ILOAD_0 + offset + local as u8 + ord * 4]
        }
        else if local < 256
        {
            vec![ILOAD + offset + ord, local as u8]
        }
        else
        {
            let mut v = vec![WIDE];
            write_u1(&mut v, ILOAD + offset + ord);
            write_u2(&mut v, local);
            v
        }
    }

    pub fn calculate_bytecode(&mut self, local: u16)
    {
        self.bytecode = Some(RegAccess::encode(local, self.key.st, self.store));
    }
}

/// A typed numeric literal, pushed either from the constant pool or by a
/// computed instruction sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimConst
{
    pub st: Scalars,
    /// Normalized value; floating point constants hold their raw bits.
    pub value: i64,
    pub bytecode: Vec<u8>,
}

impl PrimConst
{
    /// With a pool, short table forms win and everything else is loaded
    /// from the pool. Without one, the value is always computed.
    pub fn new(st: Scalars, value: i64, pool: Option<&mut ConstantPool>) -> Result<Self, TranslateError>
    {
        let value = constants::normalize(st, value);
        let bytecode = match pool
        {
            Some(pool) => match constants::lookup_only(st, value)
            {
                Some(bytes) => bytes.to_vec(),
                None => match PrimConst::from_pool(st, value, pool)?
                {
                    Some(bytes) => bytes,
                    None => limit!("No constant pool space for literal {}", value),
                },
            },
            None => constants::calc(st, value)?,
        };
        Ok(PrimConst { st, value, bytecode })
    }

    pub fn is_wide(&self) -> bool
    {
        self.st.is_wide()
    }

    pub fn pool_data(st: Scalars, value: i64) -> PoolData
    {
        if st == Scalars::FLOAT
        {
            PoolData::Float(value as u32)
        }
        else if st == Scalars::LONG
        {
            PoolData::Long(value)
        }
        else if st == Scalars::DOUBLE
        {
            PoolData::Double(value as u64)
        }
        else
        {
            PoolData::Int(value as i32)
        }
    }

    fn from_pool(st: Scalars, value: i64, pool: &mut ConstantPool) -> Result<Option<Vec<u8>>, TranslateError>
    {
        let index = match pool.data_ref(PrimConst::pool_data(st, value))?
        {
            Some(index) => index,
            None => return Ok(None),
        };
        let bytes = if st.is_wide()
        {
            op_u2(LDC2_W, index)
        }
        else if index >= 256
        {
            op_u2(LDC_W, index)
        }
        else
        {
            vec![LDC, index as u8]
        };
        Ok(Some(bytes))
    }

    /// Switches a computed sequence to a pool load when that is shorter.
    pub fn fix_with_pool(&mut self, pool: &mut ConstantPool) -> Result<(), TranslateError>
    {
        if self.bytecode.len() > 2
        {
            if let Some(bytes) = PrimConst::from_pool(self.st, self.value, pool)?
            {
                if bytes.len() < self.bytecode.len()
                {
                    self.bytecode = bytes;
                }
            }
        }
        Ok(())
    }
}

/// `goto` (no condition) or a conditional branch, sized lazily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jump
{
    pub op: Option<u8>,
    /// Dalvik position of the target block.
    pub target: u32,
    pub min: usize,
    pub max: usize,
    pub bytecode: Option<Vec<u8>>,
}

impl Jump
{
    pub fn goto(target: u32) -> Self
    {
        Jump { op: None, target, min: 3, max: 5, bytecode: None }
    }

    pub fn cond(op: u8, target: u32) -> Self
    {
        Jump { op: Some(op), target, min: 3, max: 8, bytecode: None }
    }

    /// Forces the long form once the offset no longer fits 16 bits.
    pub fn widen_if_necessary(&mut self, offset: i64) -> bool
    {
        if offset < -32768 || offset >= 32768
        {
            self.min = self.max;
            true
        }
        else
        {
            false
        }
    }

    pub fn calculate_bytecode(&mut self, offset: i32) -> Result<(), TranslateError>
    {
        let mut v = Vec::with_capacity(self.max);
        match self.op
        {
            None if self.max == 3 =>
            {
                write_u1(&mut v, GOTO);
                write_u2(&mut v, offset as u16);
            }
            None =>
            {
                write_u1(&mut v, GOTO_W);
                write_u4(&mut v, offset as u32);
            }
            Some(op) if self.max == 3 =>
            {
                write_u1(&mut v, op);
                write_u2(&mut v, offset as u16);
            }
            Some(op) =>
            {
                // inverted short branch over a goto_w
                let inverse = match opposite(op)
                {
                    Some(inverse) => inverse,
                    None => fail!("No inverse for branch opcode 0x{:02x}", op),
                };
                write_u1(&mut v, inverse);
                write_u2(&mut v, 8);
                write_u1(&mut v, GOTO_W);
                write_u4(&mut v, (offset - 3) as u32);
            }
        }
        self.bytecode = Some(v);
        Ok(())
    }
}

/// `tableswitch` or `lookupswitch`, whichever is smaller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch
{
    pub default: u32,
    pub jumps: BTreeMap<i32, u32>,
    pub is_table: bool,
    /// Size without alignment padding.
    pub no_pad_size: usize,
    pub low: i32,
    pub high: i32,
    pub bytecode: Option<Vec<u8>>,
}

impl Switch
{
    pub fn new(default: u32, jumps: BTreeMap<i32, u32>) -> Result<Self, TranslateError>
    {
        let (low, high) = match (jumps.keys().next(), jumps.keys().next_back())
        {
            (Some(low), Some(high)) => (*low, *high),
            _ => fail!("Switch without cases"),
        };
        let table_size = 4 * (high as i64 - low as i64 + 2);
        let jump_size = 8 * jumps.len() as i64;
        let is_table = jump_size > table_size;
        let no_pad_size = 9 + (if is_table { table_size } else { jump_size }) as usize;
        Ok(Switch { default, jumps, is_table, no_pad_size, low, high, bytecode: None })
    }

    pub fn max(&self) -> usize
    {
        self.no_pad_size + 3
    }

    /// Operands start on a 4 byte boundary.
    pub fn padding(pos: usize) -> usize
    {
        (4 - ((pos + 1) % 4)) % 4
    }

    pub fn targets(&self) -> Vec<u32>
    {
        let mut targets: BTreeSet<u32> = self.jumps.values().copied().collect();
        targets.insert(self.default);
        targets.into_iter().collect()
    }

    /// `offset_of` maps a Dalvik target position to its offset from this switch.
    pub fn calculate_bytecode<F>(&mut self, pos: usize, offset_of: F) -> Result<(), TranslateError>
    where
        F: Fn(u32) -> Result<i32, TranslateError>,
    {
        let mut v = Vec::with_capacity(self.max());
        write_u1(&mut v, if self.is_table { TABLESWITCH } else { LOOKUPSWITCH });
        for _ in 0..Switch::padding(pos)
        {
            write_u1(&mut v, 0);
        }
        write_u4(&mut v, offset_of(self.default)? as u32);
        if self.is_table
        {
            write_u4(&mut v, self.low as u32);
            write_u4(&mut v, self.high as u32);
            for k in self.low as i64..=self.high as i64
            {
                let target = self.jumps.get(&(k as i32)).copied().unwrap_or(self.default);
                write_u4(&mut v, offset_of(target)? as u32);
            }
        }
        else
        {
            write_u4(&mut v, self.jumps.len() as u32);
            for (key, target) in &self.jumps
            {
                write_u4(&mut v, *key as u32);
                write_u4(&mut v, offset_of(*target)? as u32);
            }
        }
        self.bytecode = Some(v);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JvmInstruction
{
    /// Zero sized marker. Block heads carry their Dalvik position.
    Label(Option<u32>),
    RegAccess(RegAccess),
    PrimConst(PrimConst),
    /// `aconst_null` or an `ldc` of a string or class.
    OtherConst(Vec<u8>),
    /// Anything with fixed bytes: arithmetic, field and array access, invokes, stack ops.
    Other(Vec<u8>),
    Jump(Jump),
    Switch(Switch),
}

impl JvmInstruction
{
    pub fn other(op: u8) -> Self
    {
        JvmInstruction::Other(vec![op])
    }

    pub fn pop() -> Self
    {
        JvmInstruction::other(POP)
    }

    pub fn pop2() -> Self
    {
        JvmInstruction::other(POP2)
    }

    pub fn dup() -> Self
    {
        JvmInstruction::other(DUP)
    }

    pub fn dup2() -> Self
    {
        JvmInstruction::other(DUP2)
    }

    pub fn load(key: RegKey) -> Self
    {
        JvmInstruction::RegAccess(RegAccess::new(key, false))
    }

    pub fn store(key: RegKey) -> Self
    {
        JvmInstruction::RegAccess(RegAccess::new(key, true))
    }

    pub fn bytecode(&self) -> Option<&[u8]>
    {
        match self
        {
            JvmInstruction::Label(_) => Some(&[]),
            JvmInstruction::RegAccess(r) => r.bytecode.as_deref(),
            JvmInstruction::PrimConst(c) => Some(&c.bytecode),
            JvmInstruction::OtherConst(b) | JvmInstruction::Other(b) => Some(b),
            JvmInstruction::Jump(j) => j.bytecode.as_deref(),
            JvmInstruction::Switch(s) => s.bytecode.as_deref(),
        }
    }

    /// Largest encoding this instruction can end up with.
    pub fn max_len(&self) -> usize
    {
        match self
        {
            JvmInstruction::RegAccess(RegAccess { bytecode: None, .. }) => 4,
            JvmInstruction::Jump(j) if j.bytecode.is_none() => j.max,
            JvmInstruction::Switch(s) if s.bytecode.is_none() => s.max(),
            _ => self.bytecode().map_or(0, |b| b.len()),
        }
    }

    pub fn falls_through(&self) -> bool
    {
        match self
        {
            JvmInstruction::Jump(j) => j.op.is_some(),
            JvmInstruction::Switch(_) => false,
            JvmInstruction::Other(b) => !(b.len() == 1 && ((IRETURN..=RETURN).contains(&b[0]) || b[0] == ATHROW)),
            _ => true,
        }
    }

    /// Dalvik positions this instruction may branch to.
    pub fn targets(&self) -> Vec<u32>
    {
        match self
        {
            JvmInstruction::Jump(j) => vec![j.target],
            JvmInstruction::Switch(s) => s.targets(),
            _ => Vec::new(),
        }
    }

    pub fn is_constant(&self) -> bool
    {
        matches!(self, JvmInstruction::PrimConst(_) | JvmInstruction::OtherConst(_))
    }

    pub fn as_load(&self) -> Option<RegKey>
    {
        match self
        {
            JvmInstruction::RegAccess(r) if !r.store => Some(r.key),
            _ => None,
        }
    }

    pub fn as_store(&self) -> Option<RegKey>
    {
        match self
        {
            JvmInstruction::RegAccess(r) if r.store => Some(r.key),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InsnArena
{
    insns: Vec<JvmInstruction>,
}

impl InsnArena
{
    pub fn new() -> Self
    {
        InsnArena::default()
    }

    pub fn alloc(&mut self, insn: JvmInstruction) -> InsnId
    {
        self.insns.push(insn);
        InsnId((self.insns.len() - 1) as u32)
    }

    pub fn len(&self) -> usize
    {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.insns.is_empty()
    }
}

impl Index<InsnId> for InsnArena
{
    type Output = JvmInstruction;

    fn index(&self, id: InsnId) -> &JvmInstruction
    {
        &self.insns[id.0 as usize]
    }
}

impl IndexMut<InsnId> for InsnArena
{
    fn index_mut(&mut self, id: InsnId) -> &mut JvmInstruction
    {
        &mut self.insns[id.0 as usize]
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn local_access_encodings()
    {
        assert_eq!(RegAccess::encode(0, Scalars::INT, false), vec![ILOAD_0]);
        // astore_3
        assert_eq!(RegAccess::encode(3, Scalars::OBJ, true), vec![0x4e]);
        assert_eq!(RegAccess::encode(7, Scalars::DOUBLE, false), vec![DLOAD, 7]);
        assert_eq!(RegAccess::encode(300, Scalars::LONG, true), vec![WIDE, 0x37, 1, 44]);
    }

    #[test]
    fn constants_prefer_short_table_forms()
    {
        let mut pool = ConstantPool::simple();
        let c = PrimConst::new(Scalars::FLOAT, 0xBF80_0000u32 as i32 as i64, Some(&mut pool)).unwrap();
        assert_eq!(c.bytecode, vec![ICONST_M1, I2F]);
        let c = PrimConst::new(Scalars::INT, 0x12345678, Some(&mut pool)).unwrap();
        assert_eq!(c.bytecode, vec![LDC, 1]);
        let c = PrimConst::new(Scalars::LONG, 1 << 40, Some(&mut pool)).unwrap();
        assert_eq!(c.bytecode[0], LDC2_W);

        let mut c = PrimConst::new(Scalars::INT, 0x12345678, None).unwrap();
        assert!(c.bytecode.len() > 3);
        c.fix_with_pool(&mut pool).unwrap();
        assert_eq!(c.bytecode, vec![LDC, 1]);
    }

    #[test]
    fn wide_conditional_branch_is_inverted()
    {
        let mut j = Jump::cond(IFEQ, 0);
        assert!(!j.widen_if_necessary(-32768));
        assert!(j.widen_if_necessary(40000));
        j.max = j.min;
        j.calculate_bytecode(40000).unwrap();
        assert_eq!(j.bytecode.unwrap(), vec![IFNE, 0, 8, GOTO_W, 0, 0, 0x9c, 0x3d]);

        let mut g = Jump::goto(0);
        g.max = g.min;
        g.calculate_bytecode(-3).unwrap();
        assert_eq!(g.bytecode.unwrap(), vec![GOTO, 0xff, 0xfd]);
    }

    #[test]
    fn switch_picks_smaller_form()
    {
        let dense: BTreeMap<i32, u32> = (0..10).map(|k| (k, 100 + k as u32)).collect();
        let s = Switch::new(5, dense).unwrap();
        assert!(s.is_table);
        assert_eq!(s.no_pad_size, 9 + 4 * 11);
        assert_eq!(s.targets().len(), 11);

        let sparse: BTreeMap<i32, u32> = [(0, 1), (1000, 2)].into_iter().collect();
        let mut s = Switch::new(3, sparse).unwrap();
        assert!(!s.is_table);
        s.calculate_bytecode(1, |t| Ok(t as i32)).unwrap();
        let bytes = s.bytecode.unwrap();
        assert_eq!(bytes.len(), 2 + s.no_pad_size);
        assert_eq!(bytes[0], LOOKUPSWITCH);
        assert_eq!(&bytes[3..7], &[0, 0, 0, 3]);
    }

    #[test]
    fn fall_through()
    {
        assert!(!JvmInstruction::other(RETURN).falls_through());
        assert!(!JvmInstruction::other(ATHROW).falls_through());
        assert!(JvmInstruction::other(IADD).falls_through());
        assert!(!JvmInstruction::Jump(Jump::goto(1)).falls_through());
        assert!(JvmInstruction::Jump(Jump::cond(IFNULL, 1)).falls_through());
    }
}
