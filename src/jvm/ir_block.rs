//! Per-position instruction builder used during instruction selection.

use crate::dex::strip_class_desc;
use crate::error::TranslateError;
use crate::jvm::array_ops;
use crate::jvm::constant_pool::ConstantPool;
use crate::jvm::instructions::{InsnArena, InsnId, JvmInstruction, Jump, PrimConst, RegKey, Switch};
use crate::jvm::ops::*;
use crate::jvm::optimization::dup2ize::gen_dups;
use crate::jvm::{ilfda_ord, op_u2};
use crate::typeinference::{ArrayType, Scalars, TypeInfo};

use std::collections::BTreeMap;

const JAVA_LANG_OBJECT: &str = "java/lang/Object";
const OBJECT_ARRAY: &str = "[Ljava/lang/Object;";

/// Instructions generated for one Dalvik instruction. Always starts with the
/// label carrying the Dalvik position.
pub struct IrBlock<'a>
{
    pub pos: u32,
    pub pool: &'a mut ConstantPool,
    arena: &'a mut InsnArena,
    type_data: &'a TypeInfo,
    delay_consts: bool,
    instructions: Vec<InsnId>,
}

impl<'a> IrBlock<'a>
{
    pub fn new(
        pos: u32,
        pool: &'a mut ConstantPool,
        arena: &'a mut InsnArena,
        type_data: &'a TypeInfo,
        delay_consts: bool,
    ) -> Self
    {
        let head = arena.alloc(JvmInstruction::Label(Some(pos)));
        IrBlock { pos, pool, arena, type_data, delay_consts, instructions: vec![head] }
    }

    pub fn type_data(&self) -> &'a TypeInfo
    {
        self.type_data
    }

    pub fn into_instructions(self) -> Vec<InsnId>
    {
        self.instructions
    }

    pub fn add(&mut self, insn: JvmInstruction)
    {
        let id = self.arena.alloc(insn);
        self.instructions.push(id);
    }

    pub fn other(&mut self, op: u8)
    {
        self.add(JvmInstruction::other(op));
    }

    pub fn other_bytes(&mut self, bytes: Vec<u8>)
    {
        self.add(JvmInstruction::Other(bytes));
    }

    /// Opcode with a class reference operand.
    pub fn class_op(&mut self, op: u8, class: &str) -> Result<(), TranslateError>
    {
        let index = self.pool.class_ref(class)?;
        self.other_bytes(op_u2(op, index));
        Ok(())
    }

    pub fn ldc(&mut self, index: u16)
    {
        let bytes = if index < 256 { vec![LDC, index as u8] } else { op_u2(LDC_W, index) };
        self.add(JvmInstruction::OtherConst(bytes));
    }

    /// Pushes register `reg` as `st`. `desc` is the descriptor or class name
    /// the use expects; tainted references are cast back to it.
    pub fn load(&mut self, reg: usize, st: Scalars, desc: Option<&str>) -> Result<(), TranslateError>
    {
        if *self.type_data.array(reg) == ArrayType::Null
        {
            if st.is_wide()
            {
                return self.const64(0, st);
            }
            return self.const32(0, st);
        }

        self.add(JvmInstruction::load(RegKey::new(reg, st)));
        if st == Scalars::OBJ && self.type_data.is_tainted(reg)
        {
            if let Some(desc) = desc
            {
                let class = strip_class_desc(desc);
                if class != JAVA_LANG_OBJECT
                {
                    self.class_op(CHECKCAST, class)?;
                }
            }
        }
        Ok(())
    }

    pub fn load_as_array(&mut self, reg: usize) -> Result<(), TranslateError>
    {
        let at = self.type_data.array(reg).clone();
        if at == ArrayType::Null
        {
            self.const_null();
            return Ok(());
        }

        self.add(JvmInstruction::load(RegKey::new(reg, Scalars::OBJ)));
        if self.type_data.is_tainted(reg)
        {
            match at.desc()
            {
                Some(desc) => self.class_op(CHECKCAST, desc)?,
                None => self.class_op(CHECKCAST, OBJECT_ARRAY)?,
            }
        }
        Ok(())
    }

    pub fn store(&mut self, reg: usize, st: Scalars)
    {
        self.add(JvmInstruction::store(RegKey::new(reg, st)));
    }

    pub fn return_void(&mut self)
    {
        self.other(RETURN);
    }

    pub fn return_typed(&mut self, st: Scalars)
    {
        self.other(IRETURN + ilfda_ord(st));
    }

    pub fn const_null(&mut self)
    {
        self.add(JvmInstruction::OtherConst(vec![ACONST_NULL]));
    }

    pub fn const32(&mut self, value: i32, st: Scalars) -> Result<(), TranslateError>
    {
        if st == Scalars::OBJ
        {
            self.const_null();
            return Ok(());
        }
        self.prim_const(value as i64, st)
    }

    pub fn const64(&mut self, value: i64, st: Scalars) -> Result<(), TranslateError>
    {
        if st == Scalars::OBJ
        {
            self.const_null();
            return Ok(());
        }
        self.prim_const(value, st)
    }

    // With delayed constants the pool is left alone until the whole class is built.
    fn prim_const(&mut self, value: i64, st: Scalars) -> Result<(), TranslateError>
    {
        let pool = if self.delay_consts { None } else { Some(&mut *self.pool) };
        let c = PrimConst::new(st, value, pool)?;
        self.add(JvmInstruction::PrimConst(c));
        Ok(())
    }

    /// Stores `count` elements into the array on top of the stack with `op`,
    /// duplicating the array reference as needed. `fill` pushes element `i`.
    /// With `pop` unset the array reference is left on the stack.
    pub fn fill_array_sub<F>(&mut self, op: u8, count: usize, pop: bool, mut fill: F) -> Result<(), TranslateError>
    where
        F: FnMut(&mut Self, usize) -> Result<(), TranslateError>,
    {
        let mut gen = gen_dups(count, if pop { 0 } else { 1 }).into_iter();
        for i in 0..count
        {
            for insn in gen.next().unwrap_or_default()
            {
                self.add(insn);
            }
            self.const32(i as i32, Scalars::INT)?;
            fill(self, i)?;
            self.other(op);
        }
        for insn in gen.next().unwrap_or_default()
        {
            self.add(insn);
        }
        Ok(())
    }

    pub fn new_array(&mut self, desc: &str) -> Result<(), TranslateError>
    {
        if let Some(code) = array_ops::new_array_code(desc)
        {
            self.other_bytes(vec![NEWARRAY, code]);
            return Ok(());
        }
        let element = if desc.starts_with("[L") && desc.len() > 3
        {
            &desc[2..desc.len() - 1]
        }
        else if !desc.is_empty()
        {
            &desc[1..]
        }
        else
        {
            fail!("Empty array descriptor");
        };
        self.class_op(ANEWARRAY, element)
    }

    pub fn cast(&mut self, reg: usize, class: &str) -> Result<(), TranslateError>
    {
        self.load(reg, Scalars::OBJ, None)?;
        self.class_op(CHECKCAST, class)?;
        self.store(reg, Scalars::OBJ);
        Ok(())
    }

    pub fn goto(&mut self, target: u32)
    {
        self.add(JvmInstruction::Jump(Jump::goto(target)));
    }

    pub fn if_cond(&mut self, op: u8, target: u32)
    {
        self.add(JvmInstruction::Jump(Jump::cond(op, target)));
    }

    /// Cases branching to the default are folded into it.
    pub fn switch_case(&mut self, default: u32, jumps: &BTreeMap<i32, u32>) -> Result<(), TranslateError>
    {
        let filtered: BTreeMap<i32, u32> = jumps.iter().filter(|(_, t)| **t != default).map(|(k, t)| (*k, *t)).collect();
        if filtered.is_empty()
        {
            self.add(JvmInstruction::pop());
            self.goto(default);
        }
        else
        {
            self.add(JvmInstruction::Switch(Switch::new(default, filtered)?));
        }
        Ok(())
    }
}

/// Brackets the throwing part of a block, the first through last fixed
/// instruction, with fresh start and end labels. `None` if nothing in the
/// block can throw.
pub fn generate_except_labels(arena: &mut InsnArena, instructions: &mut Vec<InsnId>) -> Option<(InsnId, InsnId)>
{
    let is_other = |id: &InsnId| matches!(arena[*id], JvmInstruction::Other(_));
    let first = instructions.iter().position(is_other)?;
    let last = instructions.iter().rposition(is_other)?;

    let start = arena.alloc(JvmInstruction::Label(None));
    let end = arena.alloc(JvmInstruction::Label(None));
    instructions.insert(first, start);
    instructions.insert(last + 2, end);
    Some((start, end))
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn ops_of(arena: &InsnArena, ids: &[InsnId]) -> Vec<JvmInstruction>
    {
        ids.iter().map(|id| arena[*id].clone()).collect()
    }

    #[test]
    fn null_registers_load_as_constants()
    {
        let mut pool = ConstantPool::simple();
        let mut arena = InsnArena::new();
        let info = TypeInfo::new().assign(0, Scalars::ZERO, ArrayType::Null, false);
        let mut block = IrBlock::new(4, &mut pool, &mut arena, &info, false);
        block.load(0, Scalars::OBJ, None).unwrap();
        block.load(0, Scalars::INT, None).unwrap();
        block.load_as_array(0).unwrap();
        let ids = block.into_instructions();
        let insns = ops_of(&arena, &ids);
        assert_eq!(insns[0], JvmInstruction::Label(Some(4)));
        assert_eq!(insns[1], JvmInstruction::OtherConst(vec![ACONST_NULL]));
        assert!(matches!(&insns[2], JvmInstruction::PrimConst(c) if c.bytecode == vec![ICONST_0]));
        assert_eq!(insns[3], JvmInstruction::OtherConst(vec![ACONST_NULL]));
    }

    #[test]
    fn tainted_loads_are_cast_back()
    {
        let mut pool = ConstantPool::simple();
        let mut arena = InsnArena::new();
        let info = TypeInfo::new()
            .assign(1, Scalars::OBJ, ArrayType::Invalid, true)
            .assign(2, Scalars::OBJ, ArrayType::from_desc("[I"), true);
        let mut block = IrBlock::new(0, &mut pool, &mut arena, &info, false);
        block.load(1, Scalars::OBJ, Some("Ljava/lang/String;")).unwrap();
        block.load(1, Scalars::OBJ, Some("Ljava/lang/Object;")).unwrap();
        block.load_as_array(2).unwrap();
        let ids = block.into_instructions();
        let insns = ops_of(&arena, &ids);
        assert_eq!(insns.len(), 6);
        assert!(matches!(&insns[2], JvmInstruction::Other(b) if b[0] == CHECKCAST));
        assert_eq!(insns[3], JvmInstruction::load(RegKey::new(1, Scalars::OBJ)));
        assert!(matches!(&insns[5], JvmInstruction::Other(b) if b[0] == CHECKCAST));
        assert!(pool.contains(&crate::jvm::PoolData::Utf8(b"[I".to_vec())));
    }

    #[test]
    fn switch_without_distinct_cases_becomes_goto()
    {
        let mut pool = ConstantPool::simple();
        let mut arena = InsnArena::new();
        let info = TypeInfo::new();
        let mut block = IrBlock::new(0, &mut pool, &mut arena, &info, false);
        let jumps: BTreeMap<i32, u32> = [(1, 9), (2, 9)].into_iter().collect();
        block.switch_case(9, &jumps).unwrap();
        let ids = block.into_instructions();
        let insns = ops_of(&arena, &ids);
        assert_eq!(insns[1], JvmInstruction::pop());
        assert_eq!(insns[2], JvmInstruction::Jump(Jump::goto(9)));
    }

    #[test]
    fn except_labels_wrap_throwing_part()
    {
        let mut pool = ConstantPool::simple();
        let mut arena = InsnArena::new();
        let info = TypeInfo::new();
        let mut block = IrBlock::new(0, &mut pool, &mut arena, &info, false);
        block.load(3, Scalars::OBJ, None).unwrap();
        block.other(ARRAYLENGTH);
        block.store(0, Scalars::INT);
        let mut ids = block.into_instructions();
        let (start, end) = generate_except_labels(&mut arena, &mut ids).unwrap();
        assert_eq!(ids.len(), 6);
        assert_eq!(ids[2], start);
        assert_eq!(arena[ids[3]], JvmInstruction::other(ARRAYLENGTH));
        assert_eq!(ids[4], end);

        let mut quiet = vec![ids[0], ids[1]];
        assert!(generate_except_labels(&mut arena, &mut quiet).is_none());
    }

    #[test]
    fn object_arrays_use_anewarray()
    {
        let mut pool = ConstantPool::simple();
        let mut arena = InsnArena::new();
        let info = TypeInfo::new();
        let mut block = IrBlock::new(0, &mut pool, &mut arena, &info, false);
        block.new_array("[I").unwrap();
        block.new_array("[Ljava/lang/String;").unwrap();
        block.new_array("[[J").unwrap();
        let ids = block.into_instructions();
        assert_eq!(arena[ids[1]], JvmInstruction::Other(vec![NEWARRAY, 10]));
        assert!(matches!(&arena[ids[2]], JvmInstruction::Other(b) if b[0] == ANEWARRAY));
        assert!(pool.contains(&crate::jvm::PoolData::Utf8(b"java/lang/String".to_vec())));
        assert!(pool.contains(&crate::jvm::PoolData::Utf8(b"[J".to_vec())));
    }
}
