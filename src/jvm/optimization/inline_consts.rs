//! Moves a constant to its only use when the register it was stored to is
//! read at most once before going dead.

use std::collections::{HashMap, HashSet};

use crate::jvm::instructions::{InsnId, JvmInstruction, RegKey};
use crate::jvm::ir_writer::IrWriter;
use crate::jvm::optimization::{visit_linear_code, LinearVisitor};

#[derive(Default)]
struct ConstInliner
{
    /// Store to its single load.
    uses: HashMap<InsnId, InsnId>,
    /// Stores known to be read at most once.
    not_multi_used: HashSet<InsnId>,
    current: HashMap<RegKey, InsnId>,
}

impl LinearVisitor for ConstInliner
{
    fn reset(&mut self)
    {
        self.current.clear();
    }

    fn visit_return(&mut self)
    {
        self.not_multi_used.extend(self.current.values().copied());
        self.reset();
    }

    fn visit(&mut self, id: InsnId, insn: &JvmInstruction)
    {
        if let JvmInstruction::RegAccess(access) = insn
        {
            if access.store
            {
                if let Some(old) = self.current.insert(access.key, id)
                {
                    self.not_multi_used.insert(old);
                }
            }
            else if let Some(store) = self.current.get(&access.key).copied()
            {
                if self.uses.contains_key(&store)
                {
                    self.current.remove(&access.key);
                }
                else
                {
                    self.uses.insert(store, id);
                }
            }
        }
    }
}

pub fn optimize(ir: &mut IrWriter)
{
    let visitor = visit_linear_code(ir, ConstInliner::default());
    if visitor.not_multi_used.is_empty()
    {
        return;
    }

    let mut replace: HashMap<InsnId, Vec<InsnId>> = HashMap::new();
    for pair in ir.flat.windows(2)
    {
        let (value, store) = (pair[0], pair[1]);
        if visitor.not_multi_used.contains(&store) && ir.insn(value).is_constant()
        {
            replace.insert(value, Vec::new());
            replace.insert(store, Vec::new());
            if let Some(load) = visitor.uses.get(&store)
            {
                replace.entry(*load).or_default().push(value);
            }
        }
    }
    ir.replace_instructions(&replace);
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::jvm::ops::*;
    use crate::jvm::optimization::test_util::*;
    use crate::typeinference::Scalars;

    fn aconst() -> JvmInstruction
    {
        JvmInstruction::OtherConst(vec![ACONST_NULL])
    }

    #[test]
    fn single_use_constant_moves_to_the_use()
    {
        let a = RegKey::new(0, Scalars::OBJ);
        let mut ir = writer(vec![
            aconst(),
            JvmInstruction::store(a),
            JvmInstruction::other(NOP),
            JvmInstruction::load(a),
            JvmInstruction::other(ARETURN),
        ]);
        optimize(&mut ir);
        assert_eq!(flat(&ir), vec![JvmInstruction::other(NOP), aconst(), JvmInstruction::other(ARETURN)]);
    }

    #[test]
    fn twice_read_constant_stays()
    {
        let a = RegKey::new(0, Scalars::OBJ);
        let insns = vec![
            aconst(),
            JvmInstruction::store(a),
            JvmInstruction::load(a),
            JvmInstruction::load(a),
            JvmInstruction::other(ARETURN),
        ];
        let mut ir = writer(insns.clone());
        optimize(&mut ir);
        assert_eq!(flat(&ir), insns);
    }

    #[test]
    fn overwritten_unread_constant_is_dropped()
    {
        let a = RegKey::new(0, Scalars::OBJ);
        let mut ir = writer(vec![
            aconst(),
            JvmInstruction::store(a),
            aconst(),
            JvmInstruction::store(a),
            JvmInstruction::load(a),
            JvmInstruction::load(a),
            JvmInstruction::other(ARETURN),
        ]);
        optimize(&mut ir);
        assert_eq!(
            flat(&ir),
            vec![aconst(), JvmInstruction::store(a), JvmInstruction::load(a), JvmInstruction::load(a), JvmInstruction::other(ARETURN)]
        );
    }
}
