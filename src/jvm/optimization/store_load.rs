use std::collections::{HashMap, HashSet};

use crate::jvm::instructions::{InsnId, JvmInstruction, RegKey};
use crate::jvm::ir_writer::IrWriter;
use crate::jvm::optimization::{visit_linear_code, LinearVisitor};

#[derive(Default)]
struct StoreLoadPruner
{
    current: HashMap<RegKey, (InsnId, InsnId)>,
    last: Option<(InsnId, RegKey)>,
    removed: HashSet<InsnId>,
}

impl LinearVisitor for StoreLoadPruner
{
    fn reset(&mut self)
    {
        self.current.clear();
        self.last = None;
    }

    fn visit_return(&mut self)
    {
        for (store, load) in self.current.values()
        {
            self.removed.insert(*store);
            self.removed.insert(*load);
        }
        self.reset();
    }

    fn visit(&mut self, id: InsnId, insn: &JvmInstruction)
    {
        match insn
        {
            JvmInstruction::RegAccess(access) if access.store =>
            {
                // the pair's value was never read again before this overwrite
                if let Some((store, load)) = self.current.remove(&access.key)
                {
                    self.removed.insert(store);
                    self.removed.insert(load);
                }
                self.last = Some((id, access.key));
            }
            JvmInstruction::RegAccess(access) =>
            {
                self.current.remove(&access.key);
                if let Some((store, key)) = self.last
                {
                    if key == access.key
                    {
                        self.current.insert(key, (store, id));
                    }
                }
                self.last = None;
            }
            JvmInstruction::Label(_) => {}
            _ => self.last = None,
        }
    }
}

/// Removes a store immediately followed by a load of the same register
/// (a label may sit in between) when nothing else in the straight-line
/// span reads the register. Breaks the block head invariant dup2ize
/// relies on, so it has to run after it.
pub fn optimize(ir: &mut IrWriter)
{
    let pruner = visit_linear_code(ir, StoreLoadPruner::default());
    if pruner.removed.is_empty()
    {
        return;
    }
    let replace: HashMap<InsnId, Vec<InsnId>> = pruner.removed.into_iter().map(|id| (id, Vec::new())).collect();
    ir.replace_instructions(&replace);
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::jvm::instructions::Jump;
    use crate::jvm::ops::*;
    use crate::jvm::optimization::test_util::*;
    use crate::typeinference::Scalars;

    #[test]
    fn store_then_load_collapses()
    {
        let k = RegKey::new(0, Scalars::INT);
        let mut ir = writer(vec![
            JvmInstruction::other(ICONST_1),
            JvmInstruction::store(k),
            JvmInstruction::Label(Some(1)),
            JvmInstruction::load(k),
            JvmInstruction::other(IRETURN),
        ]);
        optimize(&mut ir);
        assert_eq!(
            flat(&ir),
            vec![JvmInstruction::other(ICONST_1), JvmInstruction::Label(Some(1)), JvmInstruction::other(IRETURN)]
        );
    }

    #[test]
    fn later_reads_keep_the_pair()
    {
        let k = RegKey::new(0, Scalars::INT);
        let insns = vec![
            JvmInstruction::other(ICONST_1),
            JvmInstruction::store(k),
            JvmInstruction::load(k),
            JvmInstruction::load(k),
            JvmInstruction::other(IADD),
            JvmInstruction::other(IRETURN),
        ];
        let mut ir = writer(insns.clone());
        optimize(&mut ir);
        assert_eq!(flat(&ir), insns);
    }

    #[test]
    fn pairs_alive_at_a_branch_stay()
    {
        let k = RegKey::new(0, Scalars::INT);
        let insns = vec![
            JvmInstruction::other(ICONST_1),
            JvmInstruction::store(k),
            JvmInstruction::load(k),
            JvmInstruction::Jump(Jump::cond(IFEQ, 0)),
            JvmInstruction::load(k),
            JvmInstruction::other(IRETURN),
        ];
        let mut ir = writer(insns.clone());
        optimize(&mut ir);
        assert_eq!(flat(&ir), insns);
    }
}
