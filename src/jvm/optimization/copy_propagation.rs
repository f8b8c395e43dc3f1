//! Redirects loads of a register to the register it was copied from, and
//! drops copies between registers already known to hold the same value.
//!
//! Unlike the other rewriting passes this one does not use the linear
//! visitor: state flows across a jump target that has a single predecessor.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::jvm::instructions::{InsnId, JvmInstruction, RegKey};
use crate::jvm::ir_writer::IrWriter;

/// Registers holding the same value. `root` is the one loads are redirected
/// to; when it is overwritten the oldest remaining member takes over.
#[derive(Debug, Clone)]
struct CopySet
{
    root: RegKey,
    set: HashSet<RegKey>,
    queue: VecDeque<RegKey>,
}

impl CopySet
{
    fn new(root: RegKey) -> Self
    {
        CopySet { root, set: HashSet::from([root]), queue: VecDeque::new() }
    }

    fn add(&mut self, key: RegKey)
    {
        self.set.insert(key);
        self.queue.push_back(key);
    }

    fn remove(&mut self, key: RegKey)
    {
        self.set.remove(&key);
        while !self.set.contains(&self.root)
        {
            match self.queue.pop_front()
            {
                Some(next) => self.root = next,
                None => break,
            }
        }
    }
}

/// Maps each register to its copy set. Sets live in a vector and are shared
/// by index, so cloning the map keeps the sharing intact.
#[derive(Debug, Clone, Default)]
pub(crate) struct CopySetsMap
{
    sets: Vec<CopySet>,
    lookup: HashMap<RegKey, usize>,
}

impl CopySetsMap
{
    fn get(&mut self, key: RegKey) -> usize
    {
        if let Some(index) = self.lookup.get(&key)
        {
            return *index;
        }
        self.sets.push(CopySet::new(key));
        let index = self.sets.len() - 1;
        self.lookup.insert(key, index);
        index
    }

    /// The register was overwritten with an unrelated value.
    pub fn clobber(&mut self, key: RegKey)
    {
        let index = self.get(key);
        self.sets[index].remove(key);
        self.lookup.remove(&key);
    }

    /// Records `dest = src`. Returns false when they already hold the same value.
    pub fn move_value(&mut self, dest: RegKey, src: RegKey) -> bool
    {
        let s = self.get(src);
        let d = self.get(dest);
        if s == d
        {
            return false;
        }
        self.sets[d].remove(dest);
        self.sets[s].add(dest);
        self.lookup.insert(dest, s);
        true
    }

    pub fn load(&mut self, key: RegKey) -> RegKey
    {
        let index = self.get(key);
        self.sets[index].root
    }
}

pub fn optimize(ir: &mut IrWriter)
{
    let mut replace: HashMap<InsnId, Vec<InsnId>> = HashMap::new();
    let mut single_pred_infos: HashMap<InsnId, CopySetsMap> = HashMap::new();
    let mut current = CopySetsMap::default();
    let mut prev: Option<InsnId> = None;

    let flat = ir.flat.clone();
    for id in flat
    {
        let insn = ir.insn(id).clone();
        if ir.is_jump_target(id)
        {
            // state only survives a lone jump into a label nothing falls into
            current = match prev
            {
                Some(p) if !ir.insn(p).falls_through() && ir.pred_count(id) == 1 =>
                {
                    single_pred_infos.get(&id).cloned().unwrap_or_default()
                }
                _ => CopySetsMap::default(),
            };
        }
        else if let JvmInstruction::RegAccess(access) = &insn
        {
            if access.store
            {
                match prev.and_then(|p| ir.insn(p).as_load())
                {
                    Some(src) =>
                    {
                        if !current.move_value(access.key, src)
                        {
                            if let Some(p) = prev
                            {
                                replace.insert(p, Vec::new());
                            }
                            replace.insert(id, Vec::new());
                        }
                    }
                    None => current.clobber(access.key),
                }
            }
            else
            {
                let root = current.load(access.key);
                if root != access.key
                {
                    let load = ir.alloc(JvmInstruction::load(root));
                    replace.insert(id, vec![load]);
                }
            }
        }
        else
        {
            for target in insn.targets()
            {
                if let Some(label) = ir.labels.get(&target).copied()
                {
                    if ir.pred_count(label) == 1
                    {
                        single_pred_infos.insert(label, current.clone());
                    }
                }
            }
        }
        prev = Some(id);
    }

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

    fn int(reg: usize) -> RegKey
    {
        RegKey::new(reg, Scalars::INT)
    }

    #[test]
    fn root_takes_over_after_clobber()
    {
        let mut map = CopySetsMap::default();
        assert!(map.move_value(int(1), int(0)));
        assert!(map.move_value(int(2), int(1)));
        assert!(!map.move_value(int(2), int(0)));
        assert_eq!(map.load(int(2)), int(0));

        map.clobber(int(0));
        assert_eq!(map.load(int(2)), int(1));
        assert_eq!(map.load(int(0)), int(0));
    }

    #[test]
    fn clones_keep_sets_shared()
    {
        let mut map = CopySetsMap::default();
        map.move_value(int(1), int(0));
        let mut copy = map.clone();
        assert!(!copy.move_value(int(1), int(0)));
        copy.clobber(int(0));
        assert_eq!(copy.load(int(1)), int(1));
        assert_eq!(map.load(int(1)), int(0));
    }

    #[test]
    fn loads_use_the_root_and_redundant_copies_vanish()
    {
        // v1 = v0; v2 = v1; v1 = v2 (redundant); return v2
        let mut ir = writer(vec![
            JvmInstruction::load(int(0)),
            JvmInstruction::store(int(1)),
            JvmInstruction::load(int(1)),
            JvmInstruction::store(int(2)),
            JvmInstruction::load(int(2)),
            JvmInstruction::store(int(1)),
            JvmInstruction::load(int(2)),
            JvmInstruction::other(IRETURN),
        ]);
        optimize(&mut ir);
        assert_eq!(
            flat(&ir),
            vec![
                JvmInstruction::load(int(0)),
                JvmInstruction::store(int(1)),
                JvmInstruction::load(int(0)),
                JvmInstruction::store(int(2)),
                JvmInstruction::load(int(0)),
                JvmInstruction::other(IRETURN),
            ]
        );
    }

    #[test]
    fn state_follows_a_lone_jump()
    {
        let mut ir = writer(vec![
            JvmInstruction::load(int(0)),
            JvmInstruction::store(int(1)),
            JvmInstruction::Jump(Jump::goto(7)),
            JvmInstruction::Label(Some(7)),
            JvmInstruction::load(int(1)),
            JvmInstruction::other(IRETURN),
        ]);
        let label = ir.flat[3];
        ir.labels.insert(7, label);
        ir.jump_targets.insert(label);
        ir.pred_counts.insert(label, 1);
        optimize(&mut ir);
        assert_eq!(flat(&ir)[4], JvmInstruction::load(int(0)));

        // a second predecessor forgets everything
        let mut ir = writer(vec![
            JvmInstruction::load(int(0)),
            JvmInstruction::store(int(1)),
            JvmInstruction::Jump(Jump::goto(7)),
            JvmInstruction::Label(Some(7)),
            JvmInstruction::load(int(1)),
            JvmInstruction::other(IRETURN),
        ]);
        let label = ir.flat[3];
        ir.labels.insert(7, label);
        ir.jump_targets.insert(label);
        ir.pred_counts.insert(label, 2);
        optimize(&mut ir);
        assert_eq!(flat(&ir)[4], JvmInstruction::load(int(1)));
    }
}
