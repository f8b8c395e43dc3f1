//! Replaces repeated reads of a narrow register with `dup`/`dup2`.
//!
//! Every Dalvik instruction starts with an empty stack, which shows up as a
//! `Label(Some(_))` in the flat list. A load right after such a label can
//! instead be served by a copy left on the stack by an earlier load of the
//! same register, as long as nothing branches or stores in between. At most
//! one value is kept on the stack at a time, duplicated up to four times.

use std::collections::HashMap;

use crate::jvm::instructions::{InsnId, JvmInstruction, RegKey};
use crate::jvm::ir_writer::IrWriter;

/// Flat indices at which one register is read in a straight line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UseRange
{
    uses: Vec<usize>,
}

impl UseRange
{
    fn start(&self) -> usize
    {
        self.uses[0]
    }

    fn end(&self) -> usize
    {
        self.uses[self.uses.len() - 1]
    }

    /// The parts outside `other` that are still worth keeping.
    fn subtract(&self, other: &UseRange) -> Vec<UseRange>
    {
        let (s, e) = (other.start(), other.end());
        let left: Vec<usize> = self.uses.iter().copied().filter(|i| *i < s).collect();
        let right: Vec<usize> = self.uses.iter().copied().filter(|i| *i > e).collect();
        [left, right].into_iter().filter(|u| u.len() >= 2).map(|uses| UseRange { uses }).collect()
    }

    fn sort_key(&self) -> usize
    {
        self.uses.len() * 1000 + self.uses[0]
    }
}

fn sort_ranges(ranges: &mut [UseRange])
{
    ranges.sort_by_key(|r| r.sort_key());
}

pub fn optimize(ir: &mut IrWriter)
{
    let mut ranges: Vec<UseRange> = Vec::new();
    let mut current: HashMap<RegKey, UseRange> = HashMap::new();
    let mut at_head = false;

    for (i, id) in ir.flat.iter().enumerate()
    {
        let insn = ir.insn(*id);
        if ir.is_jump_target(*id) || matches!(insn, JvmInstruction::Switch(_)) || matches!(insn, JvmInstruction::Jump(j) if j.op.is_some())
        {
            ranges.extend(current.drain().map(|(_, r)| r));
        }

        if let JvmInstruction::RegAccess(access) = insn
        {
            if !access.is_wide()
            {
                if access.store
                {
                    if let Some(range) = current.remove(&access.key)
                    {
                        ranges.push(range);
                    }
                }
                else if at_head
                {
                    current.entry(access.key).or_insert_with(|| UseRange { uses: Vec::new() }).uses.push(i);
                }
            }
        }

        at_head = matches!(insn, JvmInstruction::Label(Some(_)));
    }

    ranges.extend(current.into_values());
    ranges.retain(|r| r.uses.len() >= 2);
    sort_ranges(&mut ranges);

    // greedily pick disjoint ranges, most uses first
    let mut chosen = Vec::new();
    while let Some(best) = ranges.pop()
    {
        let mut rest: Vec<UseRange> = ranges.iter().flat_map(|r| r.subtract(&best)).collect();
        sort_ranges(&mut rest);
        ranges = rest;
        chosen.push(best);
    }

    let mut replace: HashMap<InsnId, Vec<InsnId>> = HashMap::new();
    for range in chosen
    {
        let gen = gen_dups(range.uses.len(), 0);
        for (pos, ops) in range.uses.iter().zip(gen)
        {
            let load = ir.flat[*pos];
            let mut ids = Vec::with_capacity(ops.len() + 1);
            if *pos == range.start()
            {
                ids.push(load);
            }
            ids.extend(ops.into_iter().map(|op| ir.alloc(op)));
            replace.insert(load, ids);
        }
    }

    ir.replace_instructions(&replace);
}

/// Stack operations that serve `needed` uses of the value on top of the
/// stack, keeping `after` extra copies for later. Returns one list per use
/// (to run right before it) and a final list of pops for surplus copies.
pub fn gen_dups(needed: usize, after: usize) -> Vec<Vec<JvmInstruction>>
{
    let count = needed;
    let mut needed = needed + after;
    let mut have = 1;
    let mut result = Vec::with_capacity(count + 1);

    for _ in 0..count
    {
        let mut cur = Vec::new();
        if have < needed
        {
            if have == 1 && needed >= 2
            {
                cur.push(JvmInstruction::dup());
                have += 1;
            }
            if have == 2 && needed >= 4
            {
                cur.push(JvmInstruction::dup2());
                have += 2;
            }
        }
        have -= 1;
        needed -= 1;
        result.push(cur);
    }
    debug_assert!(have >= needed);

    result.push((needed..have).map(|_| JvmInstruction::pop()).collect());
    result
}
