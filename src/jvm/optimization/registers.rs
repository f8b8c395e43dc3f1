//! Maps register keys to JVM local slots.
//!
//! Parameters always keep their incoming slots. Wide keys take two slots,
//! the upper one is never addressed on its own.

use std::cmp::{max, min, Reverse};
use std::collections::HashMap;

use crate::jvm::instructions::{JvmInstruction, RegAccess, RegKey};
use crate::jvm::ir_writer::IrWriter;

fn slot_count(n: usize) -> u16
{
    u16::try_from(n).unwrap_or(u16::MAX)
}

/// First come, first served.
pub fn simple_allocate(ir: &mut IrWriter)
{
    let mut slots: HashMap<RegKey, u16> = HashMap::new();
    for (i, key) in ir.initial_args.iter().enumerate()
    {
        if let Some(key) = key
        {
            slots.insert(*key, i as u16);
        }
    }

    let mut next = ir.initial_args.len();
    let flat = ir.flat.clone();
    for id in flat
    {
        if let JvmInstruction::RegAccess(access) = &mut ir.arena[id]
        {
            let slot = *slots.entry(access.key).or_insert_with(|| {
                let slot = next as u16;
                next += if access.key.is_wide() { 2 } else { 1 };
                slot
            });
            access.calculate_bytecode(slot);
        }
    }
    ir.registry_count = slot_count(next);
}

/// Most used keys get the lowest free slots. If the hottest key left outside
/// the one byte `xload_<n>` range is used much more than a parameter inside
/// it, the two trade places and the parameter is copied over on entry.
pub fn sorted_allocate(ir: &mut IrWriter)
{
    let mut use_counts: HashMap<RegKey, usize> = HashMap::new();
    for id in &ir.flat
    {
        if let JvmInstruction::RegAccess(access) = ir.insn(*id)
        {
            *use_counts.entry(access.key).or_insert(0) += 1;
        }
    }
    let uses = |key: &RegKey| use_counts.get(key).copied().unwrap_or(0);

    let mut rest: Vec<RegKey> = use_counts.keys().copied().collect();
    rest.sort_by_key(|k| (Reverse(uses(k)), k.reg, k.st.bits()));

    let args = ir.initial_args.clone();
    let mut regs = args.clone();
    for key in rest
    {
        if !args.contains(&Some(key))
        {
            regs.push(Some(key));
            if key.is_wide()
            {
                regs.push(None);
            }
        }
    }

    let candidate_index = max(4, args.len());
    if let Some(Some(candidate)) = regs.get(candidate_index).copied()
    {
        if !candidate.is_wide() && uses(&candidate) >= 3
        {
            for i in 0..min(4, args.len())
            {
                let target = match (regs[i], regs[i + 1])
                {
                    (Some(target), Some(_)) => target,
                    _ => continue,
                };
                if uses(&candidate) > uses(&target) + 3
                {
                    regs.swap(i, candidate_index);
                    let mut load = RegAccess::new(target, false);
                    load.bytecode = Some(RegAccess::encode(i as u16, target.st, false));
                    let load = ir.alloc(JvmInstruction::RegAccess(load));
                    let store = ir.alloc(JvmInstruction::store(target));
                    ir.flat.insert(0, store);
                    ir.flat.insert(0, load);
                    break;
                }
            }
        }
    }

    ir.registry_count = slot_count(regs.len());
    let slots: HashMap<RegKey, u16> = regs
        .iter()
        .enumerate()
        .filter_map(|(i, key)| key.map(|k| (k, i as u16)))
        .collect();

    let flat = ir.flat.clone();
    for id in flat
    {
        if let JvmInstruction::RegAccess(access) = &mut ir.arena[id]
        {
            if access.bytecode.is_none()
            {
                if let Some(slot) = slots.get(&access.key)
                {
                    access.calculate_bytecode(*slot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashSet;

    use super::*;
    use crate::jvm::ops::*;
    use crate::jvm::optimization::test_util::*;
    use crate::typeinference::Scalars;

    fn bytes(ir: &IrWriter) -> Vec<Vec<u8>>
    {
        ir.flat.iter().filter_map(|id| ir.insn(*id).bytecode().map(|b| b.to_vec())).collect()
    }

    #[test]
    fn simple_assigns_in_encounter_order()
    {
        let p = RegKey::new(3, Scalars::INT);
        let w = RegKey::new(0, Scalars::LONG);
        let n = RegKey::new(1, Scalars::OBJ);
        let mut ir = writer(vec![
            JvmInstruction::load(w),
            JvmInstruction::load(n),
            JvmInstruction::load(p),
            JvmInstruction::store(RegKey::new(0, Scalars::INT)),
        ]);
        ir.initial_args = vec![Some(p)];
        simple_allocate(&mut ir);
        assert_eq!(ir.registry_count, 5);
        // lload_1, aload_3, iload_0, istore 4
        assert_eq!(bytes(&ir), vec![vec![0x1f], vec![ALOAD_0 + 3], vec![ILOAD_0], vec![ISTORE, 4]]);
    }

    #[test]
    fn sorted_gives_hot_registers_low_slots()
    {
        let cold = RegKey::new(0, Scalars::INT);
        let hot = RegKey::new(1, Scalars::INT);
        let mut insns = vec![JvmInstruction::load(cold)];
        insns.extend((0..3).map(|_| JvmInstruction::load(hot)));
        let mut ir = writer(insns);
        sorted_allocate(&mut ir);
        assert_eq!(ir.registry_count, 2);
        assert_eq!(bytes(&ir)[0], vec![ILOAD_0 + 1]);
        assert_eq!(bytes(&ir)[1], vec![ILOAD_0]);
    }

    #[test]
    fn hot_local_displaces_a_cold_parameter()
    {
        let args: Vec<RegKey> = (10..15).map(|r| RegKey::new(r, Scalars::INT)).collect();
        let hot = RegKey::new(0, Scalars::INT);
        let mut insns: Vec<JvmInstruction> = args.iter().map(|k| JvmInstruction::load(*k)).collect();
        insns.extend((0..10).map(|_| JvmInstruction::load(hot)));
        let mut ir = writer(insns);
        ir.initial_args = args.iter().copied().map(Some).collect();
        sorted_allocate(&mut ir);

        assert_eq!(ir.registry_count, 6);
        // parameter 0 is copied from slot 0 to its new home in slot 5
        assert_eq!(bytes(&ir)[0], vec![ILOAD_0]);
        assert_eq!(bytes(&ir)[1], vec![ISTORE, 5]);
        assert_eq!(bytes(&ir)[2], vec![ILOAD, 5]);
        assert_eq!(*bytes(&ir).last().unwrap(), vec![ILOAD_0]);

        // every key still has exactly one slot
        let distinct: HashSet<Vec<u8>> = bytes(&ir)[2..].iter().cloned().collect();
        assert_eq!(distinct.len(), 6);
    }
}
