use std::collections::{HashMap, HashSet};

use crate::jvm::instructions::{InsnId, JvmInstruction, RegKey};
use crate::jvm::ir_writer::IrWriter;

/// Removes stores to registers that are never read anywhere in the method.
/// A store right after a side effect free push disappears together with it,
/// any other store becomes a pop.
pub fn optimize(ir: &mut IrWriter)
{
    let used: HashSet<RegKey> = ir.flat.iter().filter_map(|id| ir.insn(*id).as_load()).collect();

    let mut replace: HashMap<InsnId, Vec<InsnId>> = HashMap::new();
    let mut prev: Option<InsnId> = None;
    let flat = ir.flat.clone();
    for id in flat
    {
        if let Some(key) = ir.insn(id).as_store()
        {
            if !used.contains(&key)
            {
                match prev.filter(|p| is_removable(ir.insn(*p)))
                {
                    Some(p) =>
                    {
                        replace.insert(p, Vec::new());
                        replace.insert(id, Vec::new());
                    }
                    None =>
                    {
                        let pop = if key.is_wide() { JvmInstruction::pop2() } else { JvmInstruction::pop() };
                        let pop = ir.alloc(pop);
                        replace.insert(id, vec![pop]);
                    }
                }
            }
        }
        prev = Some(id);
    }

    ir.replace_instructions(&replace);
}

fn is_removable(insn: &JvmInstruction) -> bool
{
    insn.as_load().is_some() || insn.is_constant()
}
