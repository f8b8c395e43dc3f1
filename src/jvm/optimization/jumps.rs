//! Jump sizing. Every jump starts out short; any jump whose offset does not
//! fit 16 bits is widened and positions are recomputed until nothing changes.

use std::collections::HashMap;

use crate::jvm::instructions::{InsnId, JvmInstruction, Switch};
use crate::jvm::ir_writer::IrWriter;

/// Offset of every instruction assuming current minimum jump sizes,
/// and the total length.
pub fn calc_min_positions(ir: &IrWriter) -> (HashMap<InsnId, usize>, usize)
{
    let mut positions = HashMap::with_capacity(ir.flat.len());
    let mut pos = 0;
    for id in &ir.flat
    {
        positions.insert(*id, pos);
        pos += match ir.insn(*id)
        {
            JvmInstruction::Jump(j) => j.min,
            JvmInstruction::Switch(s) => Switch::padding(pos) + s.no_pad_size,
            other => other.bytecode().map_or(0, |b| b.len()),
        };
    }
    (positions, pos)
}

pub fn optimize(ir: &mut IrWriter)
{
    let jumps: Vec<InsnId> = ir.flat.iter().copied().filter(|id| matches!(ir.insn(*id), JvmInstruction::Jump(_))).collect();
    if jumps.is_empty()
    {
        return;
    }

    loop
    {
        let (positions, _) = calc_min_positions(ir);
        let mut done = true;
        for id in &jumps
        {
            let target = match ir.insn(*id)
            {
                JvmInstruction::Jump(j) if j.min < j.max => j.target,
                _ => continue,
            };
            let to = ir.labels.get(&target).and_then(|label| positions.get(label)).copied().unwrap_or(0) as i64;
            let from = positions.get(id).copied().unwrap_or(0) as i64;
            if let JvmInstruction::Jump(j) = &mut ir.arena[*id]
            {
                if j.widen_if_necessary(to - from)
                {
                    done = false;
                }
            }
        }
        if done
        {
            break;
        }
    }

    for id in &jumps
    {
        if let JvmInstruction::Jump(j) = &mut ir.arena[*id]
        {
            j.max = j.min;
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::jvm::instructions::Jump;
    use crate::jvm::ops::*;
    use crate::jvm::optimization::test_util::*;

    /// A body of `filler` bytes between a conditional jump and its target.
    fn jump_over(filler: usize) -> IrWriter
    {
        let mut ir = writer(vec![
            JvmInstruction::Jump(Jump::cond(IFEQ, 9)),
            JvmInstruction::Other(vec![NOP; filler]),
            JvmInstruction::Label(Some(9)),
            JvmInstruction::other(RETURN),
        ]);
        let label = ir.flat[2];
        ir.labels.insert(9, label);
        ir
    }

    fn jump(ir: &IrWriter) -> &Jump
    {
        match ir.insn(ir.flat[0])
        {
            JvmInstruction::Jump(j) => j,
            _ => unreachable!(),
        }
    }

    #[test]
    fn short_jumps_stay_short()
    {
        let mut ir = jump_over(32764);
        optimize(&mut ir);
        assert_eq!((jump(&ir).min, jump(&ir).max), (3, 3));
        assert_eq!(calc_min_positions(&ir).1, 3 + 32764 + 1);
    }

    #[test]
    fn far_jumps_widen_and_stay_resolved()
    {
        let mut ir = jump_over(32765);
        optimize(&mut ir);
        assert_eq!((jump(&ir).min, jump(&ir).max), (8, 8));
        let before = calc_min_positions(&ir);

        optimize(&mut ir);
        assert_eq!(calc_min_positions(&ir), before);
        assert_eq!(jump(&ir).max, 8);
    }

    #[test]
    fn widening_can_push_another_jump_out_of_range()
    {
        // the backwards goto only needs the long form once the forward branch grows
        let mut ir = writer(vec![
            JvmInstruction::Label(Some(0)),
            JvmInstruction::Jump(Jump::cond(IFEQ, 9)),
            JvmInstruction::Other(vec![NOP; 32762]),
            JvmInstruction::Jump(Jump::goto(0)),
            JvmInstruction::Other(vec![NOP; 3]),
            JvmInstruction::Label(Some(9)),
            JvmInstruction::other(RETURN),
        ]);
        let (start, end) = (ir.flat[0], ir.flat[5]);
        ir.labels.insert(0, start);
        ir.labels.insert(9, end);
        optimize(&mut ir);

        let sizes: Vec<usize> = [1, 3]
            .iter()
            .map(|i| match ir.insn(ir.flat[*i])
            {
                JvmInstruction::Jump(j) => j.max,
                _ => 0,
            })
            .collect();
        assert_eq!(sizes, vec![8, 5]);
    }

    #[test]
    fn switches_are_padded_by_position()
    {
        let jumps = [(0, 1)].into_iter().collect();
        let ir = writer(vec![
            JvmInstruction::other(ICONST_0),
            JvmInstruction::Switch(Switch::new(1, jumps).unwrap()),
            JvmInstruction::Label(Some(1)),
        ]);
        let (positions, end) = calc_min_positions(&ir);
        assert_eq!(positions[&ir.flat[1]], 1);
        // opcode at 1, operands from 4
        assert_eq!(end, 1 + 2 + 9 + 8);
    }
}
