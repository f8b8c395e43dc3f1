//! Rewriting passes over a flattened method body, plus the layout steps
//! (register allocation, late constant allocation, jump sizing) that run
//! once the instruction list is final.
//!
//! The rewriting passes only reason about straight-line code. They collect a
//! map of instruction id to replacement ids and apply it in one go through
//! [`IrWriter::replace_instructions`].

pub mod consts;
pub mod copy_propagation;
pub mod dup2ize;
pub mod inline_consts;
pub mod jumps;
pub mod options;
pub mod registers;
pub mod store_load;
pub mod unused_regs;

pub use options::OptimizationOptions;

use log::trace;

use crate::jvm::instructions::{InsnId, JvmInstruction};
use crate::jvm::ir_writer::IrWriter;

/// Callbacks for [`visit_linear_code`]. Most passes only care about
/// `reset` and `visit`.
pub(crate) trait LinearVisitor
{
    fn reset(&mut self);

    fn visit_exception_range(&mut self)
    {
        self.reset();
    }

    fn visit_jump_target_or_branch(&mut self)
    {
        self.reset();
    }

    fn visit_return(&mut self) {}

    fn visit(&mut self, _id: InsnId, _insn: &JvmInstruction) {}
}

/// Walks `flat` outside of exception ranges, splitting it into straight-line spans.
pub(crate) fn visit_linear_code<V: LinearVisitor>(ir: &IrWriter, mut visitor: V) -> V
{
    let mut except_level: i32 = 0;
    for id in &ir.flat
    {
        if ir.except_starts.contains(id)
        {
            except_level += 1;
            visitor.visit_exception_range();
        }
        else if ir.except_ends.contains(id)
        {
            except_level -= 1;
        }

        if except_level > 0
        {
            continue;
        }

        let insn = ir.insn(*id);
        if ir.is_jump_target(*id) || matches!(insn, JvmInstruction::Jump(_) | JvmInstruction::Switch(_))
        {
            visitor.visit_jump_target_or_branch();
        }
        else if !insn.falls_through()
        {
            visitor.visit_return();
        }
        else
        {
            visitor.visit(*id, insn);
        }
    }
    debug_assert_eq!(except_level, 0);
    visitor
}

/// Runs the enabled rewriting passes in their fixed order.
/// Dup2ize relies on block heads starting with an empty stack, which
/// store/load pruning breaks, so it always goes first.
pub fn run_optimizations(ir: &mut IrWriter, options: &OptimizationOptions)
{
    if options.inline_consts
    {
        inline_consts::optimize(ir);
    }
    if options.copy_propagation
    {
        copy_propagation::optimize(ir);
    }
    if options.remove_unused_regs
    {
        unused_regs::optimize(ir);
    }
    if options.dup2ize
    {
        dup2ize::optimize(ir);
    }
    if options.prune_store_loads
    {
        store_load::optimize(ir);
        if options.remove_unused_regs
        {
            unused_regs::optimize(ir);
        }
    }
    trace!("[optimization] {} left with {} instructions", ir.name, ir.flat.len());
}

/// Picks the allocation strategy and gives every local access its bytecode.
pub fn allocate_registers(ir: &mut IrWriter, options: &OptimizationOptions)
{
    if options.sort_registers
    {
        registers::sorted_allocate(ir);
    }
    else
    {
        registers::simple_allocate(ir);
    }
}
