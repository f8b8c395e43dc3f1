//! Turns finished instruction lists into `Code` attribute bodies.

use log::{debug, warn};

use crate::error::TranslateError;
use crate::jvm::constant_pool::ConstantPool;
use crate::jvm::instructions::JvmInstruction;
use crate::jvm::ir_writer::IrWriter;
use crate::jvm::optimization::{consts, jumps, OptimizationOptions};
use crate::jvm::{write_u2, write_u4, write_x};

pub const CODE: &str = "Code";

/// Maximum operand stack depth written for every method.
const MAX_STACK: u16 = 300;
const MAX_CODE_LENGTH: usize = 65535;

/// Finalizes constants across all methods of a class, then assembles each
/// method. Returns one `Code` attribute body per entry of `irs`, in order.
pub fn finish_code_attrs(
    pool: &mut ConstantPool,
    irs: &mut [IrWriter],
    options: &OptimizationOptions,
) -> Result<Vec<Vec<u8>>, TranslateError>
{
    if !irs.is_empty()
    {
        pool.utf8_ref(CODE)?;
    }

    if options.delay_consts
    {
        let long_irs: Vec<&IrWriter> = irs.iter().filter(|ir| ir.calc_upper_bound() >= 65536).collect();
        if !long_irs.is_empty()
        {
            consts::allocate_required_constants(pool, long_irs)?;
        }

        // whatever room is left goes to constants of the shorter methods
        for ir in irs.iter_mut()
        {
            for id in ir.flat.clone()
            {
                if let JvmInstruction::PrimConst(c) = &mut ir.arena[id]
                {
                    c.fix_with_pool(pool)?;
                }
            }
        }
    }

    let mut attrs = Vec::with_capacity(irs.len());
    for ir in irs.iter_mut()
    {
        let attr = write_code_attribute_tail(ir, options).map_err(|e| err!(e, "method {}", ir.name))?;
        attrs.push(attr);
    }
    Ok(attrs)
}

fn write_code_attribute_tail(ir: &mut IrWriter, options: &OptimizationOptions) -> Result<Vec<u8>, TranslateError>
{
    jumps::optimize(ir);
    let (code, excepts) = create_bytecode(ir, options)?;

    let mut out = Vec::with_capacity(code.len() + 12 + 8 * excepts.len());
    write_u2(&mut out, MAX_STACK);
    write_u2(&mut out, ir.registry_count);
    write_u4(&mut out, code.len() as u32);
    write_x(&mut out, &code);
    write_u2(&mut out, excepts.len() as u16);
    for entry in &excepts
    {
        for v in entry
        {
            write_u2(&mut out, *v);
        }
    }
    // no attributes
    write_u2(&mut out, 0);

    debug!(
        "[assembler] {}: {} instructions, {} locals, {} bytes of code, {} handlers",
        ir.name,
        ir.flat.len(),
        ir.registry_count,
        code.len(),
        excepts.len()
    );
    Ok(out)
}

/// Final bytes of the method body and its packed exception table.
fn create_bytecode(ir: &mut IrWriter, options: &OptimizationOptions) -> Result<(Vec<u8>, Vec<[u16; 4]>), TranslateError>
{
    let (positions, end) = jumps::calc_min_positions(ir);
    let label_pos = |target: u32| -> Result<usize, TranslateError> {
        match ir.labels.get(&target).and_then(|label| positions.get(label))
        {
            Some(pos) => Ok(*pos),
            None => fail!("No position for jump target {}", target),
        }
    };

    // sizes are settled, so every offset can be computed up front
    let mut offsets: Vec<(usize, Vec<(u32, i32)>)> = Vec::new();
    for (i, id) in ir.flat.iter().enumerate()
    {
        let pos = positions[id];
        let targets = ir.insn(*id).targets();
        if !targets.is_empty()
        {
            let mut resolved = Vec::with_capacity(targets.len());
            for t in targets
            {
                resolved.push((t, label_pos(t)? as i32 - pos as i32));
            }
            offsets.push((i, resolved));
        }
    }

    for (i, resolved) in offsets
    {
        let id = ir.flat[i];
        let pos = positions[&id];
        match &mut ir.arena[id]
        {
            JvmInstruction::Jump(j) => j.calculate_bytecode(resolved[0].1)?,
            JvmInstruction::Switch(s) => s.calculate_bytecode(pos, |t| match resolved.iter().find(|(target, _)| *target == t)
            {
                Some((_, offset)) => Ok(*offset),
                None => Err(err!("Switch target {} was not resolved", t)),
            })?,
            _ => {}
        }
    }

    let mut code = Vec::with_capacity(end);
    for id in &ir.flat
    {
        match ir.insn(*id).bytecode()
        {
            Some(bytes) => code.extend_from_slice(bytes),
            None => fail!("Instruction {:?} has no bytecode", ir.insn(*id)),
        }
    }
    debug_assert_eq!(code.len(), end);

    if code.len() > MAX_CODE_LENGTH && !options.is_all()
    {
        limit!("Code of {} is {} bytes long", ir.name, code.len());
    }

    let mut excepts = Vec::with_capacity(ir.excepts.len());
    for entry in &ir.excepts
    {
        // the range opens at the instruction right before the start label
        let start_at = ir.flat.iter().position(|id| *id == entry.start);
        let s = match start_at
        {
            Some(i) if i > 0 => positions[&ir.flat[i - 1]],
            _ => positions.get(&entry.start).copied().unwrap_or(0),
        };
        let e = positions.get(&entry.end).copied().unwrap_or(0);
        let h = positions.get(&entry.target).copied().unwrap_or(0);
        if s < e
        {
            match (u16::try_from(s), u16::try_from(e), u16::try_from(h))
            {
                (Ok(s), Ok(e), Ok(h)) => excepts.push([s, e, h, entry.class_ref]),
                _ => limit!("Exception range of {} reaches past offset 65535", ir.name),
            }
        }
        else
        {
            warn!("[assembler] Skipping zero width exception in {}", ir.name);
        }
    }

    Ok((code, excepts))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::jvm::instructions::{InsnId, Jump, RegKey};
    use crate::jvm::constant_pool::PoolData;
    use crate::jvm::ir_writer::ExceptionEntry;
    use crate::jvm::ops::*;
    use crate::jvm::optimization::registers;
    use crate::jvm::optimization::test_util::*;
    use crate::typeinference::Scalars;

    #[test]
    fn empty_void_method()
    {
        let mut pool = ConstantPool::simple();
        let mut irs = vec![writer(vec![JvmInstruction::Label(Some(0)), JvmInstruction::other(RETURN)])];
        let attrs = finish_code_attrs(&mut pool, &mut irs, &OptimizationOptions::PRETTY).unwrap();
        assert_eq!(attrs[0], vec![1, 44, 0, 0, 0, 0, 0, 1, RETURN, 0, 0, 0, 0]);
        assert_eq!(pool.get_entry(1), Some(&PoolData::Utf8(b"Code".to_vec())));
    }

    #[test]
    fn loops_jump_backwards()
    {
        let k = RegKey::new(0, Scalars::INT);
        let mut ir = writer(vec![
            JvmInstruction::Label(Some(0)),
            JvmInstruction::load(k),
            JvmInstruction::Jump(Jump::cond(IFEQ, 0)),
            JvmInstruction::other(RETURN),
        ]);
        let head = ir.flat[0];
        ir.labels.insert(0, head);
        registers::simple_allocate(&mut ir);
        let mut pool = ConstantPool::simple();
        let attrs = finish_code_attrs(&mut pool, std::slice::from_mut(&mut ir), &OptimizationOptions::NONE).unwrap();
        assert_eq!(&attrs[0][8..13], &[ILOAD_0, IFEQ, 0xff, 0xff, RETURN]);
    }

    fn guarded(body: Vec<JvmInstruction>, start: usize, end: usize) -> IrWriter
    {
        let mut ir = writer(body);
        let target = ir.alloc(JvmInstruction::Label(None));
        let throw = ir.alloc(JvmInstruction::other(ATHROW));
        ir.flat.extend([target, throw]);
        let (start, end): (InsnId, InsnId) = (ir.flat[start], ir.flat[end]);
        ir.excepts.push(ExceptionEntry { start, end, target, class_ref: 0 });
        ir
    }

    #[test]
    fn exception_ranges_are_packed()
    {
        let mut ir = guarded(
            vec![
                JvmInstruction::Label(Some(0)),
                JvmInstruction::Label(None),
                JvmInstruction::other(ACONST_NULL),
                JvmInstruction::other(ATHROW),
                JvmInstruction::Label(None),
            ],
            1,
            4,
        );
        let mut pool = ConstantPool::simple();
        let attrs = finish_code_attrs(&mut pool, std::slice::from_mut(&mut ir), &OptimizationOptions::NONE).unwrap();
        let code = &attrs[0];
        assert_eq!(&code[4..8], &[0, 0, 0, 3]);
        // count, then start 0, end 2, handler 2, catch all
        assert_eq!(&code[11..21], &[0, 1, 0, 0, 0, 2, 0, 2, 0, 0]);
    }

    #[test]
    fn zero_width_ranges_are_dropped()
    {
        let mut ir = guarded(
            vec![JvmInstruction::Label(Some(0)), JvmInstruction::Label(None), JvmInstruction::Label(None)],
            1,
            2,
        );
        let mut pool = ConstantPool::simple();
        let attrs = finish_code_attrs(&mut pool, std::slice::from_mut(&mut ir), &OptimizationOptions::NONE).unwrap();
        // code is a lone athrow, followed by an empty table
        assert_eq!(&attrs[0][4..11], &[0, 0, 0, 1, ATHROW, 0, 0]);
    }

    #[test]
    fn overlong_code_is_a_limit_error()
    {
        let mut irs = vec![writer(vec![JvmInstruction::Other(vec![NOP; 65536]), JvmInstruction::other(RETURN)])];
        let mut pool = ConstantPool::simple();
        let err = finish_code_attrs(&mut pool, &mut irs, &OptimizationOptions::PRETTY).unwrap_err();
        assert!(err.is_limit_exceeded());

        let mut pool = ConstantPool::split();
        assert!(finish_code_attrs(&mut pool, &mut irs, &OptimizationOptions::ALL).is_ok());
    }

    #[test]
    fn handler_past_the_offset_range_is_a_limit_error()
    {
        let mut ir = guarded(
            vec![
                JvmInstruction::Label(Some(0)),
                JvmInstruction::Label(None),
                JvmInstruction::other(ACONST_NULL),
                JvmInstruction::other(ATHROW),
                JvmInstruction::Label(None),
                JvmInstruction::Other(vec![NOP; 65536]),
            ],
            1,
            4,
        );
        let mut pool = ConstantPool::split();
        let err = finish_code_attrs(&mut pool, std::slice::from_mut(&mut ir), &OptimizationOptions::ALL).unwrap_err();
        assert!(err.is_limit_exceeded());
    }
}
