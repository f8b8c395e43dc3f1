//! Instruction selection: one match arm per Dalvik opcode family.

use std::collections::HashMap;

use crate::dex::{ArrayData, DalvikInstruction, DalvikOpcode, DexMethod, RefResolver};
use crate::error::TranslateError;
use crate::jvm::array_ops;
use crate::jvm::ir_block::IrBlock;
use crate::jvm::math_ops;
use crate::jvm::op_u2;
use crate::jvm::ops::*;
use crate::typeinference::{ArrayType, Scalars};

const THROWABLE: &str = "java/lang/Throwable";

fn sign_extend(value: i32, bits: u32) -> i32
{
    let shift = 32 - bits;
    (value << shift) >> shift
}

/// True unless the instruction after `instr` picks up its result.
fn result_unused(by_pos: &HashMap<u32, &DalvikInstruction>, instr: &DalvikInstruction) -> bool
{
    by_pos.get(&instr.pos2).map_or(true, |next| next.kind != DalvikOpcode::MoveResult)
}

/// Appends the JVM translation of `instr` to `block`.
pub(crate) fn visit(
    dex: &dyn RefResolver,
    method: &DexMethod,
    by_pos: &HashMap<u32, &DalvikInstruction>,
    block: &mut IrBlock,
    instr: &DalvikInstruction,
) -> Result<(), TranslateError>
{
    use DalvikOpcode::*;
    match instr.kind
    {
        Nop => {}
        Move =>
        {
            let src = instr.reg(1)?;
            for st in [Scalars::INT, Scalars::OBJ, Scalars::FLOAT]
            {
                if block.type_data().prim(src).intersects(st)
                {
                    block.load(src, st, None)?;
                    block.store(instr.reg(0)?, st);
                }
            }
        }
        MoveWide =>
        {
            let src = instr.reg(1)?;
            for st in [Scalars::LONG, Scalars::DOUBLE]
            {
                if block.type_data().prim(src).intersects(st)
                {
                    block.load(src, st, None)?;
                    block.store(instr.reg(0)?, st);
                }
            }
        }
        MoveResult =>
        {
            let st = match &instr.prev_result
            {
                Some(desc) => Scalars::from_desc(desc),
                None => fail!("move-result at {} has no result type", instr.position),
            };
            block.store(instr.reg(0)?, st);
        }
        Return =>
        {
            let ret = &method.id.return_type;
            if ret == "V"
            {
                block.return_void();
            }
            else
            {
                let st = Scalars::from_desc(ret);
                block.load(instr.reg(0)?, st, Some(ret.as_str()))?;
                block.return_typed(st);
            }
        }
        Const32 =>
        {
            let reg = instr.reg(0)?;
            let value = instr.arg(1)?;
            block.const32(value, Scalars::INT)?;
            block.store(reg, Scalars::INT);
            block.const32(value, Scalars::FLOAT)?;
            block.store(reg, Scalars::FLOAT);
            if value == 0
            {
                block.const_null();
                block.store(reg, Scalars::OBJ);
            }
        }
        Const64 =>
        {
            let reg = instr.reg(0)?;
            block.const64(instr.wide, Scalars::LONG)?;
            block.store(reg, Scalars::LONG);
            block.const64(instr.wide, Scalars::DOUBLE)?;
            block.store(reg, Scalars::DOUBLE);
        }
        ConstString =>
        {
            let index = block.pool.string_ref(dex.string(instr.index(1)?)?)?;
            block.ldc(index);
            block.store(instr.reg(0)?, Scalars::OBJ);
        }
        ConstClass =>
        {
            let index = block.pool.class_ref(dex.class_type(instr.index(1)?)?)?;
            block.ldc(index);
            block.store(instr.reg(0)?, Scalars::OBJ);
        }
        MonitorEnter =>
        {
            block.load(instr.reg(0)?, Scalars::OBJ, None)?;
            block.other(MONITORENTER);
        }
        MonitorExit =>
        {
            block.load(instr.reg(0)?, Scalars::OBJ, None)?;
            block.other(MONITOREXIT);
        }
        CheckCast => block.cast(instr.reg(0)?, dex.class_type(instr.index(1)?)?)?,
        InstanceOf =>
        {
            block.load(instr.reg(1)?, Scalars::OBJ, None)?;
            block.class_op(INSTANCEOF, dex.class_type(instr.index(2)?)?)?;
            block.store(instr.reg(0)?, Scalars::INT);
        }
        ArrayLen =>
        {
            block.load_as_array(instr.reg(1)?)?;
            block.other(ARRAYLENGTH);
            block.store(instr.reg(0)?, Scalars::INT);
        }
        NewInstance =>
        {
            block.class_op(NEW, dex.class_type(instr.index(1)?)?)?;
            block.store(instr.reg(0)?, Scalars::OBJ);
        }
        NewArray =>
        {
            block.load(instr.reg(1)?, Scalars::INT, None)?;
            block.new_array(dex.type_desc(instr.index(2)?)?)?;
            block.store(instr.reg(0)?, Scalars::OBJ);
        }
        FilledNewArray => visit_filled_new_array(dex, by_pos, block, instr)?,
        FillArrayData => visit_fill_array_data(block, instr)?,
        Throw =>
        {
            block.load(instr.reg(0)?, Scalars::OBJ, Some(THROWABLE))?;
            block.other(ATHROW);
        }
        Goto => block.goto(instr.target(0)?),
        Switch =>
        {
            block.load(instr.reg(0)?, Scalars::INT, None)?;
            block.switch_case(instr.pos2, instr.switch_targets()?)?;
        }
        Cmp =>
        {
            let i = (instr.opcode - 0x2d) as usize;
            let op = [FCMPL, FCMPG, DCMPL, DCMPG, LCMP][i];
            let st = [Scalars::FLOAT, Scalars::FLOAT, Scalars::DOUBLE, Scalars::DOUBLE, Scalars::LONG][i];
            block.load(instr.reg(1)?, st, None)?;
            block.load(instr.reg(2)?, st, None)?;
            block.other(op);
            block.store(instr.reg(0)?, Scalars::INT);
        }
        If =>
        {
            let (a, b) = (instr.reg(0)?, instr.reg(1)?);
            let both = block.type_data().prim(a) & block.type_data().prim(b);
            let i = (instr.opcode - 0x32) as usize;
            let (op, st) = if both.contains(Scalars::INT)
            {
                ([IF_ICMPEQ, IF_ICMPNE, IF_ICMPLT, IF_ICMPGE, IF_ICMPGT, IF_ICMPLE][i], Scalars::INT)
            }
            else
            {
                match i
                {
                    0 => (IF_ACMPEQ, Scalars::OBJ),
                    1 => (IF_ACMPNE, Scalars::OBJ),
                    _ => fail!("Ordered comparison of references at {}", instr.position),
                }
            };
            block.load(a, st, None)?;
            block.load(b, st, None)?;
            block.if_cond(op, instr.target(2)?);
        }
        IfZ =>
        {
            let a = instr.reg(0)?;
            let i = (instr.opcode - 0x38) as usize;
            let (op, st) = if block.type_data().prim(a).contains(Scalars::INT)
            {
                ([IFEQ, IFNE, IFLT, IFGE, IFGT, IFLE][i], Scalars::INT)
            }
            else
            {
                match i
                {
                    0 => (IFNULL, Scalars::OBJ),
                    1 => (IFNONNULL, Scalars::OBJ),
                    _ => fail!("Ordered test of a reference at {}", instr.position),
                }
            };
            block.load(a, st, None)?;
            block.if_cond(op, instr.target(1)?);
        }
        ArrayGet =>
        {
            let array = instr.reg(1)?;
            let at = block.type_data().array(array).clone();
            if at == ArrayType::Null
            {
                block.const_null();
                block.other(ATHROW);
            }
            else
            {
                let (st, elet) = at.elet_pair()?;
                let op = elet.desc().and_then(array_ops::load_op).unwrap_or(AALOAD);
                block.load_as_array(array)?;
                block.load(instr.reg(2)?, Scalars::INT, None)?;
                block.other(op);
                block.store(instr.reg(0)?, st);
            }
        }
        ArrayPut =>
        {
            let array = instr.reg(1)?;
            let at = block.type_data().array(array).clone();
            if at == ArrayType::Null
            {
                block.const_null();
                block.other(ATHROW);
            }
            else
            {
                let (st, elet) = at.elet_pair()?;
                let op = elet.desc().and_then(array_ops::store_op).unwrap_or(AASTORE);
                block.load_as_array(array)?;
                block.load(instr.reg(2)?, Scalars::INT, None)?;
                block.load(instr.reg(0)?, st, elet.desc())?;
                block.other(op);
            }
        }
        InstanceGet =>
        {
            let field = dex.field_id(instr.index(2)?)?;
            let st = Scalars::from_desc(&field.descriptor);
            block.load(instr.reg(1)?, Scalars::OBJ, Some(field.class_name.as_str()))?;
            let index = block.pool.field_ref(field)?;
            block.other_bytes(op_u2(GETFIELD, index));
            block.store(instr.reg(0)?, st);
        }
        InstancePut =>
        {
            let field = dex.field_id(instr.index(2)?)?;
            let st = Scalars::from_desc(&field.descriptor);
            block.load(instr.reg(1)?, Scalars::OBJ, Some(field.class_name.as_str()))?;
            block.load(instr.reg(0)?, st, Some(field.descriptor.as_str()))?;
            let index = block.pool.field_ref(field)?;
            block.other_bytes(op_u2(PUTFIELD, index));
        }
        StaticGet =>
        {
            let field = dex.field_id(instr.index(1)?)?;
            let st = Scalars::from_desc(&field.descriptor);
            let index = block.pool.field_ref(field)?;
            block.other_bytes(op_u2(GETSTATIC, index));
            block.store(instr.reg(0)?, st);
        }
        StaticPut =>
        {
            let field = dex.field_id(instr.index(1)?)?;
            let st = Scalars::from_desc(&field.descriptor);
            block.load(instr.reg(0)?, st, Some(field.descriptor.as_str()))?;
            let index = block.pool.field_ref(field)?;
            block.other_bytes(op_u2(PUTSTATIC, index));
        }
        InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface =>
        {
            visit_invoke(dex, by_pos, block, instr)?
        }
        UnaryOp =>
        {
            let op = match math_ops::unary(instr.opcode)
            {
                Some(op) => op,
                None => fail!("Unknown unary opcode 0x{:02x}", instr.opcode),
            };
            block.load(instr.reg(1)?, op.src, None)?;
            // bitwise not is xor with -1
            if op.op == IXOR
            {
                block.other(ICONST_M1);
            }
            else if op.op == LXOR
            {
                block.other(ICONST_M1);
                block.other(I2L);
            }
            block.other(op.op);
            block.store(instr.reg(0)?, op.dest);
        }
        BinaryOp =>
        {
            let op = match math_ops::binary(instr.opcode)
            {
                Some(op) => op,
                None => fail!("Unknown binary opcode 0x{:02x}", instr.opcode),
            };
            let (a, b) = instr.binary_sources()?;
            block.load(a, op.st, None)?;
            block.load(b, op.st2, None)?;
            block.other(op.op);
            block.store(instr.reg(0)?, op.st);
        }
        BinaryOpConst =>
        {
            let op = match math_ops::binary_lit(instr.opcode)
            {
                Some(op) => op,
                None => fail!("Unknown literal opcode 0x{:02x}", instr.opcode),
            };
            let src = instr.reg(1)?;
            let literal = instr.arg(2)?;
            // rsub: literal minus register
            if op == ISUB
            {
                block.const32(literal, Scalars::INT)?;
                block.load(src, Scalars::INT, None)?;
            }
            else
            {
                block.load(src, Scalars::INT, None)?;
                block.const32(literal, Scalars::INT)?;
            }
            block.other(op);
            block.store(instr.reg(0)?, Scalars::INT);
        }
    }
    Ok(())
}

fn visit_filled_new_array(
    dex: &dyn RefResolver,
    by_pos: &HashMap<u32, &DalvikInstruction>,
    block: &mut IrBlock,
    instr: &DalvikInstruction,
) -> Result<(), TranslateError>
{
    let desc = dex.type_desc(instr.index(0)?)?;
    let registers = &instr.registers;
    block.const32(registers.len() as i32, Scalars::INT)?;
    block.new_array(desc)?;

    let (st, elet) = ArrayType::from_desc(desc).elet_pair()?;
    let op = elet.desc().and_then(array_ops::store_op).unwrap_or(AASTORE);
    let must_pop = result_unused(by_pos, instr);
    block.fill_array_sub(op, registers.len(), must_pop, |b, i| b.load(registers[i] as usize, st, None))
}

fn visit_fill_array_data(block: &mut IrBlock, instr: &DalvikInstruction) -> Result<(), TranslateError>
{
    let array = instr.reg(0)?;
    let data = instr.array_data()?;
    let at = block.type_data().array(array).clone();

    block.load_as_array(array)?;
    if at == ArrayType::Null
    {
        block.other(ATHROW);
        return Ok(());
    }
    if data.is_empty()
    {
        block.other(ARRAYLENGTH);
        block.other(POP);
        return Ok(());
    }

    let (st, elet) = at.elet_pair()?;
    let elet = elet.desc().unwrap_or("");
    let op = match array_ops::store_op(elet)
    {
        Some(op) => op,
        None => fail!("fill-array-data at {} into array of {}", instr.position, at),
    };
    match data
    {
        ArrayData::Narrow(values) =>
        {
            let bits = match elet
            {
                "B" | "Z" => 8,
                "S" => 16,
                _ => 32,
            };
            block.fill_array_sub(op, values.len(), true, |b, i| b.const32(sign_extend(values[i], bits), st))
        }
        ArrayData::Wide(values) => block.fill_array_sub(op, values.len(), true, |b, i| b.const64(values[i], st)),
    }
}

fn visit_invoke(
    dex: &dyn RefResolver,
    by_pos: &HashMap<u32, &DalvikInstruction>,
    block: &mut IrBlock,
    instr: &DalvikInstruction,
) -> Result<(), TranslateError>
{
    let is_static = instr.kind == DalvikOpcode::InvokeStatic;
    let called = dex.method_id(instr.index(0)?)?;
    let sts = Scalars::param_types(called, is_static);
    let descs = called.spaced_param_types(is_static);
    if instr.registers.len() != sts.len()
    {
        fail!(
            "Invoke of {}.{} at {} passes {} registers for {} slots",
            called.class_name,
            called.name,
            instr.position,
            instr.registers.len(),
            sts.len()
        );
    }

    for (i, st) in sts.iter().enumerate()
    {
        // upper halves of wide arguments
        if *st != Scalars::INVALID
        {
            block.load(instr.registers[i] as usize, *st, descs[i].as_deref())?;
        }
    }

    match instr.kind
    {
        DalvikOpcode::InvokeInterface =>
        {
            let index = block.pool.interface_method_ref(called)?;
            let mut bytes = op_u2(INVOKEINTERFACE, index);
            bytes.push(descs.len() as u8);
            bytes.push(0);
            block.other_bytes(bytes);
        }
        kind =>
        {
            let op = match kind
            {
                DalvikOpcode::InvokeVirtual => INVOKEVIRTUAL,
                DalvikOpcode::InvokeStatic => INVOKESTATIC,
                _ => INVOKESPECIAL,
            };
            let index = block.pool.method_ref(called)?;
            block.other_bytes(op_u2(op, index));
        }
    }

    if called.return_type != "V" && result_unused(by_pos, instr)
    {
        if Scalars::from_desc(&called.return_type).is_wide()
        {
            block.other(POP2);
        }
        else
        {
            block.other(POP);
        }
    }
    Ok(())
}
