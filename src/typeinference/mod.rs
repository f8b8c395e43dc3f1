//! Dataflow type inference over a Dalvik method body.
//!
//! Dalvik registers are untyped at rest: the same bit pattern may be read as an
//! int, a float or a null reference depending on the use. The JVM verifier needs
//! a single static type per local, so before selecting instructions we compute,
//! for every reachable instruction, which interpretations each register admits.

pub mod array_types;
pub mod scalars;
pub mod type_info;

pub use array_types::ArrayType;
pub use scalars::Scalars;
pub use type_info::TypeInfo;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use rangemap::RangeMap;

use crate::dex::dex_file::THROWABLE;
use crate::dex::{CatchHandler, CodeItem, DalvikInstruction, DalvikOpcode, DexMethod, RefResolver};
use crate::error::TranslateError;
use crate::jvm::math_ops;

pub struct InferenceResult
{
    /// Entry state of every reachable instruction, keyed by position.
    pub types: HashMap<u32, TypeInfo>,
    /// Handlers that can actually catch something thrown by the instruction at a position.
    pub handlers: BTreeMap<u32, Vec<CatchHandler>>,
}

/// Handlers guarding each instruction, in try order, restricted to
/// instructions that can throw.
pub fn collect_handlers(code: &CodeItem) -> BTreeMap<u32, Vec<CatchHandler>>
{
    let mut result = BTreeMap::new();
    if code.tries.is_empty()
    {
        return result;
    }

    let mut coverage: RangeMap<u32, usize> = RangeMap::new();
    for (i, t) in code.tries.iter().enumerate()
    {
        if t.start < t.end
        {
            coverage.insert(t.start..t.end, i);
        }
    }

    for instr in &code.instructions
    {
        if instr.position >= instr.pos2 || !throws(instr)
        {
            continue;
        }
        let mut tries: Vec<usize> = coverage.overlapping(&(instr.position..instr.pos2)).map(|(_, i)| *i).collect();
        tries.sort_unstable();
        tries.dedup();

        let mut seen = HashSet::new();
        let mut handlers = Vec::new();
        'tries: for t in tries
        {
            for handler in &code.tries[t].handlers
            {
                let name = handler.class_name();
                if seen.insert(name.to_string())
                {
                    handlers.push(handler.clone());
                }
                // nothing after a Throwable handler can be reached
                if name == THROWABLE
                {
                    break 'tries;
                }
            }
        }
        if !handlers.is_empty()
        {
            result.insert(instr.position, handlers);
        }
    }
    result
}

fn throws(instr: &DalvikInstruction) -> bool
{
    match instr.kind
    {
        DalvikOpcode::BinaryOp => math_ops::binary(instr.opcode).map_or(false, |b| math_ops::can_throw(b.op)),
        DalvikOpcode::BinaryOpConst => math_ops::binary_lit(instr.opcode).map_or(false, math_ops::can_throw),
        kind => kind.can_throw(),
    }
}

/// Register state after a data instruction, or `None` for instructions that
/// leave registers alone.
fn transfer(dex: &dyn RefResolver, instr: &DalvikInstruction, cur: &TypeInfo) -> Result<Option<TypeInfo>, TranslateError>
{
    use DalvikOpcode::*;
    let after = match instr.kind
    {
        ConstString | ConstClass | NewInstance => cur.assign_plain(instr.reg(0)?, Scalars::OBJ),
        InstanceOf | ArrayLen | Cmp | BinaryOpConst => cur.assign_plain(instr.reg(0)?, Scalars::INT),
        Move => cur.move_reg(instr.reg(1)?, instr.reg(0)?, false),
        MoveWide => cur.move_reg(instr.reg(1)?, instr.reg(0)?, true),
        MoveResult => match &instr.prev_result
        {
            Some(desc) => cur.assign_from_desc(instr.reg(0)?, desc),
            None => fail!("move-result at {} has no result type", instr.position),
        },
        Const32 =>
        {
            if instr.arg(1)? == 0
            {
                cur.assign(instr.reg(0)?, Scalars::ZERO, ArrayType::Null, false)
            }
            else
            {
                cur.assign_plain(instr.reg(0)?, Scalars::C32)
            }
        }
        Const64 => cur.assign2(instr.reg(0)?, Scalars::C64),
        CheckCast =>
        {
            let reg = instr.reg(0)?;
            let at = ArrayType::from_desc(dex.type_desc(instr.index(1)?)?);
            cur.assign(reg, Scalars::OBJ, ArrayType::narrow(cur.array(reg), &at), false)
        }
        NewArray =>
        {
            let at = ArrayType::from_desc(dex.type_desc(instr.index(2)?)?);
            cur.assign(instr.reg(0)?, Scalars::OBJ, at, false)
        }
        ArrayGet =>
        {
            let arr = cur.array(instr.reg(1)?);
            if *arr == ArrayType::Null
            {
                // unreachable at runtime; ALL merges with anything
                cur.assign(instr.reg(0)?, Scalars::ALL, ArrayType::Null, false)
            }
            else
            {
                let (st, elet) = arr.elet_pair()?;
                cur.assign(instr.reg(0)?, st, elet, false)
            }
        }
        InstanceGet => cur.assign_from_desc(instr.reg(0)?, &dex.field_id(instr.index(2)?)?.descriptor),
        StaticGet => cur.assign_from_desc(instr.reg(0)?, &dex.field_id(instr.index(1)?)?.descriptor),
        UnaryOp =>
        {
            let op = match math_ops::unary(instr.opcode)
            {
                Some(op) => op,
                None => fail!("Unknown unary opcode 0x{:02x}", instr.opcode),
            };
            if op.dest.is_wide() { cur.assign2(instr.reg(0)?, op.dest) } else { cur.assign_plain(instr.reg(0)?, op.dest) }
        }
        BinaryOp =>
        {
            let op = match math_ops::binary(instr.opcode)
            {
                Some(op) => op,
                None => fail!("Unknown binary opcode 0x{:02x}", instr.opcode),
            };
            if op.st.is_wide() { cur.assign2(instr.reg(0)?, op.st) } else { cur.assign_plain(instr.reg(0)?, op.st) }
        }
        _ => return Ok(None),
    };
    Ok(Some(after))
}

struct Worklist<'a>
{
    positions: &'a HashSet<u32>,
    types: HashMap<u32, TypeInfo>,
    dirty: BTreeSet<u32>,
}

impl<'a> Worklist<'a>
{
    fn merge_into(&mut self, pos: u32, state: &TypeInfo)
    {
        if !self.positions.contains(&pos)
        {
            return;
        }
        match self.types.get(&pos)
        {
            Some(old) =>
            {
                if let Some(merged) = old.merge(state)
                {
                    self.types.insert(pos, merged);
                    self.dirty.insert(pos);
                }
            }
            None =>
            {
                self.types.insert(pos, state.clone());
                self.dirty.insert(pos);
            }
        }
    }
}

/// Runs the fixpoint. The result covers exactly the reachable instructions.
pub fn infer(dex: &dyn RefResolver, method: &DexMethod, code: &CodeItem) -> Result<InferenceResult, TranslateError>
{
    let handlers = collect_handlers(code);
    let positions: HashSet<u32> = code.instructions.iter().map(|i| i.position).collect();
    if !positions.contains(&0)
    {
        fail!("Method body has no instruction at offset 0");
    }

    let mut work = Worklist { positions: &positions, types: HashMap::new(), dirty: BTreeSet::new() };
    work.types.insert(0, TypeInfo::from_params(method, code.registers as usize));
    work.dirty.insert(0);

    while !work.dirty.is_empty()
    {
        for instr in &code.instructions
        {
            if !work.dirty.remove(&instr.position)
            {
                continue;
            }
            let cur = match work.types.get(&instr.position)
            {
                Some(t) => t.clone(),
                None => continue,
            };

            let after = match transfer(dex, instr, &cur)?
            {
                Some(after) => after,
                None if instr.kind.is_control_flow() =>
                {
                    let mut after = cur.clone();
                    let mut after2 = cur.clone();
                    if let Some(casts) = &instr.implicit_casts
                    {
                        let cast_type = ArrayType::from_desc(dex.type_desc(casts.type_idx)?);
                        let mut result = cur.clone();
                        for reg in &casts.registers
                        {
                            let reg = *reg as usize;
                            // prims may still include INT when the value could be null
                            let at = ArrayType::narrow(cur.array(reg), &cast_type);
                            result = result.assign(reg, cur.prim(reg), at, true);
                        }
                        // if-nez narrows the taken branch, if-eqz the fallthrough
                        if instr.opcode == 0x39
                        {
                            after2 = result;
                        }
                        else
                        {
                            after = result;
                        }
                    }

                    match instr.kind
                    {
                        DalvikOpcode::Goto => work.merge_into(instr.target(0)?, &after2),
                        DalvikOpcode::If => work.merge_into(instr.target(2)?, &after2),
                        DalvikOpcode::IfZ => work.merge_into(instr.target(1)?, &after2),
                        _ =>
                        {
                            for target in instr.switch_targets()?.values()
                            {
                                work.merge_into(*target, &cur);
                            }
                        }
                    }
                    after
                }
                None => cur.clone(),
            };

            if !matches!(instr.kind, DalvikOpcode::Return | DalvikOpcode::Throw | DalvikOpcode::Goto)
            {
                work.merge_into(instr.pos2, &after);
            }

            if let Some(hs) = handlers.get(&instr.position)
            {
                for h in hs
                {
                    work.merge_into(h.target, &cur);
                }
            }
        }
    }

    Ok(InferenceResult { types: work.types, handlers })
}
