//! Builds the flat JVM instruction list for one method.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::dex::dex_file::THROWABLE;
use crate::dex::{CodeItem, DalvikInstruction, DalvikOpcode, DexMethod, RefResolver};
use crate::error::TranslateError;
use crate::jvm::constant_pool::ConstantPool;
use crate::jvm::instructions::{InsnArena, InsnId, JvmInstruction, Jump, RegKey};
use crate::jvm::ir_block::{generate_except_labels, IrBlock};
use crate::jvm::optimization::OptimizationOptions;
use crate::jvm::select;
use crate::typeinference::{self, Scalars};

/// One exception table row, still in terms of labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry
{
    pub start: InsnId,
    pub end: InsnId,
    pub target: InsnId,
    /// Pool index of the caught class, 0 to catch everything.
    pub class_ref: u16,
}

#[derive(Debug)]
pub struct IrWriter
{
    pub name: String,
    pub arena: InsnArena,
    pub flat: Vec<InsnId>,
    /// Block head label of each Dalvik position.
    pub labels: HashMap<u32, InsnId>,
    pub jump_targets: HashSet<InsnId>,
    pub pred_counts: HashMap<InsnId, u32>,
    pub except_starts: HashSet<InsnId>,
    pub except_ends: HashSet<InsnId>,
    pub excepts: Vec<ExceptionEntry>,
    /// Key of each parameter slot, `None` for upper halves of wide parameters.
    pub initial_args: Vec<Option<RegKey>>,
    pub registry_count: u16,
}

impl IrWriter
{
    pub fn new(name: &str) -> Self
    {
        IrWriter {
            name: name.to_string(),
            arena: InsnArena::new(),
            flat: Vec::new(),
            labels: HashMap::new(),
            jump_targets: HashSet::new(),
            pred_counts: HashMap::new(),
            except_starts: HashSet::new(),
            except_ends: HashSet::new(),
            excepts: Vec::new(),
            initial_args: Vec::new(),
            registry_count: 0,
        }
    }

    /// Runs type inference and instruction selection over `code` and
    /// flattens the result. Unreachable instructions produce nothing.
    pub fn write_bytecode(
        dex: &dyn RefResolver,
        method: &DexMethod,
        code: &CodeItem,
        pool: &mut ConstantPool,
        options: &OptimizationOptions,
    ) -> Result<IrWriter, TranslateError>
    {
        let by_pos: HashMap<u32, &DalvikInstruction> = code.instructions.iter().map(|i| (i.position, i)).collect();
        let inference = typeinference::infer(dex, method, code)?;
        let types = &inference.types;

        let mut writer = IrWriter::new(&method.id.name);
        writer.calc_initial_args(code.registers as usize, &Scalars::param_types(&method.id, method.is_static()));

        let mut blocks: BTreeMap<u32, Vec<InsnId>> = BTreeMap::new();
        for instr in &code.instructions
        {
            let type_data = match types.get(&instr.position)
            {
                Some(t) => t,
                None => continue,
            };
            let mut block = IrBlock::new(instr.position, pool, &mut writer.arena, type_data, options.delay_consts);
            select::visit(dex, method, &by_pos, &mut block, instr)
                .map_err(|e| err!(e, "instruction 0x{:02x} at {}", instr.opcode, instr.position))?;
            let ids = block.into_instructions();
            writer.labels.insert(instr.position, ids[0]);
            blocks.insert(instr.position, ids);
        }

        let mut redirects: BTreeMap<u32, InsnId> = BTreeMap::new();
        for (pos, handlers) in &inference.handlers
        {
            let block = match blocks.get_mut(pos)
            {
                Some(block) => block,
                None => continue,
            };
            let (start, end) = match generate_except_labels(&mut writer.arena, block)
            {
                Some(labels) => labels,
                None => continue,
            };
            writer.except_starts.insert(start);
            writer.except_ends.insert(end);

            for handler in handlers
            {
                let uses_exception = by_pos.get(&handler.target).map_or(false, |i| i.kind == DalvikOpcode::MoveResult);
                // handlers ignoring the exception are entered through a pop
                let target = if uses_exception
                {
                    match writer.labels.get(&handler.target)
                    {
                        Some(label) => *label,
                        None => fail!("Handler at {} is unreachable", handler.target),
                    }
                }
                else
                {
                    let arena = &mut writer.arena;
                    *redirects.entry(handler.target).or_insert_with(|| arena.alloc(JvmInstruction::Label(None)))
                };
                writer.add_target(target);

                let name = handler.class_name();
                let class_ref = if name == THROWABLE { 0 } else { pool.class_ref(name)? };
                writer.excepts.push(ExceptionEntry { start, end, target, class_ref });
            }
        }

        writer.flatten(blocks, redirects);

        let mut targets = Vec::new();
        for id in &writer.flat
        {
            for t in writer.arena[*id].targets()
            {
                match writer.labels.get(&t)
                {
                    Some(label) => targets.push(*label),
                    None => fail!("Jump to {} in {} has no target instruction", t, writer.name),
                }
            }
        }
        for label in targets
        {
            writer.add_target(label);
        }

        Ok(writer)
    }

    fn calc_initial_args(&mut self, registers: usize, sts: &[Scalars])
    {
        let offset = registers.saturating_sub(sts.len());
        self.initial_args = sts
            .iter()
            .enumerate()
            .map(|(i, st)| if *st == Scalars::INVALID { None } else { Some(RegKey::new(i + offset, *st)) })
            .collect();
    }

    fn add_target(&mut self, label: InsnId)
    {
        self.jump_targets.insert(label);
        *self.pred_counts.entry(label).or_insert(0) += 1;
    }

    /// Concatenates blocks in position order. Exception redirects (a label
    /// and a pop) are placed right before their handler when nothing falls
    /// into it, otherwise at the end followed by a goto.
    fn flatten(&mut self, blocks: BTreeMap<u32, Vec<InsnId>>, mut redirects: BTreeMap<u32, InsnId>)
    {
        let size = blocks.values().map(|b| b.len()).sum::<usize>() + 3 * redirects.len();
        let mut flat = Vec::with_capacity(size);
        for (pos, block) in blocks
        {
            if redirects.contains_key(&pos)
            {
                let falls_through = flat.last().map_or(true, |id: &InsnId| self.arena[*id].falls_through());
                if !falls_through
                {
                    if let Some(label) = redirects.remove(&pos)
                    {
                        flat.push(label);
                        flat.push(self.arena.alloc(JvmInstruction::pop()));
                    }
                }
            }
            flat.extend(block);
        }

        for (pos, label) in redirects
        {
            flat.push(label);
            flat.push(self.arena.alloc(JvmInstruction::pop()));
            flat.push(self.arena.alloc(JvmInstruction::Jump(Jump::goto(pos))));
        }
        self.flat = flat;
    }

    /// Rewrites `flat`, splicing each replaced instruction's list in its place.
    pub fn replace_instructions(&mut self, replace: &HashMap<InsnId, Vec<InsnId>>)
    {
        if replace.is_empty()
        {
            return;
        }
        let mut flat = Vec::with_capacity(self.flat.len());
        for id in &self.flat
        {
            match replace.get(id)
            {
                Some(replacement) => flat.extend_from_slice(replacement),
                None => flat.push(*id),
            }
        }
        self.flat = flat;
    }

    pub fn is_jump_target(&self, id: InsnId) -> bool
    {
        self.jump_targets.contains(&id)
    }

    pub fn pred_count(&self, id: InsnId) -> u32
    {
        self.pred_counts.get(&id).copied().unwrap_or(0)
    }

    /// Largest possible code length before jumps are sized.
    pub fn calc_upper_bound(&self) -> usize
    {
        self.flat.iter().map(|id| self.arena[*id].max_len()).sum()
    }

    pub fn insn(&self, id: InsnId) -> &JvmInstruction
    {
        &self.arena[id]
    }

    pub fn alloc(&mut self, insn: JvmInstruction) -> InsnId
    {
        self.arena.alloc(insn)
    }
}
