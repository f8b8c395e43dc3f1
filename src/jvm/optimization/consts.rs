//! Late constant pool allocation for methods too long to fit otherwise.
//!
//! With delayed constants every literal is first emitted in its computed
//! form. When a method is in danger of exceeding the code length limit, the
//! remaining pool space goes to the literals whose computed form costs the
//! most, counted over all such methods of the class.

use std::cmp::{min, Reverse};
use std::collections::HashMap;

use log::debug;

use crate::error::TranslateError;
use crate::jvm::constant_pool::{ConstantPool, PoolData};
use crate::jvm::instructions::{JvmInstruction, PrimConst};
use crate::jvm::ir_writer::IrWriter;

/// Ordering value used to break score ties.
fn tie_value(data: &PoolData) -> u64
{
    match data
    {
        PoolData::Int(v) => *v as i64 as u64,
        PoolData::Float(bits) => *bits as u64,
        PoolData::Long(v) => *v as u64,
        PoolData::Double(bits) => *bits,
        _ => 0,
    }
}

#[derive(Debug, Clone)]
struct Candidate
{
    data: PoolData,
    score: i64,
}

/// Sorted ascending by score, so the best candidate is last.
fn queue(counts: &HashMap<PoolData, i64>, alt_lens: &HashMap<PoolData, usize>) -> Vec<Candidate>
{
    let mut q: Vec<Candidate> = counts
        .iter()
        .map(|(data, count)| {
            let alt_len = alt_lens.get(data).copied().unwrap_or(0) as i64;
            Candidate { data: data.clone(), score: (alt_len - 3) * count }
        })
        .collect();
    q.sort_by_key(|c| (c.score, tie_value(&c.data)));
    q
}

pub fn allocate_required_constants<'a, I>(pool: &mut ConstantPool, long_irs: I) -> Result<(), TranslateError>
where
    I: IntoIterator<Item = &'a IrWriter>,
{
    let mut narrow: HashMap<PoolData, i64> = HashMap::new();
    let mut wide: HashMap<PoolData, i64> = HashMap::new();
    let mut alt_lens: HashMap<PoolData, usize> = HashMap::new();

    for ir in long_irs
    {
        for id in &ir.flat
        {
            if let JvmInstruction::PrimConst(c) = ir.insn(*id)
            {
                let key = PrimConst::pool_data(c.st, c.value);
                let len = c.bytecode.len();
                alt_lens.insert(key.clone(), len);
                if c.is_wide()
                {
                    if len > 3
                    {
                        *wide.entry(key).or_insert(0) += 1;
                    }
                }
                else if len > 2
                {
                    *narrow.entry(key).or_insert(0) += 1;
                }
            }
        }
    }

    narrow.retain(|data, _| !pool.contains(data));
    wide.retain(|data, _| !pool.contains(data));
    debug!("[consts] {} narrow and {} wide constants want pool slots", narrow.len(), wide.len());

    // with room for everything, the most used narrow constants get one byte indices
    if pool.space() >= narrow.len() + 2 * wide.len() && pool.low_space() > 0
    {
        let mut most_common: Vec<(PoolData, i64)> = narrow.iter().map(|(d, c)| (d.clone(), *c)).collect();
        most_common.sort_by_key(|(d, c)| (Reverse(*c), tie_value(d)));
        let n = min(pool.low_space(), most_common.len());
        for (data, _) in most_common.into_iter().take(n)
        {
            narrow.remove(&data);
            pool.insert_directly(data, true)?;
        }
    }

    let mut narrow_q = queue(&narrow, &alt_lens);
    let mut wide_q = queue(&wide, &alt_lens);

    while pool.space() >= 1 && (!narrow_q.is_empty() || !wide_q.is_empty())
    {
        if narrow_q.is_empty() && pool.space() < 2
        {
            break;
        }

        let w_score = wide_q.last().map_or(0, |c| c.score);
        let n_score: i64 = narrow_q.iter().rev().take(2).map(|c| c.score).sum();

        if pool.space() >= 2 && w_score > n_score && w_score > 0
        {
            if let Some(c) = wide_q.pop()
            {
                pool.insert_directly(c.data, false)?;
            }
        }
        else if n_score > 0
        {
            if let Some(c) = narrow_q.pop()
            {
                pool.insert_directly(c.data, true)?;
            }
        }
        else
        {
            break;
        }
    }
    Ok(())
}
