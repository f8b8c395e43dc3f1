//! Precomputed shortest known bytecode for small numeric constants.
//!
//! Built once on first use. Each table maps a value (raw bits for floating
//! point) to the shortest instruction sequence found that pushes it.

use std::collections::HashMap;
use std::hash::Hash;

use once_cell::sync::Lazy;

use crate::jvm::ops::*;

pub const FLOAT_SIGN: u32 = 1 << 31;
pub const FLOAT_NAN: u32 = 0xFFFF_FFFF;
pub const FLOAT_INF: u32 = 0xFF << 23;
pub const FLOAT_NINF: u32 = FLOAT_INF ^ FLOAT_SIGN;

pub const DOUBLE_SIGN: u64 = 1 << 63;
pub const DOUBLE_NAN: u64 = 0xFFFF_FFFF_FFFF_FFFF;
pub const DOUBLE_INF: u64 = 0x7FF << 52;
pub const DOUBLE_NINF: u64 = DOUBLE_INF ^ DOUBLE_SIGN;

pub struct LookupTables
{
    pub ints: HashMap<i32, Vec<u8>>,
    pub floats: HashMap<u32, Vec<u8>>,
    pub longs: HashMap<i64, Vec<u8>>,
    pub doubles: HashMap<u64, Vec<u8>>,
}

pub static TABLES: Lazy<LookupTables> = Lazy::new(generate);

fn add<K: Hash + Eq>(table: &mut HashMap<K, Vec<u8>>, key: K, value: Vec<u8>)
{
    let shorter = match table.get(&key)
    {
        Some(old) => value.len() < old.len(),
        None => true,
    };
    if shorter
    {
        table.insert(key, value);
    }
}

fn cat(a: &[u8], b: &[u8]) -> Vec<u8>
{
    let mut v = Vec::with_capacity(a.len() + b.len());
    v.extend_from_slice(a);
    v.extend_from_slice(b);
    v
}

fn sorted_keys_of_len(table: &HashMap<i32, Vec<u8>>, len: usize) -> Vec<i32>
{
    let mut keys: Vec<i32> = table.iter().filter(|(_, v)| v.len() == len).map(|(k, _)| *k).collect();
    keys.sort_unstable();
    keys
}

fn generate() -> LookupTables
{
    let mut ints: HashMap<i32, Vec<u8>> = HashMap::with_capacity(65600);

    // 1 byte
    for i in -1..=5
    {
        add(&mut ints, i, vec![(ICONST_0 as i32 + i) as u8]);
    }
    let int1s = sorted_keys_of_len(&ints, 1);

    // 2 bytes
    for i in -128..=127
    {
        add(&mut ints, i, vec![BIPUSH, i as u8]);
    }
    for i in &int1s
    {
        let v = cat(&ints[i], &[I2C]);
        add(&mut ints, i.rem_euclid(65536), v);
    }
    let int2s = sorted_keys_of_len(&ints, 2);

    // 3 bytes
    for i in -32768..=32767
    {
        let mut v = vec![SIPUSH];
        v.extend_from_slice(&(i as i16).to_be_bytes());
        add(&mut ints, i, v);
    }
    for i in &int2s
    {
        let bytes = ints[i].clone();
        add(&mut ints, i.rem_euclid(65536), cat(&bytes, &[I2C]));
        add(&mut ints, -i, cat(&bytes, &[INEG]));
    }
    for x in &int1s
    {
        for y in &int1s
        {
            let shift = y.rem_euclid(32) as u32;
            let prefix = cat(&ints[x], &ints[y]);
            add(&mut ints, x.wrapping_shl(shift), cat(&prefix, &[ISHL]));
            add(&mut ints, x.wrapping_shr(shift), cat(&prefix, &[ISHR]));
            add(&mut ints, (*x as u32).wrapping_shr(shift) as i32, cat(&prefix, &[IUSHR]));
        }
    }

    let small: Vec<i32> = int1s.iter().chain(int2s.iter()).copied().collect();

    let mut longs = HashMap::with_capacity(256);
    add(&mut longs, 0i64, vec![LCONST_0]);
    add(&mut longs, 1i64, vec![LCONST_1]);
    for i in &small
    {
        add(&mut longs, *i as i64, cat(&ints[i], &[I2L]));
    }

    let mut floats = HashMap::with_capacity(272);
    add(&mut floats, 0f32.to_bits(), vec![FCONST_0]);
    add(&mut floats, 1f32.to_bits(), vec![FCONST_1]);
    for i in &small
    {
        add(&mut floats, (*i as f32).to_bits(), cat(&ints[i], &[I2F]));
    }
    add(&mut floats, FLOAT_SIGN, vec![FCONST_0, FNEG]);
    add(&mut floats, FLOAT_NAN, vec![FCONST_0, FCONST_0, FDIV]);
    add(&mut floats, FLOAT_INF, vec![FCONST_1, FCONST_0, FDIV]);
    add(&mut floats, FLOAT_NINF, vec![FCONST_1, FNEG, FCONST_0, FDIV]);

    let mut doubles = HashMap::with_capacity(256);
    add(&mut doubles, 0f64.to_bits(), vec![DCONST_0]);
    add(&mut doubles, 1f64.to_bits(), vec![DCONST_1]);
    for i in &small
    {
        add(&mut doubles, (*i as f64).to_bits(), cat(&ints[i], &[I2D]));
    }
    add(&mut doubles, DOUBLE_SIGN, vec![DCONST_0, DNEG]);
    add(&mut doubles, DOUBLE_NAN, vec![DCONST_0, DCONST_0, DDIV]);
    add(&mut doubles, DOUBLE_INF, vec![DCONST_1, DCONST_0, DDIV]);
    add(&mut doubles, DOUBLE_NINF, vec![DCONST_1, DNEG, DCONST_0, DDIV]);

    LookupTables { ints, floats, longs, doubles }
}
