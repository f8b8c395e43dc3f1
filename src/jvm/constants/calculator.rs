//! Computes bytecode that materializes arbitrary numeric constants without
//! touching the constant pool.

use crate::error::TranslateError;
use crate::jvm::constants::lookup::*;
use crate::jvm::ops::*;
use crate::typeinference::Scalars;

fn concat(parts: &[&[u8]]) -> Vec<u8>
{
    parts.concat()
}

/// Builds an int from its high and low 16 bit halves.
pub fn calc_int(x: i32) -> Vec<u8>
{
    if let Some(bytes) = TABLES.ints.get(&x)
    {
        return bytes.clone();
    }
    let low = x as i16 as i32;
    let high = (x ^ low) >> 16;
    let mut result = concat(&[&calc_int(high), &calc_int(16), &[ISHL]]);
    if low != 0
    {
        result.extend(calc_int(low));
        result.push(IXOR);
    }
    result
}

pub fn calc_long(x: i64) -> Vec<u8>
{
    if let Some(bytes) = TABLES.longs.get(&x)
    {
        return bytes.clone();
    }
    let low = x as i32;
    let high = (x ^ low as i64) >> 32;
    if high == 0
    {
        return concat(&[&calc_int(low), &[I2L]]);
    }
    let mut result = concat(&[&calc_int(high as i32), &[I2L], &calc_int(32), &[LSHL]]);
    if low != 0
    {
        result.extend(calc_int(low));
        result.extend_from_slice(&[I2L, LXOR]);
    }
    result
}

/// Integer mantissa scaled by powers of two built from shifted longs.
pub fn calc_float(bits: u32) -> Vec<u8>
{
    if let Some(bytes) = TABLES.floats.get(&bits)
    {
        return bytes.clone();
    }
    let mut exponent = ((bits >> 23) & 0xFF) as i32 - 127;
    let mut mantissa = (bits & ((1 << 23) - 1)) as i32;
    if exponent == -127
    {
        // denormal
        exponent += 1;
    }
    else
    {
        mantissa += 1 << 23;
    }
    exponent -= 23;
    if bits & FLOAT_SIGN != 0
    {
        mantissa = -mantissa;
    }

    let ex_op = if exponent < 0 { FDIV } else { FMUL };
    let mut exponent = exponent.abs();
    let mut parts = Vec::new();
    // each factor of 2^63 comes out of (long)(1 << -1), which is negative
    while exponent >= 63
    {
        parts.extend_from_slice(&[LCONST_1, ICONST_M1, LSHL, L2F, ex_op]);
        mantissa = -mantissa;
        exponent -= 63;
    }
    if exponent > 0
    {
        parts.push(LCONST_1);
        parts.extend(calc_int(exponent));
        parts.extend_from_slice(&[LSHL, L2F, ex_op]);
    }
    concat(&[&calc_int(mantissa), &[I2F], &parts])
}

pub fn calc_double(bits: u64) -> Vec<u8>
{
    if let Some(bytes) = TABLES.doubles.get(&bits)
    {
        return bytes.clone();
    }
    let mut exponent = ((bits >> 52) & 0x7FF) as i32 - 1023;
    let mut mantissa = (bits & ((1 << 52) - 1)) as i64;
    if exponent == -1023
    {
        exponent += 1;
    }
    else
    {
        mantissa += 1 << 52;
    }
    exponent -= 52;
    if bits & DOUBLE_SIGN != 0
    {
        mantissa = -mantissa;
    }

    let abs_exponent = exponent.abs();
    let mut parts = Vec::new();

    let part63 = abs_exponent / 63;
    if part63 > 0
    {
        // base factor is (double)(1L << -1) == -2^63, or its reciprocal
        if exponent < 0
        {
            parts.extend_from_slice(&[DCONST_1, LCONST_1, ICONST_M1, LSHL, L2D, DDIV]);
        }
        else
        {
            parts.extend_from_slice(&[LCONST_1, ICONST_M1, LSHL, L2D]);
        }
        if part63 & 1 != 0
        {
            mantissa = -mantissa;
        }

        // square the base repeatedly, keeping a copy of each power part63 needs
        let mut last_needed = part63 & 1 != 0;
        let bit_len = 32 - (part63 as u32).leading_zeros();
        for bi in 1..bit_len
        {
            parts.push(DUP2);
            if last_needed
            {
                parts.push(DUP2);
            }
            parts.push(DMUL);
            last_needed = part63 & (1 << bi) != 0;
        }
        for _ in 0..part63.count_ones()
        {
            parts.push(DMUL);
        }
    }

    let rest = abs_exponent % 63;
    if rest > 0
    {
        parts.push(LCONST_1);
        parts.extend(calc_int(rest));
        parts.extend_from_slice(&[LSHL, L2D, if exponent < 0 { DDIV } else { DMUL }]);
    }
    concat(&[&calc_long(mantissa), &[L2D], &parts])
}

/// Collapses every NaN onto the single pattern the lookup table knows.
pub fn normalize_float(bits: u32) -> u32
{
    if f32::from_bits(bits).is_nan() { FLOAT_NAN } else { bits }
}

pub fn normalize_double(bits: u64) -> u64
{
    if f64::from_bits(bits).is_nan() { DOUBLE_NAN } else { bits }
}

/// Canonical 64 bit storage of a constant of the given type. Narrow values
/// are kept sign extended so equal constants compare equal.
pub fn normalize(st: Scalars, value: i64) -> i64
{
    if st == Scalars::FLOAT
    {
        normalize_float(value as u32) as i32 as i64
    }
    else if st == Scalars::DOUBLE
    {
        normalize_double(value as u64) as i64
    }
    else if st.is_wide()
    {
        value
    }
    else
    {
        value as i32 as i64
    }
}

pub fn calc(st: Scalars, value: i64) -> Result<Vec<u8>, TranslateError>
{
    let bytes = if st == Scalars::INT
    {
        calc_int(value as i32)
    }
    else if st == Scalars::FLOAT
    {
        calc_float(normalize_float(value as u32))
    }
    else if st == Scalars::LONG
    {
        calc_long(value)
    }
    else if st == Scalars::DOUBLE
    {
        calc_double(normalize_double(value as u64))
    }
    else
    {
        fail!("Cannot compute a constant of type {:?}", st);
    };
    Ok(bytes)
}

/// The table entry only, for callers that would rather use the pool than a
/// computed sequence.
pub fn lookup_only(st: Scalars, value: i64) -> Option<&'static [u8]>
{
    let bytes = if st == Scalars::INT
    {
        TABLES.ints.get(&(value as i32))
    }
    else if st == Scalars::FLOAT
    {
        TABLES.floats.get(&normalize_float(value as u32))
    }
    else if st == Scalars::LONG
    {
        TABLES.longs.get(&value)
    }
    else if st == Scalars::DOUBLE
    {
        TABLES.doubles.get(&normalize_double(value as u64))
    }
    else
    {
        None
    };
    bytes.map(|b| b.as_slice())
}
