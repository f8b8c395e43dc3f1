use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dex::opcodes::DalvikOpcode;
use crate::dex::{read_u1, read_u2, read_u4, read_u8};
use crate::error::TranslateError;

/// Constant table attached to a `fill-array-data` instruction.
///
/// Narrow elements (1, 2 or 4 bytes) are stored zero-extended as read; sign
/// extension depends on the array type and happens during translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayData
{
    Narrow(Vec<i32>),
    Wide(Vec<i64>),
}

impl ArrayData
{
    /// Decodes a little-endian `fill-array-data-payload` element table.
    pub fn from_raw(width: u16, count: usize, bytes: &[u8]) -> Result<ArrayData, TranslateError>
    {
        let mut ix = 0usize;
        let data = match width
        {
            1 => ArrayData::Narrow((0..count).map(|_| read_u1(bytes, &mut ix).map(|v| v as i32)).collect::<Result<_, _>>()?),
            2 => ArrayData::Narrow((0..count).map(|_| read_u2(bytes, &mut ix).map(|v| v as i32)).collect::<Result<_, _>>()?),
            4 => ArrayData::Narrow((0..count).map(|_| read_u4(bytes, &mut ix).map(|v| v as i32)).collect::<Result<_, _>>()?),
            8 => ArrayData::Wide((0..count).map(|_| read_u8(bytes, &mut ix).map(|v| v as i64)).collect::<Result<_, _>>()?),
            _ => fail!("Invalid array data width {}", width),
        };
        Ok(data)
    }

    pub fn len(&self) -> usize
    {
        match self
        {
            ArrayData::Narrow(v) => v.len(),
            ArrayData::Wide(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload
{
    /// Case key to absolute branch target.
    Switch(BTreeMap<i32, u32>),
    ArrayData(ArrayData),
}

/// Registers known to hold an instance of `type_idx` on one edge of an
/// `if-eqz`/`if-nez` that tests the result of `instance-of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitCasts
{
    pub type_idx: u32,
    pub registers: BTreeSet<u16>,
}

/// One decoded Dalvik instruction.
///
/// `args` follows the operand order of the Dalvik format with branch offsets
/// already resolved to absolute positions. Invokes and `filled-new-array`
/// keep their reference index in `args[0]` and their argument registers in
/// `registers`; wide constants keep their literal in `wide`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DalvikInstruction
{
    pub opcode: u8,
    pub kind: DalvikOpcode,
    pub position: u32,
    pub pos2: u32,
    pub args: Vec<i32>,
    pub wide: i64,
    pub registers: Vec<u16>,
    pub payload: Option<Payload>,
    pub prev_result: Option<String>,
    pub implicit_casts: Option<ImplicitCasts>,
}

impl DalvikInstruction
{
    pub fn new(opcode: u8, position: u32, pos2: u32, args: Vec<i32>) -> Self
    {
        DalvikInstruction {
            opcode,
            kind: DalvikOpcode::from_opcode(opcode),
            position,
            pos2,
            args,
            wide: 0,
            registers: Vec::new(),
            payload: None,
            prev_result: None,
            implicit_casts: None,
        }
    }

    pub fn with_wide(mut self, value: i64) -> Self
    {
        self.wide = value;
        self
    }

    pub fn with_registers(mut self, registers: Vec<u16>) -> Self
    {
        self.registers = registers;
        self
    }

    /// `targets` are relative to this instruction, as stored in a switch payload.
    pub fn with_switch<I: IntoIterator<Item = (i32, i32)>>(mut self, targets: I) -> Self
    {
        let base = self.position as i64;
        let jumps = targets
            .into_iter()
            .map(|(key, offset)| (key, (base + offset as i64) as u32))
            .collect();
        self.payload = Some(Payload::Switch(jumps));
        self
    }

    pub fn with_array_data(mut self, data: ArrayData) -> Self
    {
        self.payload = Some(Payload::ArrayData(data));
        self
    }

    pub fn arg(&self, i: usize) -> Result<i32, TranslateError>
    {
        match self.args.get(i)
        {
            Some(v) => Ok(*v),
            None => fail!("Missing operand {} of opcode 0x{:02x} at {}", i, self.opcode, self.position),
        }
    }

    /// Register operand.
    pub fn reg(&self, i: usize) -> Result<usize, TranslateError>
    {
        let v = self.arg(i)?;
        if v < 0
        {
            fail!("Negative register v{} at {}", v, self.position);
        }
        Ok(v as usize)
    }

    /// Pool index operand.
    pub fn index(&self, i: usize) -> Result<u32, TranslateError>
    {
        Ok(self.arg(i)? as u32)
    }

    /// Absolute branch target operand.
    pub fn target(&self, i: usize) -> Result<u32, TranslateError>
    {
        Ok(self.arg(i)? as u32)
    }

    /// Second to last and last operand, the sources of a binary operation.
    /// Two-address forms reuse the destination as the first source.
    pub fn binary_sources(&self) -> Result<(usize, usize), TranslateError>
    {
        if self.args.len() < 2
        {
            fail!("Binary operation at {} needs two operands", self.position);
        }
        Ok((self.reg(self.args.len() - 2)?, self.reg(self.args.len() - 1)?))
    }

    pub fn switch_targets(&self) -> Result<&BTreeMap<i32, u32>, TranslateError>
    {
        match &self.payload
        {
            Some(Payload::Switch(jumps)) => Ok(jumps),
            _ => fail!("Switch at {} has no payload", self.position),
        }
    }

    pub fn array_data(&self) -> Result<&ArrayData, TranslateError>
    {
        match &self.payload
        {
            Some(Payload::ArrayData(data)) => Ok(data),
            _ => fail!("fill-array-data at {} has no payload", self.position),
        }
    }
}
