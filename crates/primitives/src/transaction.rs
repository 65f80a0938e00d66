//! Transactions, their inputs and outputs, and the ids derived from them.

use btmd_consensus::constants::SER_TX_FULL;
use btmd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::preimage::{entry_id, HashWriter, WriteForHash};

const INPUT_COINBASE: u8 = 0x00;
const INPUT_SPEND: u8 = 0x01;

/// Spends a previously created output. The commitment repeats the spent
/// output's fields so its id can be recomputed without looking up the
/// creating transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendInput {
    pub source_id: Hash256,
    pub source_position: u64,
    pub amount: u64,
    pub control_program: Vec<u8>,
    pub arguments: Vec<Vec<u8>>,
    pub suffix: Vec<u8>,
}

impl SpendInput {
    pub fn spent_output_id(&self) -> Hash256 {
        output_id(
            &self.source_id,
            self.source_position,
            self.amount,
            &self.control_program,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxInput {
    Coinbase { arbitrary: Vec<u8>, suffix: Vec<u8> },
    Spend(SpendInput),
}

impl TxInput {
    pub fn coinbase(arbitrary: impl Into<Vec<u8>>) -> Self {
        TxInput::Coinbase {
            arbitrary: arbitrary.into(),
            suffix: Vec::new(),
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, TxInput::Coinbase { .. })
    }

    pub fn spent_output_id(&self) -> Option<Hash256> {
        match self {
            TxInput::Coinbase { .. } => None,
            TxInput::Spend(spend) => Some(spend.spent_output_id()),
        }
    }
}

impl WriteForHash for TxInput {
    fn write_for_hash(&self, w: &mut HashWriter) {
        match self {
            TxInput::Coinbase { arbitrary, .. } => {
                w.u8(INPUT_COINBASE).bytes(arbitrary);
            }
            TxInput::Spend(spend) => {
                w.u8(INPUT_SPEND)
                    .hash(&spend.spent_output_id())
                    .u64(spend.amount);
            }
        }
    }
}

impl Encodable for TxInput {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        match self {
            TxInput::Coinbase { arbitrary, suffix } => {
                encoder.write_u8(INPUT_COINBASE);
                encoder.write_extensible(suffix, |inner| inner.write_var_bytes(arbitrary));
                encoder.write_varint(0);
            }
            TxInput::Spend(spend) => {
                encoder.write_u8(INPUT_SPEND);
                encoder.write_extensible(&spend.suffix, |inner| {
                    inner.write_hash(&spend.source_id);
                    inner.write_u64_le(spend.source_position);
                    inner.write_u64_le(spend.amount);
                    inner.write_var_bytes(&spend.control_program);
                });
                encoder.write_varint(spend.arguments.len() as u64);
                for argument in &spend.arguments {
                    encoder.write_var_bytes(argument);
                }
            }
        }
    }
}

impl Decodable for TxInput {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        match decoder.read_u8()? {
            INPUT_COINBASE => {
                let (arbitrary, suffix) = decoder.read_extensible(|inner| inner.read_var_bytes())?;
                if decoder.read_varint()? != 0 {
                    return Err(DecodeError::InvalidData("coinbase input carries arguments"));
                }
                Ok(TxInput::Coinbase { arbitrary, suffix })
            }
            INPUT_SPEND => {
                let ((source_id, source_position, amount, control_program), suffix) = decoder
                    .read_extensible(|inner| {
                        Ok((
                            inner.read_hash()?,
                            inner.read_u64_le()?,
                            inner.read_u64_le()?,
                            inner.read_var_bytes()?,
                        ))
                    })?;
                let count = decoder.read_count(1)?;
                let mut arguments = Vec::with_capacity(count);
                for _ in 0..count {
                    arguments.push(decoder.read_var_bytes()?);
                }
                Ok(TxInput::Spend(SpendInput {
                    source_id,
                    source_position,
                    amount,
                    control_program,
                    arguments,
                    suffix,
                }))
            }
            _ => Err(DecodeError::InvalidData("unknown input type")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub amount: u64,
    pub control_program: Vec<u8>,
    pub suffix: Vec<u8>,
}

impl TxOutput {
    pub fn new(amount: u64, control_program: impl Into<Vec<u8>>) -> Self {
        Self {
            amount,
            control_program: control_program.into(),
            suffix: Vec::new(),
        }
    }
}

impl WriteForHash for TxOutput {
    fn write_for_hash(&self, w: &mut HashWriter) {
        w.u64(self.amount).bytes(&self.control_program);
    }
}

impl Encodable for TxOutput {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_extensible(&self.suffix, |inner| {
            inner.write_u64_le(self.amount);
            inner.write_var_bytes(&self.control_program);
        });
    }
}

impl Decodable for TxOutput {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let ((amount, control_program), suffix) = decoder
            .read_extensible(|inner| Ok((inner.read_u64_le()?, inner.read_var_bytes()?)))?;
        Ok(Self {
            amount,
            control_program,
            suffix,
        })
    }
}

struct OutputPreimage<'a> {
    source_id: &'a Hash256,
    position: u64,
    amount: u64,
    control_program: &'a [u8],
}

impl WriteForHash for OutputPreimage<'_> {
    fn write_for_hash(&self, w: &mut HashWriter) {
        w.hash(self.source_id)
            .u64(self.position)
            .u64(self.amount)
            .bytes(self.control_program);
    }
}

/// Id of the output at `position` of the transaction `source_id`.
pub fn output_id(source_id: &Hash256, position: u64, amount: u64, control_program: &[u8]) -> Hash256 {
    entry_id(
        "output1",
        &OutputPreimage {
            source_id,
            position,
            amount,
            control_program,
        },
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: u64,
    pub time_range: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn id(&self) -> Hash256 {
        entry_id("txheader", self)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    pub fn output_id(&self, position: usize) -> Option<Hash256> {
        self.output_id_with(&self.id(), position)
    }

    /// Like [`Transaction::output_id`] for a caller that already holds the id.
    pub fn output_id_with(&self, tx_id: &Hash256, position: usize) -> Option<Hash256> {
        let output = self.outputs.get(position)?;
        Some(output_id(
            tx_id,
            position as u64,
            output.amount,
            &output.control_program,
        ))
    }

    pub fn output_ids(&self) -> Vec<Hash256> {
        let tx_id = self.id();
        (0..self.outputs.len())
            .filter_map(|position| self.output_id_with(&tx_id, position))
            .collect()
    }

    pub fn spent_output_ids(&self) -> impl Iterator<Item = Hash256> + '_ {
        self.inputs.iter().filter_map(TxInput::spent_output_id)
    }
}

impl WriteForHash for Transaction {
    fn write_for_hash(&self, w: &mut HashWriter) {
        w.u64(self.version)
            .u64(self.time_range)
            .list(&self.inputs)
            .list(&self.outputs);
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u8(SER_TX_FULL);
        encoder.write_u64_le(self.version);
        encoder.write_u64_le(self.time_range);
        encoder.write_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            input.consensus_encode(encoder);
        }
        encoder.write_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            output.consensus_encode(encoder);
        }
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        if decoder.read_u8()? != SER_TX_FULL {
            return Err(DecodeError::InvalidData("unsupported transaction serialization flags"));
        }
        let version = decoder.read_u64_le()?;
        let time_range = decoder.read_u64_le()?;
        let input_count = decoder.read_count(2)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxInput::consensus_decode(decoder)?);
        }
        let output_count = decoder.read_count(1)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOutput::consensus_decode(decoder)?);
        }
        Ok(Self {
            version,
            time_range,
            inputs,
            outputs,
        })
    }
}
