//! Per-transaction execution results of a block.

use btmd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::merkle::merkle_root;

const STATUS_VERSION: u8 = 1;

/// `failed[i]` is set when transaction `i` of the block failed validation
/// but was still included; such a transaction spends its inputs and
/// creates nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionStatus {
    failed: Vec<bool>,
}

impl TransactionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_succeeded(count: usize) -> Self {
        Self {
            failed: vec![false; count],
        }
    }

    pub fn len(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }

    /// Records the result of transaction `index`, growing the list with
    /// successes if needed.
    pub fn set_status(&mut self, index: usize, failed: bool) {
        if index >= self.failed.len() {
            self.failed.resize(index + 1, false);
        }
        self.failed[index] = failed;
    }

    pub fn status(&self, index: usize) -> Option<bool> {
        self.failed.get(index).copied()
    }

    pub fn merkle_root(&self) -> Hash256 {
        let leaves: Vec<[u8; 1]> = self.failed.iter().map(|failed| [u8::from(*failed)]).collect();
        merkle_root(&leaves)
    }
}

impl Encodable for TransactionStatus {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u8(STATUS_VERSION);
        encoder.write_varint(self.failed.len() as u64);
        for failed in &self.failed {
            encoder.write_bool(*failed);
        }
    }
}

impl Decodable for TransactionStatus {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        if decoder.read_u8()? != STATUS_VERSION {
            return Err(DecodeError::InvalidData("unknown transaction status version"));
        }
        let count = decoder.read_count(1)?;
        let mut failed = Vec::with_capacity(count);
        for _ in 0..count {
            failed.push(decoder.read_bool()?);
        }
        Ok(Self { failed })
    }
}
