//! Per-block undo records: the entries a block consumed, so a disconnect can
//! put them back.

use btmd_consensus::Hash256;
use btmd_primitives::encoding::{DecodeError, Decoder, Encoder};

use crate::utxo::UtxoEntry;

const BLOCK_UNDO_VERSION: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpentOutput {
    pub id: Hash256,
    pub entry: UtxoEntry,
}

/// Spent entries in the order the block consumed them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockUndo {
    pub spent: Vec<SpentOutput>,
}

impl BlockUndo {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_u8(BLOCK_UNDO_VERSION);
        encoder.write_varint(self.spent.len() as u64);
        for spent in &self.spent {
            encoder.write_hash(&spent.id);
            encoder.write_var_bytes(&spent.entry.encode());
        }
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        if decoder.read_u8()? != BLOCK_UNDO_VERSION {
            return Err(DecodeError::InvalidData("unknown block undo version"));
        }
        let count = decoder.read_count(33)?;
        let mut spent = Vec::with_capacity(count);
        for _ in 0..count {
            let id = decoder.read_hash()?;
            let entry = UtxoEntry::decode(&decoder.read_var_bytes()?)?;
            spent.push(SpentOutput { id, entry });
        }
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self { spent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_roundtrip_keeps_order() {
        let undo = BlockUndo {
            spent: vec![
                SpentOutput {
                    id: [2u8; 32],
                    entry: UtxoEntry::new(10, vec![0x51], 4, true),
                },
                SpentOutput {
                    id: [1u8; 32],
                    entry: UtxoEntry::new(3, Vec::new(), 5, false),
                },
            ],
        };
        let decoded = BlockUndo::decode(&undo.encode()).expect("decode");
        assert_eq!(decoded, undo);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut bytes = BlockUndo::default().encode();
        bytes[0] = 9;
        assert!(BlockUndo::decode(&bytes).is_err());
    }
}
