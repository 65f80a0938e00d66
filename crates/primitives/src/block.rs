//! Block header and block types.

use btmd_consensus::constants::SER_BLOCK_FULL;
use btmd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::merkle::merkle_root;
use crate::preimage::{entry_id, HashWriter, WriteForHash};
use crate::transaction::Transaction;
use crate::txstatus::TransactionStatus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u64,
    pub height: u64,
    /// All zero for the genesis block.
    pub previous_block_hash: Hash256,
    pub timestamp: u64,
    pub nonce: u64,
    pub bits: u32,
    pub transactions_merkle_root: Hash256,
    pub transaction_status_hash: Hash256,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash256 {
        entry_id("blockheader", self)
    }

    pub fn parent_hash(&self) -> Option<Hash256> {
        if self.height == 0 {
            None
        } else {
            Some(self.previous_block_hash)
        }
    }
}

impl WriteForHash for BlockHeader {
    fn write_for_hash(&self, w: &mut HashWriter) {
        w.u64(self.version)
            .u64(self.height)
            .hash(&self.previous_block_hash)
            .u64(self.timestamp)
            .u64(self.nonce)
            .u32(self.bits)
            .hash(&self.transactions_merkle_root)
            .hash(&self.transaction_status_hash);
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u64_le(self.version);
        encoder.write_u64_le(self.height);
        encoder.write_hash(&self.previous_block_hash);
        encoder.write_u64_le(self.timestamp);
        encoder.write_u64_le(self.nonce);
        encoder.write_u32_le(self.bits);
        encoder.write_hash(&self.transactions_merkle_root);
        encoder.write_hash(&self.transaction_status_hash);
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_u64_le()?,
            height: decoder.read_u64_le()?,
            previous_block_hash: decoder.read_hash()?,
            timestamp: decoder.read_u64_le()?,
            nonce: decoder.read_u64_le()?,
            bits: decoder.read_u32_le()?,
            transactions_merkle_root: decoder.read_hash()?,
            transaction_status_hash: decoder.read_hash()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn transaction_ids(&self) -> Vec<Hash256> {
        self.transactions.iter().map(Transaction::id).collect()
    }

    pub fn compute_merkle_root(&self) -> Hash256 {
        merkle_root(&self.transaction_ids())
    }

    /// Fills in both header commitments from the transactions and `status`.
    pub fn commit(&mut self, status: &TransactionStatus) {
        self.header.transactions_merkle_root = self.compute_merkle_root();
        self.header.transaction_status_hash = status.merkle_root();
    }
}

impl Encodable for Block {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u8(SER_BLOCK_FULL);
        self.header.consensus_encode(encoder);
        encoder.write_varint(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.consensus_encode(encoder);
        }
    }
}

impl Decodable for Block {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        if decoder.read_u8()? != SER_BLOCK_FULL {
            return Err(DecodeError::InvalidData("unsupported block serialization flags"));
        }
        let header = BlockHeader::consensus_decode(decoder)?;
        let count = decoder.read_count(18)?;
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(Transaction::consensus_decode(decoder)?);
        }
        Ok(Self {
            header,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode, encode};
    use crate::transaction::{TxInput, TxOutput};

    fn sample_block() -> Block {
        let coinbase = Transaction {
            version: 1,
            time_range: 0,
            inputs: vec![TxInput::coinbase(b"sample".to_vec())],
            outputs: vec![TxOutput::new(1_000, vec![0x00, 0x14])],
        };
        let mut block = Block {
            header: BlockHeader {
                version: 1,
                height: 5,
                previous_block_hash: [9u8; 32],
                timestamp: 1_600_000_000,
                nonce: 42,
                bits: 0x207f_ffff,
                transactions_merkle_root: [0u8; 32],
                transaction_status_hash: [0u8; 32],
            },
            transactions: vec![coinbase],
        };
        block.commit(&TransactionStatus::all_succeeded(1));
        block
    }

    #[test]
    fn hash_covers_commitments() {
        let block = sample_block();
        let mut altered = block.clone();
        altered.header.transaction_status_hash = [1u8; 32];
        assert_ne!(block.hash(), altered.hash());
    }

    #[test]
    fn block_decodes_what_it_encodes() {
        let block = sample_block();
        let bytes = encode(&block);
        assert_eq!(bytes[0], SER_BLOCK_FULL);
        let decoded: Block = decode(&bytes).expect("decode");
        assert_eq!(decoded.hash(), block.hash());
        assert_eq!(decoded, block);
    }

    #[test]
    fn genesis_height_has_no_parent() {
        let mut header = sample_block().header;
        assert_eq!(header.parent_hash(), Some([9u8; 32]));
        header.height = 0;
        assert_eq!(header.parent_hash(), None);
    }
}
