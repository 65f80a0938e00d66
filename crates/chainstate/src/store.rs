//! Persistence of blocks, transaction statuses, UTXOs, undo records and the
//! chain status, on top of any [`KeyValueStore`].

use std::collections::HashMap;

use btmd_consensus::Hash256;
use btmd_primitives::block::{Block, BlockHeader};
use btmd_primitives::encoding::{decode, encode, Decodable, DecodeError, Decoder, Encoder};
use btmd_primitives::txstatus::TransactionStatus;
use btmd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::blockindex::{BlockIndex, BlockNode};
use crate::error::ChainError;
use crate::undo::BlockUndo;
use crate::utxo::{UtxoEntry, UtxoViewpoint};

const CHAIN_STATUS_KEY: &[u8] = b"chain_status";

/// Height and hash of the persisted main chain tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockStoreState {
    pub height: u64,
    pub hash: Hash256,
}

impl BlockStoreState {
    fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_u64_le(self.height);
        encoder.write_hash(&self.hash);
        encoder.into_inner()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let height = decoder.read_u64_le()?;
        let hash = decoder.read_hash()?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self { height, hash })
    }
}

pub trait Store: Send + Sync {
    fn block_exist(&self, hash: &Hash256) -> Result<bool, ChainError>;
    fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError>;
    fn get_store_status(&self) -> Result<Option<BlockStoreState>, ChainError>;
    fn get_transaction_status(&self, hash: &Hash256) -> Result<Option<TransactionStatus>, ChainError>;
    fn get_utxo(&self, id: &Hash256) -> Result<Option<UtxoEntry>, ChainError>;
    fn get_block_undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>, ChainError>;
    /// Rebuilds the block index from every saved header and points the main
    /// chain at the persisted tip.
    fn load_block_index(&self) -> Result<BlockIndex, ChainError>;
    /// Saves a validated block and its transaction status. Does not touch
    /// the chain status.
    fn save_block(&self, block: &Block, status: &TransactionStatus) -> Result<(), ChainError>;
    /// Writes the view and the new tip together.
    fn save_chain_status(&self, node: &BlockNode, view: &UtxoViewpoint) -> Result<(), ChainError>;

    /// Loads into `view` every stored entry `block` spends or creates that
    /// the view does not already hold.
    fn get_transactions_utxo(&self, view: &mut UtxoViewpoint, block: &Block) -> Result<(), ChainError> {
        for tx in &block.transactions {
            let ids = tx.spent_output_ids().chain(tx.output_ids());
            for id in ids {
                if view.contains(&id) {
                    continue;
                }
                if let Some(entry) = self.get_utxo(&id)? {
                    view.add_entry(id, entry);
                }
            }
        }
        Ok(())
    }
}

pub struct ChainStore<S> {
    db: S,
}

impl<S: KeyValueStore> ChainStore<S> {
    pub fn new(db: S) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &S {
        &self.db
    }

    pub fn get_header(&self, hash: &Hash256) -> Result<Option<BlockHeader>, ChainError> {
        self.get_decoded(Column::BlockHeader, hash)
    }

    fn get_decoded<T: Decodable>(
        &self,
        column: Column,
        key: &[u8],
    ) -> Result<Option<T>, ChainError> {
        match self.db.get(column, key)? {
            Some(bytes) => decode(&bytes)
                .map(Some)
                .map_err(|_| corrupt_record(column)),
            None => Ok(None),
        }
    }
}

fn corrupt_record(column: Column) -> ChainError {
    ChainError::Store(StoreError::Corrupt(match column {
        Column::Meta => "chain status",
        Column::BlockHeader => "block header",
        Column::Block => "block",
        Column::TxStatus => "transaction status",
        Column::Utxo => "utxo entry",
        Column::BlockUndo => "block undo",
    }))
}

impl<S: KeyValueStore> Store for ChainStore<S> {
    fn block_exist(&self, hash: &Hash256) -> Result<bool, ChainError> {
        Ok(self.db.contains(Column::Block, hash)?)
    }

    fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        self.get_decoded(Column::Block, hash)
    }

    fn get_store_status(&self) -> Result<Option<BlockStoreState>, ChainError> {
        match self.db.get(Column::Meta, CHAIN_STATUS_KEY)? {
            Some(bytes) => BlockStoreState::decode(&bytes)
                .map(Some)
                .map_err(|_| corrupt_record(Column::Meta)),
            None => Ok(None),
        }
    }

    fn get_transaction_status(&self, hash: &Hash256) -> Result<Option<TransactionStatus>, ChainError> {
        self.get_decoded(Column::TxStatus, hash)
    }

    fn get_utxo(&self, id: &Hash256) -> Result<Option<UtxoEntry>, ChainError> {
        match self.db.get(Column::Utxo, id)? {
            Some(bytes) => UtxoEntry::decode(&bytes)
                .map(Some)
                .map_err(|_| corrupt_record(Column::Utxo)),
            None => Ok(None),
        }
    }

    fn get_block_undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>, ChainError> {
        match self.db.get(Column::BlockUndo, hash)? {
            Some(bytes) => BlockUndo::decode(&bytes)
                .map(Some)
                .map_err(|_| corrupt_record(Column::BlockUndo)),
            None => Ok(None),
        }
    }

    fn load_block_index(&self) -> Result<BlockIndex, ChainError> {
        let mut headers = Vec::new();
        self.db.for_each_prefix(Column::BlockHeader, &[], &mut |_key: &[u8], value: &[u8]| {
            let header: BlockHeader =
                decode(value).map_err(|_| StoreError::Corrupt("block header"))?;
            headers.push(header);
            Ok(())
        })?;
        headers.sort_by_key(|header| header.height);

        let index = BlockIndex::new();
        let mut by_hash: HashMap<Hash256, std::sync::Arc<BlockNode>> = HashMap::new();
        for header in &headers {
            let parent = match header.parent_hash() {
                Some(prev) => Some(
                    by_hash
                        .get(&prev)
                        .cloned()
                        .ok_or(ChainError::Corrupt("stored header without its parent"))?,
                ),
                None => None,
            };
            let node = BlockNode::new(header, parent.as_deref())
                .map_err(|_| ChainError::Corrupt("stored header does not link to its parent"))?;
            let node = index.add_node(node);
            by_hash.insert(node.hash, node);
        }

        if let Some(status) = self.get_store_status()? {
            let tip = by_hash
                .get(&status.hash)
                .ok_or(ChainError::Corrupt("chain status points at an unknown block"))?;
            if tip.height != status.height {
                return Err(ChainError::Corrupt("chain status height mismatch"));
            }
            index.set_main_chain(tip)?;
        }
        btmd_log::log_debug!("loaded {} block index nodes", index.len());
        Ok(index)
    }

    fn save_block(&self, block: &Block, status: &TransactionStatus) -> Result<(), ChainError> {
        let hash = block.hash();
        let mut batch = WriteBatch::new();
        batch.put(Column::Block, hash, encode(block));
        batch.put(Column::BlockHeader, hash, encode(&block.header));
        batch.put(Column::TxStatus, hash, encode(status));
        self.db.write_batch(&batch)?;
        Ok(())
    }

    fn save_chain_status(&self, node: &BlockNode, view: &UtxoViewpoint) -> Result<(), ChainError> {
        let mut batch = WriteBatch::new();
        for (id, entry) in view.entries() {
            if entry.spent {
                batch.delete(Column::Utxo, *id);
            } else {
                batch.put(Column::Utxo, *id, entry.encode());
            }
        }
        for (hash, undo) in view.connected_undo() {
            batch.put(Column::BlockUndo, *hash, undo.encode());
        }
        for hash in view.disconnected_blocks() {
            batch.delete(Column::BlockUndo, *hash);
        }
        let state = BlockStoreState {
            height: node.height,
            hash: node.hash,
        };
        batch.put(Column::Meta, CHAIN_STATUS_KEY, state.encode());
        self.db.write_batch(&batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btmd_storage::memory::MemoryStore;

    #[test]
    fn chain_status_roundtrip() {
        let state = BlockStoreState {
            height: 12,
            hash: [4u8; 32],
        };
        assert_eq!(BlockStoreState::decode(&state.encode()).expect("decode"), state);
    }

    #[test]
    fn empty_store_has_no_status() {
        let store = ChainStore::new(MemoryStore::new());
        assert!(store.get_store_status().expect("status").is_none());
        assert!(store.load_block_index().expect("index").is_empty());
    }

    #[test]
    fn corrupt_utxo_is_reported() {
        let store = ChainStore::new(MemoryStore::new());
        store.db().put(Column::Utxo, &[1u8; 32], &[9, 9]).expect("put");
        assert!(matches!(
            store.get_utxo(&[1u8; 32]),
            Err(ChainError::Store(StoreError::Corrupt("utxo entry")))
        ));
    }
}
