//! Unspent outputs and the in-memory view blocks are applied against.
//!
//! A [`UtxoViewpoint`] is filled from the store with the entries a block
//! touches, mutated by connecting and disconnecting blocks, and then written
//! back in one batch. An entry marked spent is deleted on write.

use std::collections::{HashMap, HashSet};

use btmd_consensus::Hash256;
use btmd_primitives::block::Block;
use btmd_primitives::encoding::{DecodeError, Decoder, Encoder};
use btmd_primitives::txstatus::TransactionStatus;

use crate::error::ChainError;
use crate::undo::{BlockUndo, SpentOutput};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoEntry {
    pub spent: bool,
    pub amount: u64,
    pub control_program: Vec<u8>,
    pub block_height: u64,
    pub is_coinbase: bool,
}

impl UtxoEntry {
    pub fn new(amount: u64, control_program: Vec<u8>, block_height: u64, is_coinbase: bool) -> Self {
        Self {
            spent: false,
            amount,
            control_program,
            block_height,
            is_coinbase,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_bool(self.spent);
        encoder.write_u64_le(self.amount);
        encoder.write_var_bytes(&self.control_program);
        encoder.write_u64_le(self.block_height);
        encoder.write_bool(self.is_coinbase);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let spent = decoder.read_bool()?;
        let amount = decoder.read_u64_le()?;
        let control_program = decoder.read_var_bytes()?;
        let block_height = decoder.read_u64_le()?;
        let is_coinbase = decoder.read_bool()?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self {
            spent,
            amount,
            control_program,
            block_height,
            is_coinbase,
        })
    }
}

#[derive(Debug, Default)]
pub struct UtxoViewpoint {
    entries: HashMap<Hash256, UtxoEntry>,
    undo: HashMap<Hash256, BlockUndo>,
    /// Outputs each block applied through this view created, with the
    /// entry they replaced.
    created: HashMap<Hash256, HashMap<Hash256, Option<UtxoEntry>>>,
    connected: HashSet<Hash256>,
    disconnected: HashSet<Hash256>,
}

impl UtxoViewpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, id: Hash256, entry: UtxoEntry) {
        self.entries.insert(id, entry);
    }

    pub fn get(&self, id: &Hash256) -> Option<&UtxoEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &Hash256) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Hash256, &UtxoEntry)> {
        self.entries.iter()
    }

    /// Supplies the undo record of a block about to be disconnected.
    pub fn insert_undo(&mut self, block_hash: Hash256, undo: BlockUndo) {
        self.undo.insert(block_hash, undo);
    }

    /// Undo records of the blocks connected through this view.
    pub fn connected_undo(&self) -> impl Iterator<Item = (&Hash256, &BlockUndo)> {
        self.connected
            .iter()
            .filter_map(|hash| self.undo.get(hash).map(|undo| (hash, undo)))
    }

    pub fn disconnected_blocks(&self) -> impl Iterator<Item = &Hash256> {
        self.disconnected.iter()
    }

    /// Spends every input of `block` and creates the outputs of each
    /// transaction that did not fail. The spent entries are kept as the
    /// block's undo record.
    pub fn apply_block(&mut self, block: &Block, status: &TransactionStatus) -> Result<(), ChainError> {
        let block_hash = block.hash();
        let height = block.height();
        let mut undo = BlockUndo::default();
        let mut created = HashMap::new();
        for (index, tx) in block.transactions.iter().enumerate() {
            let failed = status
                .status(index)
                .ok_or(ChainError::MissingTransactionStatus(block_hash))?;
            for id in tx.spent_output_ids() {
                let entry = self.entries.get_mut(&id).ok_or(ChainError::MissingUtxo(id))?;
                if entry.spent {
                    return Err(ChainError::AlreadySpent(id));
                }
                undo.spent.push(SpentOutput {
                    id,
                    entry: entry.clone(),
                });
                entry.spent = true;
            }
            if failed {
                continue;
            }

            let tx_id = tx.id();
            let is_coinbase = tx.is_coinbase();
            for (position, output) in tx.outputs.iter().enumerate() {
                let Some(id) = tx.output_id_with(&tx_id, position) else {
                    continue;
                };
                if self.entries.get(&id).is_some_and(|entry| !entry.spent) {
                    return Err(ChainError::OutputExists(id));
                }
                let prior = self.entries.insert(
                    id,
                    UtxoEntry::new(output.amount, output.control_program.clone(), height, is_coinbase),
                );
                created.insert(id, prior);
            }
        }
        self.undo.insert(block_hash, undo);
        self.created.insert(block_hash, created);
        self.disconnected.remove(&block_hash);
        self.connected.insert(block_hash);
        Ok(())
    }

    /// Reverses [`UtxoViewpoint::apply_block`]. The block's undo record must
    /// have been supplied with [`UtxoViewpoint::insert_undo`] or left by an
    /// earlier apply on this view.
    ///
    /// Outputs the block created in this view get back the entry they
    /// replaced, or disappear if there was none. Outputs loaded from the
    /// store are marked spent so the commit deletes them.
    pub fn detach_block(&mut self, block: &Block, status: &TransactionStatus) -> Result<(), ChainError> {
        let block_hash = block.hash();
        let mut undo = self
            .undo
            .remove(&block_hash)
            .ok_or(ChainError::MissingUndo(block_hash))?;
        let mut created = self.created.remove(&block_hash);

        for (index, tx) in block.transactions.iter().enumerate().rev() {
            let failed = status
                .status(index)
                .ok_or(ChainError::MissingTransactionStatus(block_hash))?;
            if !failed {
                for id in tx.output_ids() {
                    let entry = self.entries.get_mut(&id).ok_or(ChainError::MissingUtxo(id))?;
                    if entry.spent {
                        return Err(ChainError::AlreadySpent(id));
                    }
                    match created.as_mut().and_then(|outputs| outputs.remove(&id)) {
                        Some(Some(prior)) => {
                            *entry = prior;
                        }
                        Some(None) => {
                            self.entries.remove(&id);
                        }
                        None => entry.spent = true,
                    }
                }
            }

            let spent: Vec<Hash256> = tx.spent_output_ids().collect();
            for id in spent.into_iter().rev() {
                let restored = undo
                    .spent
                    .pop()
                    .ok_or(ChainError::Corrupt("block undo shorter than its spends"))?;
                if restored.id != id {
                    return Err(ChainError::Corrupt("block undo out of order"));
                }
                if self.entries.get(&id).is_some_and(|entry| !entry.spent) {
                    return Err(ChainError::UnspentRevert(id));
                }
                let mut entry = restored.entry;
                entry.spent = false;
                self.entries.insert(id, entry);
            }
        }
        if !undo.spent.is_empty() {
            return Err(ChainError::Corrupt("block undo longer than its spends"));
        }

        self.connected.remove(&block_hash);
        self.disconnected.insert(block_hash);
        Ok(())
    }
}
