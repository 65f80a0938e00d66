//! In-memory index of every block the chain has accepted.
//!
//! Nodes are immutable once built and shared as `Arc<BlockNode>`; the main
//! chain is a height-indexed vector of those same nodes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use btmd_consensus::constants::APPROX_NODES_PER_DAY;
use btmd_consensus::Hash256;
use btmd_primitives::block::BlockHeader;
use primitive_types::U256;

use crate::error::ChainError;
use crate::validation::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockNode {
    pub hash: Hash256,
    pub parent: Option<Hash256>,
    pub height: u64,
    /// Cumulative work from genesis through this block.
    pub work_sum: U256,
    pub version: u64,
    pub timestamp: u64,
    pub nonce: u64,
    pub bits: u32,
    pub transactions_merkle_root: Hash256,
    pub transaction_status_hash: Hash256,
}

impl BlockNode {
    pub fn new(header: &BlockHeader, parent: Option<&BlockNode>) -> Result<Self, ValidationError> {
        let parent_work = match (header.parent_hash(), parent) {
            (None, None) => U256::zero(),
            (Some(prev), Some(parent)) => {
                if prev != parent.hash || header.height != parent.height + 1 {
                    return Err(ValidationError::InvalidHeader("header does not extend parent"));
                }
                parent.work_sum
            }
            (None, Some(_)) => {
                return Err(ValidationError::InvalidHeader("genesis header given a parent"))
            }
            (Some(_), None) => return Err(ValidationError::InvalidHeader("missing parent node")),
        };
        let work = btmd_pow::block_proof(header.bits).map_err(btmd_pow::PowError::from)?;
        Ok(Self {
            hash: header.hash(),
            parent: parent.map(|parent| parent.hash),
            height: header.height,
            work_sum: parent_work.saturating_add(work),
            version: header.version,
            timestamp: header.timestamp,
            nonce: header.nonce,
            bits: header.bits,
            transactions_merkle_root: header.transactions_merkle_root,
            transaction_status_hash: header.transaction_status_hash,
        })
    }

    pub fn block_header(&self) -> BlockHeader {
        BlockHeader {
            version: self.version,
            height: self.height,
            previous_block_hash: self.parent.unwrap_or([0u8; 32]),
            timestamp: self.timestamp,
            nonce: self.nonce,
            bits: self.bits,
            transactions_merkle_root: self.transactions_merkle_root,
            transaction_status_hash: self.transaction_status_hash,
        }
    }
}

/// Blocks to leave and enter when switching the main chain between tips.
#[derive(Debug, Default)]
pub struct ReorgPath {
    pub fork: Option<Arc<BlockNode>>,
    /// From the old tip down to just above the fork.
    pub detach: Vec<Arc<BlockNode>>,
    /// From just above the fork up to the new tip.
    pub attach: Vec<Arc<BlockNode>>,
}

#[derive(Default)]
struct IndexState {
    nodes: HashMap<Hash256, Arc<BlockNode>>,
    main_chain: Vec<Arc<BlockNode>>,
}

#[derive(Default)]
pub struct BlockIndex {
    state: RwLock<IndexState>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts `node`, returning the shared handle. A node already present
    /// under the same hash is kept.
    pub fn add_node(&self, node: BlockNode) -> Arc<BlockNode> {
        let mut state = self.write();
        state
            .nodes
            .entry(node.hash)
            .or_insert_with(|| Arc::new(node))
            .clone()
    }

    pub fn get_node(&self, hash: &Hash256) -> Option<Arc<BlockNode>> {
        self.read().nodes.get(hash).cloned()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.read().nodes.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().nodes.is_empty()
    }

    pub fn best_node(&self) -> Option<Arc<BlockNode>> {
        self.read().main_chain.last().cloned()
    }

    pub fn best_height(&self) -> Option<u64> {
        self.best_node().map(|node| node.height)
    }

    pub fn node_by_height(&self, height: u64) -> Option<Arc<BlockNode>> {
        let index = usize::try_from(height).ok()?;
        self.read().main_chain.get(index).cloned()
    }

    /// Genesis through the tip, read under one lock so a concurrent
    /// reorganization is seen entirely or not at all.
    pub fn main_chain(&self) -> Vec<Arc<BlockNode>> {
        self.read().main_chain.clone()
    }

    pub fn in_main_chain(&self, hash: &Hash256) -> bool {
        let state = self.read();
        let Some(node) = state.nodes.get(hash) else {
            return false;
        };
        main_chain_at(&state, node.height).is_some_and(|entry| entry.hash == *hash)
    }

    /// Makes `tip` the last entry of the main chain, replacing every entry
    /// from the fork point up.
    pub fn set_main_chain(&self, tip: &Arc<BlockNode>) -> Result<(), ChainError> {
        let mut state = self.write();
        let mut replacements = Vec::new();
        let mut cursor = Arc::clone(tip);
        loop {
            if main_chain_at(&state, cursor.height).is_some_and(|entry| entry.hash == cursor.hash) {
                break;
            }
            replacements.push(Arc::clone(&cursor));
            let Some(parent) = cursor.parent else {
                break;
            };
            cursor = state
                .nodes
                .get(&parent)
                .cloned()
                .ok_or(ChainError::Corrupt("main chain ancestor missing from index"))?;
        }

        let keep = replacements
            .last()
            .map(|lowest| lowest.height as usize)
            .unwrap_or(tip.height as usize + 1);
        let needed = tip.height as usize + 1;
        if state.main_chain.capacity() < needed {
            let additional = needed + APPROX_NODES_PER_DAY - state.main_chain.len();
            state.main_chain.reserve(additional);
        }
        state.main_chain.truncate(keep);
        state.main_chain.extend(replacements.into_iter().rev());
        state.main_chain.truncate(needed);
        Ok(())
    }

    /// Highest common ancestor of `node` and the main chain.
    pub fn find_fork(&self, node: &Arc<BlockNode>) -> Option<Arc<BlockNode>> {
        let state = self.read();
        let mut cursor = Arc::clone(node);
        loop {
            if main_chain_at(&state, cursor.height).is_some_and(|entry| entry.hash == cursor.hash) {
                return Some(cursor);
            }
            cursor = state.nodes.get(&cursor.parent?)?.clone();
        }
    }

    pub fn reorganize_path(
        &self,
        from: &Arc<BlockNode>,
        to: &Arc<BlockNode>,
    ) -> Result<ReorgPath, ChainError> {
        let state = self.read();
        let parent_of = |node: &Arc<BlockNode>| -> Result<Arc<BlockNode>, ChainError> {
            let hash = node
                .parent
                .ok_or(ChainError::Corrupt("reorganize path crossed genesis"))?;
            state
                .nodes
                .get(&hash)
                .cloned()
                .ok_or(ChainError::Corrupt("reorganize path ancestor missing"))
        };

        let mut detach = Vec::new();
        let mut attach = Vec::new();
        let mut old = Arc::clone(from);
        let mut new = Arc::clone(to);
        while old.height > new.height {
            detach.push(Arc::clone(&old));
            old = parent_of(&old)?;
        }
        while new.height > old.height {
            attach.push(Arc::clone(&new));
            new = parent_of(&new)?;
        }
        while old.hash != new.hash {
            detach.push(Arc::clone(&old));
            attach.push(Arc::clone(&new));
            old = parent_of(&old)?;
            new = parent_of(&new)?;
        }
        attach.reverse();
        Ok(ReorgPath {
            fork: Some(old),
            detach,
            attach,
        })
    }
}

fn main_chain_at(state: &IndexState, height: u64) -> Option<&Arc<BlockNode>> {
    usize::try_from(height).ok().and_then(|index| state.main_chain.get(index))
}
