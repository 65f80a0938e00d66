//! The chain worker: the single owner of every block-acceptance decision.
//!
//! Callers submit blocks through a bounded queue and await a reply; one
//! dedicated thread drains the queue and runs each request to completion,
//! including any reorganization, before taking the next. Reads of the index
//! and the orphan pool go straight to the shared structures.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use btmd_consensus::constants::{
    DEFAULT_MAX_ORPHANS, DEFAULT_MAX_WAIT_AHEAD, DEFAULT_NOTIFY_CAPACITY, DEFAULT_ORPHAN_TTL_SECS,
    MAX_PROCESS_BLOCK_QUEUE,
};
use btmd_consensus::{hash256_to_hex, ChainParams, Hash256};
use btmd_primitives::block::Block;
use btmd_primitives::txstatus::TransactionStatus;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::blockindex::{BlockIndex, BlockNode};
use crate::error::ChainError;
use crate::genesis::{ensure_genesis, genesis_block};
use crate::orphan::OrphanManage;
use crate::store::Store;
use crate::utxo::UtxoViewpoint;
use crate::validation::{BasicValidator, BlockValidator, ValidationError, ValidationFlags};

#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub queue_capacity: usize,
    pub max_orphans: usize,
    pub orphan_ttl: Duration,
    pub max_wait_ahead: u64,
    pub notify_capacity: usize,
    pub validation: ValidationFlags,
}

impl ChainConfig {
    pub fn from_params(params: &ChainParams) -> Self {
        Self {
            queue_capacity: params.queue_capacity,
            max_orphans: params.max_orphans,
            orphan_ttl: Duration::from_secs(params.orphan_ttl_secs),
            max_wait_ahead: params.max_wait_ahead,
            ..Self::default()
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            queue_capacity: MAX_PROCESS_BLOCK_QUEUE,
            max_orphans: DEFAULT_MAX_ORPHANS,
            orphan_ttl: Duration::from_secs(DEFAULT_ORPHAN_TTL_SECS),
            max_wait_ahead: DEFAULT_MAX_WAIT_AHEAD,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
            validation: ValidationFlags::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u64,
    pub hash: Hash256,
}

impl From<&BlockNode> for ChainTip {
    fn from(node: &BlockNode) -> Self {
        Self {
            height: node.height,
            hash: node.hash,
        }
    }
}

/// Sent after the store commit that made the change durable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainNotification {
    BlockConnected { hash: Hash256, height: u64 },
    BlockDisconnected { hash: Hash256, height: u64 },
}

enum ChainRequest {
    ProcessBlock {
        block: Box<Block>,
        reply: oneshot::Sender<Result<bool, ChainError>>,
    },
    Shutdown,
}

struct ChainWorker {
    store: Arc<dyn Store>,
    index: Arc<BlockIndex>,
    orphans: Arc<OrphanManage>,
    validator: Arc<dyn BlockValidator>,
    tip_tx: watch::Sender<ChainTip>,
    notify: broadcast::Sender<ChainNotification>,
}

impl ChainWorker {
    fn run(self, mut requests: mpsc::Receiver<ChainRequest>) {
        btmd_log::log_info!("chain worker started");
        while let Some(request) = requests.blocking_recv() {
            match request {
                ChainRequest::ProcessBlock { block, reply } => {
                    let hash = block.hash();
                    let result = self.process_block(*block);
                    if let Err(err) = &result {
                        btmd_log::log_warn!("rejected block {}: {err}", hash256_to_hex(&hash));
                    }
                    let _ = reply.send(result);
                }
                ChainRequest::Shutdown => break,
            }
        }

        requests.close();
        while let Ok(request) = requests.try_recv() {
            if let ChainRequest::ProcessBlock { reply, .. } = request {
                let _ = reply.send(Err(ChainError::Shutdown));
            }
        }
        btmd_log::log_info!("chain worker stopped");
    }

    /// Returns `Ok(true)` when the block was pooled as an orphan.
    fn process_block(&self, block: Block) -> Result<bool, ChainError> {
        let hash = block.hash();
        if self.orphans.exists(&hash) {
            return Ok(true);
        }
        if self.index.contains(&hash) {
            return Ok(false);
        }
        let Some(prev) = block.header.parent_hash() else {
            return Err(ValidationError::InvalidHeader("second genesis block").into());
        };
        let Some(parent) = self.index.get_node(&prev) else {
            self.orphans.add(Arc::new(block));
            return Ok(true);
        };

        let block = Arc::new(block);
        let (node, status) = self.save_block(&block, &parent)?;
        let mut best = (node, block, status);

        let mut pending = VecDeque::from([hash]);
        while let Some(parent_hash) = pending.pop_front() {
            let children = self.orphans.take_children(&parent_hash);
            if children.is_empty() {
                continue;
            }
            let Some(parent) = self.index.get_node(&parent_hash) else {
                continue;
            };
            for child in children {
                match self.save_block(&child, &parent) {
                    Ok((child_node, child_status)) => {
                        pending.push_back(child_node.hash);
                        if child_node.height > best.0.height {
                            best = (child_node, child, child_status);
                        }
                    }
                    Err(err) => btmd_log::log_warn!(
                        "dropped orphan {}: {err}",
                        hash256_to_hex(&child.hash())
                    ),
                }
            }
        }

        // A resolved descendant that cannot be attached falls back to its
        // parent, down to the submitted block, whose error is the one returned.
        let (mut node, mut block, mut status) = best;
        loop {
            match self.choose_fork(&node, &block, &status) {
                Ok(()) => return Ok(false),
                Err(err) if node.hash == hash => return Err(err),
                Err(err) => {
                    btmd_log::log_warn!(
                        "descendant {} height {} not attached: {err}",
                        hash256_to_hex(&node.hash),
                        node.height
                    );
                    let parent_hash = node
                        .parent
                        .ok_or(ChainError::Corrupt("descendant fallback reached genesis"))?;
                    node = self
                        .index
                        .get_node(&parent_hash)
                        .ok_or(ChainError::Corrupt("descendant ancestor missing from index"))?;
                    let (parent_block, parent_status) = self.load_block(&parent_hash)?;
                    block = Arc::new(parent_block);
                    status = parent_status;
                }
            }
        }
    }

    /// Validates and persists `block`, then adds its node to the index.
    fn save_block(
        &self,
        block: &Block,
        parent: &BlockNode,
    ) -> Result<(Arc<BlockNode>, TransactionStatus), ChainError> {
        let status = self.validator.validate_block(block, parent)?;
        let node = BlockNode::new(&block.header, Some(parent))?;
        self.store.save_block(block, &status)?;
        Ok((self.index.add_node(node), status))
    }

    fn choose_fork(
        &self,
        node: &Arc<BlockNode>,
        block: &Block,
        status: &TransactionStatus,
    ) -> Result<(), ChainError> {
        let best = self
            .index
            .best_node()
            .ok_or(ChainError::Corrupt("main chain is empty"))?;
        if node.parent == Some(best.hash) {
            return self.connect_block(node, block, status);
        }
        if node.height > best.height && node.work_sum >= best.work_sum {
            return self.reorganize(&best, node);
        }
        btmd_log::log_debug!(
            "block {} height {} kept on a side branch",
            hash256_to_hex(&node.hash),
            node.height
        );
        Ok(())
    }

    fn connect_block(
        &self,
        node: &Arc<BlockNode>,
        block: &Block,
        status: &TransactionStatus,
    ) -> Result<(), ChainError> {
        let mut view = UtxoViewpoint::new();
        self.store.get_transactions_utxo(&mut view, block)?;
        view.apply_block(block, status)?;
        self.store.save_chain_status(node, &view)?;
        self.index.set_main_chain(node)?;

        self.tip_tx.send_replace(ChainTip::from(node.as_ref()));
        let _ = self.notify.send(ChainNotification::BlockConnected {
            hash: node.hash,
            height: node.height,
        });
        btmd_log::log_debug!(
            "connected block {} height {}",
            hash256_to_hex(&node.hash),
            node.height
        );
        Ok(())
    }

    /// Detaches the old branch and attaches the new one in a single view,
    /// committed with the new tip in one write.
    fn reorganize(&self, old_tip: &Arc<BlockNode>, new_tip: &Arc<BlockNode>) -> Result<(), ChainError> {
        let path = self.index.reorganize_path(old_tip, new_tip)?;
        let mut view = UtxoViewpoint::new();
        for node in &path.detach {
            let (block, status) = self.load_block(&node.hash)?;
            let undo = self
                .store
                .get_block_undo(&node.hash)?
                .ok_or(ChainError::MissingUndo(node.hash))?;
            self.store.get_transactions_utxo(&mut view, &block)?;
            view.insert_undo(node.hash, undo);
            view.detach_block(&block, &status)?;
        }
        for node in &path.attach {
            let (block, status) = self.load_block(&node.hash)?;
            self.store.get_transactions_utxo(&mut view, &block)?;
            view.apply_block(&block, &status)?;
        }
        self.store.save_chain_status(new_tip, &view)?;
        self.index.set_main_chain(new_tip)?;
        self.tip_tx.send_replace(ChainTip::from(new_tip.as_ref()));

        for node in &path.detach {
            let _ = self.notify.send(ChainNotification::BlockDisconnected {
                hash: node.hash,
                height: node.height,
            });
        }
        for node in &path.attach {
            let _ = self.notify.send(ChainNotification::BlockConnected {
                hash: node.hash,
                height: node.height,
            });
        }
        let fork_height = path.fork.as_ref().map(|fork| fork.height).unwrap_or(0);
        btmd_log::log_info!(
            "reorganized from {} (height {}) to {} (height {}), fork at {}, {} detached, {} attached",
            hash256_to_hex(&old_tip.hash),
            old_tip.height,
            hash256_to_hex(&new_tip.hash),
            new_tip.height,
            fork_height,
            path.detach.len(),
            path.attach.len()
        );
        Ok(())
    }

    fn load_block(&self, hash: &Hash256) -> Result<(Block, TransactionStatus), ChainError> {
        let block = self
            .store
            .get_block(hash)?
            .ok_or_else(|| ChainError::NotFound(format!("block {}", hash256_to_hex(hash))))?;
        let status = self
            .store
            .get_transaction_status(hash)?
            .ok_or(ChainError::MissingTransactionStatus(*hash))?;
        Ok((block, status))
    }
}

pub struct ChainHandle {
    requests: mpsc::Sender<ChainRequest>,
    index: Arc<BlockIndex>,
    orphans: Arc<OrphanManage>,
    store: Arc<dyn Store>,
    tip: watch::Receiver<ChainTip>,
    notify: broadcast::Sender<ChainNotification>,
    max_wait_ahead: u64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChainHandle {
    pub fn start(
        store: Arc<dyn Store>,
        params: &ChainParams,
        config: ChainConfig,
    ) -> Result<Self, ChainError> {
        let validator = Arc::new(BasicValidator::new(config.validation.clone()));
        Self::start_with_validator(store, params, config, validator)
    }

    /// Bootstraps the store if it is empty, loads the block index and
    /// spawns the worker thread.
    pub fn start_with_validator(
        store: Arc<dyn Store>,
        params: &ChainParams,
        config: ChainConfig,
        validator: Arc<dyn BlockValidator>,
    ) -> Result<Self, ChainError> {
        ensure_genesis(store.as_ref(), params)?;
        let index = Arc::new(store.load_block_index()?);
        let best = index
            .best_node()
            .ok_or(ChainError::Corrupt("no main chain after bootstrap"))?;
        let (genesis, _) = genesis_block(params)?;
        if index.node_by_height(0).map(|node| node.hash) != Some(genesis.hash()) {
            return Err(ChainError::Corrupt("store genesis does not match the network"));
        }

        let (tip_tx, tip) = watch::channel(ChainTip::from(best.as_ref()));
        let (notify, _) = broadcast::channel(config.notify_capacity.max(1));
        let (requests, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let orphans = Arc::new(OrphanManage::new(config.max_orphans, config.orphan_ttl));

        let worker = ChainWorker {
            store: Arc::clone(&store),
            index: Arc::clone(&index),
            orphans: Arc::clone(&orphans),
            validator,
            tip_tx,
            notify: notify.clone(),
        };
        let handle = thread::Builder::new()
            .name("chain-worker".to_string())
            .spawn(move || worker.run(receiver))
            .map_err(|err| ChainError::Worker(err.to_string()))?;

        btmd_log::log_info!(
            "{} chain tip {} height {}",
            params.network,
            hash256_to_hex(&best.hash),
            best.height
        );
        Ok(Self {
            requests,
            index,
            orphans,
            store,
            tip,
            notify,
            max_wait_ahead: config.max_wait_ahead,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Queues `block` and waits for the verdict: `Ok(true)` means it is
    /// waiting on an unknown parent. Waits for queue space when full.
    pub async fn process_block(&self, block: Block) -> Result<bool, ChainError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(ChainRequest::ProcessBlock {
                block: Box::new(block),
                reply,
            })
            .await
            .map_err(|_| ChainError::Shutdown)?;
        response.await.map_err(|_| ChainError::Shutdown)?
    }

    /// Blocking form of [`ChainHandle::process_block`]. Must not be called
    /// from inside an async runtime.
    pub fn process_block_blocking(&self, block: Block) -> Result<bool, ChainError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .blocking_send(ChainRequest::ProcessBlock {
                block: Box::new(block),
                reply,
            })
            .map_err(|_| ChainError::Shutdown)?;
        response.blocking_recv().map_err(|_| ChainError::Shutdown)?
    }

    /// Lets queued work ahead of the request finish, then joins the worker.
    pub async fn shutdown(&self) -> Result<(), ChainError> {
        let _ = self.requests.send(ChainRequest::Shutdown).await;
        let Some(handle) = self.take_worker() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|err| ChainError::Worker(err.to_string()))?
            .map_err(|_| ChainError::Worker("chain worker panicked".to_string()))
    }

    pub fn shutdown_blocking(&self) -> Result<(), ChainError> {
        let _ = self.requests.blocking_send(ChainRequest::Shutdown);
        let Some(handle) = self.take_worker() else {
            return Ok(());
        };
        handle
            .join()
            .map_err(|_| ChainError::Worker("chain worker panicked".to_string()))
    }

    fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn tip(&self) -> ChainTip {
        *self.tip.borrow()
    }

    pub fn best_node(&self) -> Option<Arc<BlockNode>> {
        self.index.best_node()
    }

    pub fn best_height(&self) -> u64 {
        self.tip().height
    }

    pub fn best_hash(&self) -> Hash256 {
        self.tip().hash
    }

    pub fn get_node(&self, hash: &Hash256) -> Option<Arc<BlockNode>> {
        self.index.get_node(hash)
    }

    pub fn node_by_height(&self, height: u64) -> Option<Arc<BlockNode>> {
        self.index.node_by_height(height)
    }

    pub fn main_chain(&self) -> Vec<Arc<BlockNode>> {
        self.index.main_chain()
    }

    pub fn in_main_chain(&self, hash: &Hash256) -> bool {
        self.index.in_main_chain(hash)
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Block, ChainError> {
        self.store
            .get_block(hash)?
            .ok_or_else(|| ChainError::NotFound(format!("block {}", hash256_to_hex(hash))))
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Block, ChainError> {
        let not_found = || ChainError::NotFound(format!("block at height {height}"));
        if height > self.best_height() {
            return Err(not_found());
        }
        let node = self.index.node_by_height(height).ok_or_else(not_found)?;
        self.store.get_block(&node.hash)?.ok_or_else(not_found)
    }

    pub fn is_orphan(&self, hash: &Hash256) -> bool {
        self.orphans.exists(hash)
    }

    pub fn get_orphan(&self, hash: &Hash256) -> Option<Arc<Block>> {
        self.orphans.get(hash)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainNotification> {
        self.notify.subscribe()
    }

    /// Resolves once the main chain reaches `height`. Heights more than
    /// `max_wait_ahead` past the tip fail at once with `DistantFuture`.
    pub async fn wait_for_height(&self, height: u64) -> Result<ChainTip, ChainError> {
        let mut tip = self.tip.clone();
        loop {
            let current = *tip.borrow_and_update();
            if current.height >= height {
                return Ok(current);
            }
            if height > current.height.saturating_add(self.max_wait_ahead) {
                return Err(ChainError::DistantFuture {
                    height,
                    best: current.height,
                });
            }
            tip.changed().await.map_err(|_| ChainError::Shutdown)?;
        }
    }
}
