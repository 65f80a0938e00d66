mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use btmd_chainstate::{
    BlockIndex, BlockNode, BlockStoreState, ChainError, ChainNotification, Store, UtxoEntry,
    UtxoViewpoint,
};
use btmd_chainstate::undo::BlockUndo;
use btmd_consensus::Hash256;
use btmd_primitives::block::Block;
use btmd_primitives::transaction::TxOutput;
use btmd_primitives::txstatus::TransactionStatus;
use btmd_storage::StoreError;
use common::*;

#[tokio::test]
async fn reorg_restores_spent_outputs_and_drops_orphaned_ones() {
    let store = memory_store();
    let chain = start_chain(store.clone());
    let root = genesis(&chain);

    let funding = child(&root, EASY_BITS, "fund");
    let funded_id = funding.transactions[0].output_id(0).expect("funded output");
    let payment = spend(&funding.transactions[0], 0, vec![TxOutput::new(40_000, vec![0x52])]);
    let paid_id = payment.output_id(0).expect("paid output");
    let spender = child_with(&funding, EASY_BITS, "spend", vec![payment]);
    submit_all(&chain, &[funding.clone(), spender.clone()]).await;

    assert!(store.get_utxo(&funded_id).expect("read").is_none());
    assert!(store.get_utxo(&paid_id).expect("read").is_some());
    assert!(store.get_block_undo(&spender.hash()).expect("read").is_some());

    let side = extend(&funding, 2, EASY_BITS, "side");
    submit_all(&chain, &side).await;
    assert_eq!(chain.best_hash(), side[1].hash());

    let restored = store.get_utxo(&funded_id).expect("read").expect("funded output back");
    assert!(!restored.spent);
    assert_eq!(restored.block_height, 1);
    assert!(restored.is_coinbase);
    assert!(store.get_utxo(&paid_id).expect("read").is_none());
    let spender_coinbase = spender.transactions[0].output_id(0).expect("coinbase output");
    assert!(store.get_utxo(&spender_coinbase).expect("read").is_none());
    assert!(store.get_block_undo(&spender.hash()).expect("read").is_none());
    assert_eq!(
        store.get_store_status().expect("status"),
        Some(BlockStoreState {
            height: 3,
            hash: side[1].hash()
        })
    );
}

#[tokio::test]
async fn double_spend_on_main_chain_leaves_tip_alone() {
    let store = memory_store();
    let chain = start_chain(store.clone());
    let root = genesis(&chain);

    let funding = child(&root, EASY_BITS, "fund");
    let payment = spend(&funding.transactions[0], 0, vec![TxOutput::new(1, vec![0x52])]);
    let first = child_with(&funding, EASY_BITS, "first", vec![payment.clone()]);
    submit_all(&chain, &[funding, first.clone()]).await;

    let mut again = payment;
    again.time_range = 1;
    let second = child_with(&first, EASY_BITS, "second", vec![again]);
    let err = chain.process_block(second).await.expect_err("double spend");
    assert!(matches!(err, ChainError::MissingUtxo(_)), "{err}");
    assert_eq!(chain.best_hash(), first.hash());
    assert_eq!(store.get_store_status().expect("status").map(|s| s.height), Some(2));
}

#[tokio::test]
async fn notifications_follow_the_reorg() {
    let chain = start_chain(memory_store());
    let root = genesis(&chain);
    let mut events = chain.subscribe();

    let main = child(&root, EASY_BITS, "main");
    submit_all(&chain, std::slice::from_ref(&main)).await;
    let side = extend(&root, 2, EASY_BITS, "side");
    submit_all(&chain, &side).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            ChainNotification::BlockConnected {
                hash: main.hash(),
                height: 1
            },
            ChainNotification::BlockDisconnected {
                hash: main.hash(),
                height: 1
            },
            ChainNotification::BlockConnected {
                hash: side[0].hash(),
                height: 1
            },
            ChainNotification::BlockConnected {
                hash: side[1].hash(),
                height: 2
            },
        ]
    );
}

#[tokio::test]
async fn readers_never_see_a_partial_reorg() {
    let chain = Arc::new(start_chain(memory_store()));
    let root = genesis(&chain);

    let main = extend(&root, 3, EASY_BITS, "main");
    let branches: Vec<Vec<Block>> = (0..8)
        .map(|round| extend(&root, 4 + round, EASY_BITS, &format!("branch{round}")))
        .collect();
    let mut tips: HashSet<Hash256> = main.iter().map(Block::hash).collect();
    tips.insert(root.hash());
    tips.extend(branches.iter().filter_map(|branch| branch.last().map(Block::hash)));

    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let chain = Arc::clone(&chain);
        let stop = Arc::clone(&stop);
        let genesis_hash = root.hash();
        thread::spawn(move || {
            let mut samples = 0usize;
            while !stop.load(Ordering::SeqCst) || samples == 0 {
                let snapshot = chain.main_chain();
                assert_eq!(snapshot.first().map(|node| node.hash), Some(genesis_hash));
                for (height, node) in snapshot.iter().enumerate() {
                    assert_eq!(node.height, height as u64);
                    if height > 0 {
                        assert_eq!(node.parent, Some(snapshot[height - 1].hash));
                    }
                }
                let tip = snapshot.last().map(|node| node.hash).expect("tip");
                assert!(tips.contains(&tip), "tip outside any committed chain");
                samples += 1;
            }
            samples
        })
    };

    submit_all(&chain, &main).await;
    for branch in &branches {
        submit_all(&chain, branch).await;
        assert_eq!(chain.best_hash(), branch.last().map(Block::hash).expect("tip"));
    }
    stop.store(true, Ordering::SeqCst);
    let samples = reader.join().expect("reader saw a consistent chain");
    assert!(samples > 0);

    let last = branches.last().expect("branches");
    let snapshot = chain.main_chain();
    assert_eq!(snapshot.len(), last.len() + 1);
    for (node, block) in snapshot.iter().skip(1).zip(last) {
        assert_eq!(node.hash, block.hash());
        assert_eq!(chain.node_by_height(node.height).map(|n| n.hash), Some(node.hash));
    }
}

/// Delegates to a real store but can refuse to commit a new tip.
struct FlakyStore {
    inner: Arc<dyn Store>,
    fail_commit: AtomicBool,
}

impl Store for FlakyStore {
    fn block_exist(&self, hash: &Hash256) -> Result<bool, ChainError> {
        self.inner.block_exist(hash)
    }

    fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        self.inner.get_block(hash)
    }

    fn get_store_status(&self) -> Result<Option<BlockStoreState>, ChainError> {
        self.inner.get_store_status()
    }

    fn get_transaction_status(&self, hash: &Hash256) -> Result<Option<TransactionStatus>, ChainError> {
        self.inner.get_transaction_status(hash)
    }

    fn get_utxo(&self, id: &Hash256) -> Result<Option<UtxoEntry>, ChainError> {
        self.inner.get_utxo(id)
    }

    fn get_block_undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>, ChainError> {
        self.inner.get_block_undo(hash)
    }

    fn load_block_index(&self) -> Result<BlockIndex, ChainError> {
        self.inner.load_block_index()
    }

    fn save_block(&self, block: &Block, status: &TransactionStatus) -> Result<(), ChainError> {
        self.inner.save_block(block, status)
    }

    fn save_chain_status(&self, node: &BlockNode, view: &UtxoViewpoint) -> Result<(), ChainError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()).into());
        }
        self.inner.save_chain_status(node, view)
    }
}

#[tokio::test]
async fn failed_commit_keeps_previous_tip() {
    let inner = memory_store();
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        fail_commit: AtomicBool::new(false),
    });
    let chain = start_chain(store.clone());
    let root = genesis(&chain);
    let main = child(&root, EASY_BITS, "main");
    submit_all(&chain, std::slice::from_ref(&main)).await;

    store.fail_commit.store(true, Ordering::SeqCst);
    let next = child(&main, EASY_BITS, "main");
    let err = chain.process_block(next).await.expect_err("commit fails");
    assert!(matches!(err, ChainError::Store(_)));
    assert_eq!(chain.best_hash(), main.hash());
    assert_eq!(chain.node_by_height(2), None);
    assert_eq!(inner.get_store_status().expect("status").map(|s| s.hash), Some(main.hash()));

    let side = extend(&root, 2, EASY_BITS, "side");
    assert!(chain.process_block(side[0].clone()).await.is_ok());
    let err = chain.process_block(side[1].clone()).await.expect_err("reorg commit fails");
    assert!(matches!(err, ChainError::Store(_)));
    assert_eq!(chain.best_hash(), main.hash());
    assert_eq!(chain.node_by_height(1).map(|node| node.hash), Some(main.hash()));
}
