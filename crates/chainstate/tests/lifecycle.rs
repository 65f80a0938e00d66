mod common;

use std::sync::Arc;
use std::time::Duration;

use btmd_chainstate::{genesis_block, ChainError, ChainHandle, ChainStore, Store};
use btmd_consensus::{chain_params, Network};
use btmd_storage::fjall::FjallStore;
use btmd_storage::memory::MemoryStore;
use btmd_storage::Column;
use common::*;

#[tokio::test]
async fn bootstrap_writes_one_stable_genesis() {
    let db = Arc::new(MemoryStore::new());
    let store = Arc::new(ChainStore::new(db.clone()));
    let chain = start_chain(store.clone());
    let root = genesis(&chain);

    assert_eq!(chain.best_height(), 0);
    assert_eq!(root.transactions.len(), 1);
    assert!(root.transactions[0].is_coinbase());
    assert_eq!(root.hash(), genesis_block(&regtest()).expect("genesis").0.hash());
    assert_eq!(db.len(Column::Block).expect("blocks"), 1);
    assert_eq!(db.len(Column::Utxo).expect("utxos"), 1);
    chain.shutdown().await.expect("shutdown");

    let restarted = start_chain(store);
    assert_eq!(restarted.best_hash(), root.hash());
    assert_eq!(db.len(Column::Block).expect("blocks"), 1);
}

#[tokio::test]
async fn resubmission_is_a_no_op() {
    let db = Arc::new(MemoryStore::new());
    let chain = start_chain(Arc::new(ChainStore::new(db.clone())));
    let root = genesis(&chain);
    let block = child(&root, EASY_BITS, "one");

    assert!(!chain.process_block(block.clone()).await.expect("first"));
    let nodes = chain.index().len();
    let utxos = db.len(Column::Utxo).expect("utxos");
    assert!(!chain.process_block(block.clone()).await.expect("second"));
    assert_eq!(chain.index().len(), nodes);
    assert_eq!(db.len(Column::Utxo).expect("utxos"), utxos);
    assert_eq!(chain.best_hash(), block.hash());
}

#[tokio::test]
async fn second_genesis_is_rejected() {
    let chain = start_chain(memory_store());
    let (mut other, _) = genesis_block(&chain_params(Network::Mainnet)).expect("genesis");
    other.header.nonce += 1;
    let err = chain.process_block(other).await.expect_err("second genesis");
    assert!(matches!(err, ChainError::Validation(_)));
}

#[tokio::test]
async fn concurrent_children_of_the_tip_are_all_indexed() {
    let chain = Arc::new(start_chain(memory_store()));
    let root = genesis(&chain);
    let before = chain.index().len();

    let mut tasks = Vec::new();
    for n in 0..16 {
        let chain = Arc::clone(&chain);
        let block = child(&root, EASY_BITS, &format!("racer{n}"));
        tasks.push(tokio::spawn(async move { chain.process_block(block).await }));
    }
    for task in tasks {
        assert!(!task.await.expect("join").expect("process"));
    }

    assert_eq!(chain.index().len(), before + 16);
    assert_eq!(chain.best_height(), 1);
    let tip = chain.best_node().expect("tip");
    assert_eq!(chain.node_by_height(1).map(|node| node.hash), Some(tip.hash));
    assert_eq!(tip.parent, Some(root.hash()));
}

#[tokio::test]
async fn height_queries_distinguish_missing_from_future() {
    let chain = Arc::new(start_chain(memory_store()));
    let root = genesis(&chain);

    assert!(chain.get_block_by_height(1).expect_err("beyond tip").is_not_found());
    assert!(matches!(
        chain.wait_for_height(2).await,
        Err(ChainError::DistantFuture { height: 2, best: 0 })
    ));

    let waiter = {
        let chain = Arc::clone(&chain);
        tokio::spawn(async move { chain.wait_for_height(1).await })
    };
    let block = child(&root, EASY_BITS, "one");
    chain.process_block(block.clone()).await.expect("process");
    let tip = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter finished")
        .expect("join")
        .expect("tip");
    assert_eq!(tip.hash, block.hash());
    assert_eq!(chain.get_block_by_height(1).expect("block").hash(), block.hash());
    assert!(chain.get_block(&[3u8; 32]).expect_err("unknown").is_not_found());
}

#[tokio::test]
async fn shutdown_is_idempotent_and_refuses_new_work() {
    let chain = start_chain(memory_store());
    let root = genesis(&chain);
    chain.shutdown().await.expect("shutdown");
    chain.shutdown().await.expect("second shutdown");

    let err = chain
        .process_block(child(&root, EASY_BITS, "late"))
        .await
        .expect_err("stopped");
    assert!(matches!(err, ChainError::Shutdown));
}

#[test]
fn blocking_api_works_outside_a_runtime() {
    let chain = start_chain(memory_store());
    let root = genesis(&chain);
    let block = child(&root, EASY_BITS, "sync");
    assert!(!chain.process_block_blocking(block.clone()).expect("process"));
    assert_eq!(chain.best_hash(), block.hash());
    chain.shutdown_blocking().expect("shutdown");
    assert!(matches!(
        chain.process_block_blocking(child(&block, EASY_BITS, "sync")),
        Err(ChainError::Shutdown)
    ));
}

#[test]
fn chain_survives_reopening_a_fjall_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let params = regtest();
    let blocks;
    {
        let db = Arc::new(FjallStore::open(dir.path()).expect("open"));
        let store: Arc<dyn Store> = Arc::new(ChainStore::new(db.clone()));
        let chain = start_chain(store);
        let root = genesis(&chain);
        blocks = extend(&root, 3, EASY_BITS, "disk");
        for block in &blocks {
            assert!(!chain.process_block_blocking(block.clone()).expect("process"));
        }
        chain.shutdown_blocking().expect("shutdown");
        db.persist().expect("persist");
    }

    let db = FjallStore::open(dir.path()).expect("reopen");
    let chain = ChainHandle::start(
        Arc::new(ChainStore::new(db)),
        &params,
        btmd_chainstate::ChainConfig::from_params(&params),
    )
    .expect("restart");
    assert_eq!(chain.best_hash(), blocks[2].hash());
    assert_eq!(chain.index().len(), 4);
    for (offset, block) in blocks.iter().enumerate() {
        assert_eq!(
            chain.node_by_height(offset as u64 + 1).map(|node| node.hash),
            Some(block.hash())
        );
    }
    chain.shutdown_blocking().expect("shutdown");
}

#[tokio::test]
async fn store_from_another_network_is_refused() {
    let store = memory_store();
    let chain = start_chain(store.clone());
    chain.shutdown().await.expect("shutdown");

    let mainnet = chain_params(Network::Mainnet);
    let err = ChainHandle::start(store, &mainnet, btmd_chainstate::ChainConfig::from_params(&mainnet))
        .err()
        .expect("refused");
    assert!(matches!(err, ChainError::Corrupt(_)));
}
