mod common;

use common::*;
use primitive_types::U256;

#[tokio::test]
async fn heavier_taller_branch_wins_and_lighter_taller_does_not() {
    let chain = start_chain(memory_store());
    let root = genesis(&chain);

    let a = extend(&root, 10, HARD_BITS, "a");
    submit_all(&chain, &a).await;
    assert_eq!(chain.best_hash(), a[9].hash());
    let a_work = chain.best_node().expect("tip").work_sum;
    assert_eq!(a_work, U256::from(2 + 10 * 256u64));

    let b = extend(&root, 12, EASY_BITS, "b");
    submit_all(&chain, &b).await;
    assert_eq!(chain.best_hash(), a[9].hash());
    assert_eq!(chain.best_height(), 10);

    let c = extend(&root, 11, HARD_BITS, "c");
    submit_all(&chain, &c[..10]).await;
    assert_eq!(chain.best_hash(), a[9].hash());

    submit_all(&chain, &c[10..]).await;
    assert_eq!(chain.best_hash(), c[10].hash());
    assert_eq!(chain.best_height(), 11);
    for (offset, block) in c.iter().enumerate() {
        let node = chain.node_by_height(offset as u64 + 1).expect("main chain node");
        assert_eq!(node.hash, block.hash());
    }
    assert!(a.iter().all(|block| !chain.in_main_chain(&block.hash())));
    assert!(chain.get_node(&a[9].hash()).is_some());
}

#[tokio::test]
async fn equal_height_with_more_work_stays_dormant() {
    let chain = start_chain(memory_store());
    let root = genesis(&chain);
    let main = child(&root, EASY_BITS, "main");
    submit_all(&chain, std::slice::from_ref(&main)).await;

    let side = child(&root, HARD_BITS, "side");
    submit_all(&chain, std::slice::from_ref(&side)).await;
    let side_node = chain.get_node(&side.hash()).expect("side node");
    assert!(side_node.work_sum > chain.best_node().expect("tip").work_sum);
    assert_eq!(chain.best_hash(), main.hash());
}

#[tokio::test]
async fn taller_branch_with_equal_work_displaces_tip() {
    let chain = start_chain(memory_store());
    let root = genesis(&chain);
    let main = child(&root, DOUBLE_BITS, "main");
    submit_all(&chain, std::slice::from_ref(&main)).await;

    let side = extend(&root, 2, EASY_BITS, "side");
    submit_all(&chain, &side[..1]).await;
    assert_eq!(chain.best_hash(), main.hash());

    submit_all(&chain, &side[1..]).await;
    let tip = chain.best_node().expect("tip");
    assert_eq!(tip.hash, side[1].hash());
    assert_eq!(tip.work_sum, U256::from(6u64));
    assert_eq!(chain.node_by_height(1).map(|node| node.hash), Some(side[0].hash()));
}

#[tokio::test]
async fn taller_branch_with_less_work_is_ignored() {
    let chain = start_chain(memory_store());
    let root = genesis(&chain);
    let main = child(&root, HARD_BITS, "main");
    submit_all(&chain, std::slice::from_ref(&main)).await;

    let side = extend(&root, 2, EASY_BITS, "side");
    submit_all(&chain, &side).await;
    assert_eq!(chain.best_hash(), main.hash());
    assert_eq!(chain.best_height(), 1);
}

#[tokio::test]
async fn shorter_branch_with_more_work_is_ignored() {
    let chain = start_chain(memory_store());
    let root = genesis(&chain);
    let main = extend(&root, 3, EASY_BITS, "main");
    submit_all(&chain, &main).await;

    let side = extend(&root, 2, HARD_BITS, "side");
    submit_all(&chain, &side).await;
    assert!(chain.get_node(&side[1].hash()).expect("side").work_sum > U256::from(8u64));
    assert_eq!(chain.best_hash(), main[2].hash());
}

#[tokio::test]
async fn known_parent_accumulates_work() {
    let chain = start_chain(memory_store());
    let root = genesis(&chain);
    let block = child(&root, DOUBLE_BITS, "one");
    assert!(!chain.process_block(block.clone()).await.expect("process"));
    let node = chain.get_node(&block.hash()).expect("node");
    let parent = chain.get_node(&root.hash()).expect("genesis node");
    assert_eq!(node.work_sum, parent.work_sum + U256::from(4u64));
    assert_eq!(node.parent, Some(root.hash()));
    assert_eq!(node.height, 1);
}
