#![allow(dead_code)]

use std::sync::Arc;

use btmd_chainstate::{ChainConfig, ChainHandle, ChainStore, Store};
use btmd_consensus::{chain_params, ChainParams, Network};
use btmd_primitives::block::{Block, BlockHeader};
use btmd_primitives::transaction::{SpendInput, Transaction, TxInput, TxOutput};
use btmd_primitives::txstatus::TransactionStatus;
use btmd_storage::memory::MemoryStore;

/// Work 2 per block.
pub const EASY_BITS: u32 = 0x207f_ffff;
/// Work 4 per block.
pub const DOUBLE_BITS: u32 = 0x203f_ffff;
/// Work 256 per block.
pub const HARD_BITS: u32 = 0x2000_ffff;

pub fn regtest() -> ChainParams {
    chain_params(Network::Regtest)
}

pub fn memory_store() -> Arc<ChainStore<Arc<MemoryStore>>> {
    Arc::new(ChainStore::new(Arc::new(MemoryStore::new())))
}

pub fn start_chain(store: Arc<dyn Store>) -> ChainHandle {
    let params = regtest();
    ChainHandle::start(store, &params, ChainConfig::from_params(&params)).expect("start chain")
}

pub fn genesis(chain: &ChainHandle) -> Block {
    chain.get_block_by_height(0).expect("genesis block")
}

pub fn coinbase(tag: &str, height: u64) -> Transaction {
    Transaction {
        version: 1,
        time_range: 0,
        inputs: vec![TxInput::coinbase(format!("{tag}:{height}").into_bytes())],
        outputs: vec![TxOutput::new(50_000, vec![0x51])],
    }
}

pub fn spend(source: &Transaction, position: usize, outputs: Vec<TxOutput>) -> Transaction {
    let output = &source.outputs[position];
    Transaction {
        version: 1,
        time_range: 0,
        inputs: vec![TxInput::Spend(SpendInput {
            source_id: source.id(),
            source_position: position as u64,
            amount: output.amount,
            control_program: output.control_program.clone(),
            arguments: Vec::new(),
            suffix: Vec::new(),
        })],
        outputs,
    }
}

/// A committed child of `parent` carrying a coinbase tagged with `tag` and
/// then `extra` transactions.
pub fn child_with(parent: &Block, bits: u32, tag: &str, extra: Vec<Transaction>) -> Block {
    let height = parent.height() + 1;
    let mut transactions = vec![coinbase(tag, height)];
    transactions.extend(extra);
    let mut block = Block {
        header: BlockHeader {
            version: 1,
            height,
            previous_block_hash: parent.hash(),
            timestamp: parent.header.timestamp + 1,
            nonce: 0,
            bits,
            transactions_merkle_root: [0u8; 32],
            transaction_status_hash: [0u8; 32],
        },
        transactions,
    };
    block.commit(&TransactionStatus::all_succeeded(block.transactions.len()));
    block
}

pub fn child(parent: &Block, bits: u32, tag: &str) -> Block {
    child_with(parent, bits, tag, Vec::new())
}

pub fn extend(parent: &Block, count: usize, bits: u32, tag: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(count);
    for _ in 0..count {
        let next = child(blocks.last().unwrap_or(parent), bits, tag);
        blocks.push(next);
    }
    blocks
}

pub async fn submit_all(chain: &ChainHandle, blocks: &[Block]) {
    for block in blocks {
        let orphan = chain.process_block(block.clone()).await.expect("process block");
        assert!(!orphan, "block at height {} was orphaned", block.height());
    }
}
