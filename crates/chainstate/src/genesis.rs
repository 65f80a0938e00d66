use btmd_consensus::constants::TX_VERSION;
use btmd_consensus::{bytes_from_hex, ChainParams};
use btmd_primitives::block::{Block, BlockHeader};
use btmd_primitives::transaction::{Transaction, TxInput, TxOutput};
use btmd_primitives::txstatus::TransactionStatus;

use crate::blockindex::BlockNode;
use crate::error::ChainError;
use crate::store::Store;
use crate::utxo::UtxoViewpoint;

/// Builds the genesis block of `params` with its commitments filled in.
pub fn genesis_block(params: &ChainParams) -> Result<(Block, TransactionStatus), ChainError> {
    let genesis = &params.genesis;
    let control_program = bytes_from_hex(genesis.control_program_hex)
        .map_err(|_| ChainError::Corrupt("genesis control program is not hex"))?;
    let coinbase = Transaction {
        version: TX_VERSION,
        time_range: 0,
        inputs: vec![TxInput::coinbase(genesis.coinbase_arbitrary.as_bytes())],
        outputs: vec![TxOutput::new(genesis.subsidy, control_program)],
    };
    let mut block = Block {
        header: BlockHeader {
            version: genesis.version,
            height: 0,
            previous_block_hash: [0u8; 32],
            timestamp: genesis.timestamp,
            nonce: genesis.nonce,
            bits: genesis.bits,
            transactions_merkle_root: [0u8; 32],
            transaction_status_hash: [0u8; 32],
        },
        transactions: vec![coinbase],
    };
    let status = TransactionStatus::all_succeeded(block.transactions.len());
    block.commit(&status);
    Ok((block, status))
}

/// Persists and connects the genesis block when the store has no chain yet.
/// Returns whether anything was written.
pub fn ensure_genesis(store: &dyn Store, params: &ChainParams) -> Result<bool, ChainError> {
    if store.get_store_status()?.is_some() {
        return Ok(false);
    }
    let (block, status) = genesis_block(params)?;
    let node = BlockNode::new(&block.header, None)?;
    store.save_block(&block, &status)?;
    let mut view = UtxoViewpoint::new();
    view.apply_block(&block, &status)?;
    store.save_chain_status(&node, &view)?;
    btmd_log::log_info!(
        "initialized {} chain at genesis {}",
        params.network,
        btmd_consensus::hash256_to_hex(&node.hash)
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use btmd_consensus::{chain_params, Network};

    #[test]
    fn genesis_is_deterministic_per_network() {
        let (main, status) = genesis_block(&chain_params(Network::Mainnet)).expect("main");
        let (again, _) = genesis_block(&chain_params(Network::Mainnet)).expect("again");
        let (test, _) = genesis_block(&chain_params(Network::Testnet)).expect("test");
        assert_eq!(main.hash(), again.hash());
        assert_ne!(main.hash(), test.hash());
        assert_eq!(main.header.transactions_merkle_root, main.compute_merkle_root());
        assert_eq!(main.header.transaction_status_hash, status.merkle_root());
        assert!(main.transactions[0].is_coinbase());
    }
}
