//! Structural block validation.
//!
//! Consensus rules that need script execution or a proof-of-work function
//! other than the compact-target comparison live behind [`BlockValidator`];
//! the chain only needs the per-transaction status a validator returns.

use std::collections::HashSet;

use btmd_consensus::money::money_range;
use btmd_pow::PowError;
use btmd_primitives::block::Block;
use btmd_primitives::merkle::merkle_root;
use btmd_primitives::transaction::Transaction;
use btmd_primitives::txstatus::TransactionStatus;
use rayon::prelude::*;

use crate::blockindex::BlockNode;

#[derive(Clone, Debug, Default)]
pub struct ValidationFlags {
    pub check_pow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidHeader(&'static str),
    InvalidBlock(&'static str),
    InvalidTransaction(&'static str),
    DuplicateTransaction,
    DuplicateSpend,
    MerkleMismatch,
    StatusMismatch,
    ValueOutOfRange,
    Pow(PowError),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidHeader(message) => write!(f, "{message}"),
            ValidationError::InvalidBlock(message) => write!(f, "{message}"),
            ValidationError::InvalidTransaction(message) => write!(f, "{message}"),
            ValidationError::DuplicateTransaction => write!(f, "duplicate transaction"),
            ValidationError::DuplicateSpend => write!(f, "output spent twice in block"),
            ValidationError::MerkleMismatch => write!(f, "transaction merkle root mismatch"),
            ValidationError::StatusMismatch => write!(f, "transaction status root mismatch"),
            ValidationError::ValueOutOfRange => write!(f, "output value out of range"),
            ValidationError::Pow(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<PowError> for ValidationError {
    fn from(err: PowError) -> Self {
        ValidationError::Pow(err)
    }
}

pub trait BlockValidator: Send + Sync {
    /// Checks `block` as a child of `parent` and returns the outcome of each
    /// of its transactions.
    fn validate_block(
        &self,
        block: &Block,
        parent: &BlockNode,
    ) -> Result<TransactionStatus, ValidationError>;
}

#[derive(Clone, Debug, Default)]
pub struct BasicValidator {
    flags: ValidationFlags,
}

impl BasicValidator {
    pub fn new(flags: ValidationFlags) -> Self {
        Self { flags }
    }
}

impl BlockValidator for BasicValidator {
    fn validate_block(
        &self,
        block: &Block,
        parent: &BlockNode,
    ) -> Result<TransactionStatus, ValidationError> {
        let header = &block.header;
        if header.version == 0 {
            return Err(ValidationError::InvalidHeader("block version is zero"));
        }
        if header.height != parent.height + 1 {
            return Err(ValidationError::InvalidHeader("block height does not follow parent"));
        }
        if header.previous_block_hash != parent.hash {
            return Err(ValidationError::InvalidHeader("previous block hash mismatch"));
        }
        if header.timestamp < parent.timestamp {
            return Err(ValidationError::InvalidHeader("block timestamp precedes parent"));
        }
        if self.flags.check_pow {
            btmd_pow::check_proof_of_work(&block.hash(), header.bits)?;
        }

        check_transactions(&block.transactions)?;

        let txids: Vec<_> = block.transactions.par_iter().map(Transaction::id).collect();
        let mut seen = HashSet::with_capacity(txids.len());
        if !txids.iter().all(|txid| seen.insert(*txid)) {
            return Err(ValidationError::DuplicateTransaction);
        }
        if merkle_root(&txids) != header.transactions_merkle_root {
            return Err(ValidationError::MerkleMismatch);
        }

        let status = TransactionStatus::all_succeeded(block.transactions.len());
        if status.merkle_root() != header.transaction_status_hash {
            return Err(ValidationError::StatusMismatch);
        }
        Ok(status)
    }
}

fn check_transactions(transactions: &[Transaction]) -> Result<(), ValidationError> {
    let Some(first) = transactions.first() else {
        return Err(ValidationError::InvalidBlock("block has no transactions"));
    };
    if !first.is_coinbase() {
        return Err(ValidationError::InvalidBlock("first transaction is not coinbase"));
    }
    let mut spent = HashSet::new();
    for (index, tx) in transactions.iter().enumerate() {
        if index > 0 && tx.inputs.iter().any(|input| input.is_coinbase()) {
            return Err(ValidationError::InvalidBlock("coinbase input outside first transaction"));
        }
        if tx.inputs.is_empty() {
            return Err(ValidationError::InvalidTransaction("transaction has no inputs"));
        }
        if tx.outputs.iter().any(|output| !money_range(output.amount)) {
            return Err(ValidationError::ValueOutOfRange);
        }
        for id in tx.spent_output_ids() {
            if !spent.insert(id) {
                return Err(ValidationError::DuplicateSpend);
            }
        }
    }
    Ok(())
}
