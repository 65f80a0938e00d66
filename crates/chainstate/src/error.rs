use btmd_consensus::{hash256_to_hex, Hash256};
use btmd_storage::StoreError;

use crate::validation::ValidationError;

#[derive(Debug)]
pub enum ChainError {
    Validation(ValidationError),
    Store(StoreError),
    NotFound(String),
    DistantFuture { height: u64, best: u64 },
    MissingUtxo(Hash256),
    AlreadySpent(Hash256),
    OutputExists(Hash256),
    UnspentRevert(Hash256),
    MissingUndo(Hash256),
    MissingTransactionStatus(Hash256),
    Corrupt(&'static str),
    Worker(String),
    Shutdown,
}

impl ChainError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::NotFound(_))
    }
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::Validation(err) => write!(f, "invalid block: {err}"),
            ChainError::Store(err) => write!(f, "store: {err}"),
            ChainError::NotFound(what) => write!(f, "{what} not found"),
            ChainError::DistantFuture { height, best } => {
                write!(f, "height {height} is too far beyond the tip at {best}")
            }
            ChainError::MissingUtxo(id) => write!(f, "missing utxo {}", hash256_to_hex(id)),
            ChainError::AlreadySpent(id) => write!(f, "utxo {} already spent", hash256_to_hex(id)),
            ChainError::OutputExists(id) => {
                write!(f, "output {} created twice", hash256_to_hex(id))
            }
            ChainError::UnspentRevert(id) => {
                write!(f, "cannot revert spend of unspent utxo {}", hash256_to_hex(id))
            }
            ChainError::MissingUndo(hash) => {
                write!(f, "missing undo data for block {}", hash256_to_hex(hash))
            }
            ChainError::MissingTransactionStatus(hash) => {
                write!(f, "missing transaction status for block {}", hash256_to_hex(hash))
            }
            ChainError::Corrupt(message) => write!(f, "corrupt chain state: {message}"),
            ChainError::Worker(message) => write!(f, "chain worker: {message}"),
            ChainError::Shutdown => write!(f, "chain is shutting down"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<ValidationError> for ChainError {
    fn from(err: ValidationError) -> Self {
        ChainError::Validation(err)
    }
}

impl From<StoreError> for ChainError {
    fn from(err: StoreError) -> Self {
        ChainError::Store(err)
    }
}
