//! Chain state: block index, orphan pool, UTXO views and the chain worker
//! that orders every block-acceptance decision.

pub mod blockindex;
pub mod chain;
pub mod error;
pub mod genesis;
pub mod orphan;
pub mod store;
pub mod undo;
pub mod utxo;
pub mod validation;

pub use blockindex::{BlockIndex, BlockNode, ReorgPath};
pub use chain::{ChainConfig, ChainHandle, ChainNotification, ChainTip};
pub use error::ChainError;
pub use genesis::{ensure_genesis, genesis_block};
pub use orphan::OrphanManage;
pub use store::{BlockStoreState, ChainStore, Store};
pub use utxo::{UtxoEntry, UtxoViewpoint};
pub use validation::{BasicValidator, BlockValidator, ValidationError, ValidationFlags};
