//! Block and transaction types, their wire encoding, and content hashing.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod merkle;
pub mod preimage;
pub mod transaction;
pub mod txstatus;

pub use block::{Block, BlockHeader};
pub use hash::{sha256, sha256d};
pub use merkle::merkle_root;
pub use preimage::{entry_id, HashWriter, WriteForHash};
pub use transaction::{SpendInput, Transaction, TxInput, TxOutput};
pub use txstatus::TransactionStatus;
