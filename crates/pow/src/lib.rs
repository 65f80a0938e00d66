//! Compact difficulty targets and per-block work.

pub mod difficulty;

pub use difficulty::{block_proof, check_proof_of_work, CompactError, PowError};
