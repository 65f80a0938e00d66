//! Consensus constants, chain parameters, and genesis definitions.

pub mod constants;
pub mod money;
pub mod params;

pub use params::{
    bytes_from_hex, chain_params, hash256_from_hex, hash256_to_hex, ChainParams, GenesisParams,
    HexError, Network,
};

pub type Hash256 = [u8; 32];
