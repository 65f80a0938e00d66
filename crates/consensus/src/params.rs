//! Network and chain parameter definitions.

use std::fmt;
use std::str::FromStr;

use crate::constants::{
    BLOCK_VERSION, DEFAULT_MAX_ORPHANS, DEFAULT_MAX_WAIT_AHEAD, DEFAULT_ORPHAN_TTL_SECS,
    MAX_PROCESS_BLOCK_QUEUE,
};
use crate::money::{Amount, INITIAL_BLOCK_SUBSIDY};
use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" | "solonet" => Ok(Network::Regtest),
            other => Err(format!("unknown network '{other}'")),
        }
    }
}

/// Fixed inputs of the genesis block. Everything else (commitments, hash)
/// is derived from these.
#[derive(Clone, Debug)]
pub struct GenesisParams {
    pub version: u64,
    pub timestamp: u64,
    pub nonce: u64,
    pub bits: u32,
    pub coinbase_arbitrary: &'static str,
    pub control_program_hex: &'static str,
    pub subsidy: Amount,
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub genesis: GenesisParams,
    pub data_dir_name: &'static str,
    pub queue_capacity: usize,
    pub max_orphans: usize,
    pub orphan_ttl_secs: u64,
    pub max_wait_ahead: u64,
}

pub fn chain_params(network: Network) -> ChainParams {
    match network {
        Network::Mainnet => mainnet_chain_params(),
        Network::Testnet => testnet_chain_params(),
        Network::Regtest => regtest_chain_params(),
    }
}

const GENESIS_ARBITRARY: &str =
    "Information is power. -- Jan/11/2013. Computing is power. -- Apr/24/2018.";
const GENESIS_CONTROL_PROGRAM: &str = "00148c9d063ff74ee6d9ffa88d83aeb038068366c4c4";

fn genesis_params(bits: u32) -> GenesisParams {
    GenesisParams {
        version: BLOCK_VERSION,
        timestamp: 1_524_549_600,
        nonce: 9_253_507_043_297,
        bits,
        coinbase_arbitrary: GENESIS_ARBITRARY,
        control_program_hex: GENESIS_CONTROL_PROGRAM,
        subsidy: INITIAL_BLOCK_SUBSIDY,
    }
}

fn mainnet_chain_params() -> ChainParams {
    ChainParams {
        network: Network::Mainnet,
        genesis: genesis_params(0x1d00_ffff),
        data_dir_name: "mainnet",
        queue_capacity: MAX_PROCESS_BLOCK_QUEUE,
        max_orphans: DEFAULT_MAX_ORPHANS,
        orphan_ttl_secs: DEFAULT_ORPHAN_TTL_SECS,
        max_wait_ahead: DEFAULT_MAX_WAIT_AHEAD,
    }
}

fn testnet_chain_params() -> ChainParams {
    ChainParams {
        network: Network::Testnet,
        genesis: genesis_params(0x1e00_ffff),
        data_dir_name: "testnet",
        ..mainnet_chain_params()
    }
}

fn regtest_chain_params() -> ChainParams {
    ChainParams {
        network: Network::Regtest,
        genesis: genesis_params(0x207f_ffff),
        data_dir_name: "regtest",
        max_orphans: 64,
        orphan_ttl_secs: 10 * 60,
        ..mainnet_chain_params()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HexError::InvalidLength => write!(f, "invalid hex length"),
            HexError::InvalidHex => write!(f, "invalid hex character"),
        }
    }
}

impl std::error::Error for HexError {}

pub fn bytes_from_hex(input: &str) -> Result<Vec<u8>, HexError> {
    let hex = input.trim();
    let hex = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    if hex.len() % 2 == 1 {
        return Err(HexError::InvalidLength);
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    for start in (0..hex.len()).step_by(2) {
        let pair = hex.get(start..start + 2).ok_or(HexError::InvalidHex)?;
        let byte = u8::from_str_radix(pair, 16).map_err(|_| HexError::InvalidHex)?;
        out.push(byte);
    }
    Ok(out)
}

/// Parses a 64-character hex string in display order into a hash.
pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let bytes = bytes_from_hex(input)?;
    if bytes.len() != 32 {
        return Err(HexError::InvalidLength);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub fn hash256_to_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
