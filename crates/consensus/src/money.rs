//! Monetary units.

pub type Amount = u64;

/// Smallest units per coin.
pub const COIN: Amount = 100_000_000;

/// Coinbase subsidy paid by the genesis block.
pub const INITIAL_BLOCK_SUBSIDY: Amount = 140_700_041_250_000_000;

/// No single output may carry more than this.
pub const MAX_MONEY: Amount = 21_000_000_000 * COIN;

pub fn money_range(value: Amount) -> bool {
    value <= MAX_MONEY
}
