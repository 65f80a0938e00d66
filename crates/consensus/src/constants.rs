//! Chain-wide constants shared by the codec, chain state, and node.

/// Block header version produced by this implementation.
pub const BLOCK_VERSION: u64 = 1;
/// Transaction version produced by this implementation.
pub const TX_VERSION: u64 = 1;

/// Serialization flags prefixed to a full block on the wire.
pub const SER_BLOCK_FULL: u8 = 0x03;
/// Serialization flags prefixed to a transaction on the wire.
pub const SER_TX_FULL: u8 = 0x07;

/// Expected block production per day; sizes the main-chain slack.
pub const APPROX_NODES_PER_DAY: usize = 24 * 24;

/// Upper bound of block-processing requests buffered ahead of the chain worker.
pub const MAX_PROCESS_BLOCK_QUEUE: usize = 1024;

/// Default cap on blocks held in the orphan pool.
pub const DEFAULT_MAX_ORPHANS: usize = 1024;
/// Default lifetime of an orphan block before it is purged.
pub const DEFAULT_ORPHAN_TTL_SECS: u64 = 60 * 60;

/// Heights further than this past the tip are reported as the distant future.
pub const DEFAULT_MAX_WAIT_AHEAD: u64 = 1;

/// Capacity of the chain notification fan-out.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 256;
