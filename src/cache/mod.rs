//! Cache Module
//!
//! Sharded in-memory cache with per-item TTL, renew-on-read and eviction
//! notifications.

mod entry;
mod partition;
mod stats;
pub(crate) mod store;


// Re-export public types
pub use entry::{Expiration, Ttl};
pub use stats::CacheStats;
pub use store::Cache;

// == Public Constants ==
/// Number of independently locked partitions
pub const PARTITION_COUNT: usize = 128;

/// Default partition hash: the key's final byte, masked into `[0, 128)`.
///
/// The empty key maps to partition 0; the cache rejects it before hashing.
pub fn default_hash(key: &str) -> u8 {
    key.as_bytes().last().map_or(0, |b| b & 0x7F)
}
