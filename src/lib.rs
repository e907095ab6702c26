//! shardcache - A sharded, thread-safe in-process cache
//!
//! Provides per-item TTL, optional renew-on-read, eviction notifications and
//! a background sweep that reclaims expired items.
//!
//! ```no_run
//! use std::time::Duration;
//! use shardcache::{Cache, Config, Ttl};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> shardcache::error::Result<()> {
//! let shutdown = CancellationToken::new();
//! let config = Config::default()
//!     .with_default_ttl(Ttl::After(Duration::from_secs(1)))
//!     .with_sweep_interval(Duration::from_millis(500))
//!     .with_on_evicted(|key, value: u64| println!("evicted {key}={value}"));
//! let cache = Cache::new(config, shutdown.clone())?;
//!
//! cache.set("a", 1)?;
//! assert_eq!(cache.get("a")?, 1);
//! shutdown.cancel();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{Cache, CacheStats, Expiration, Ttl, PARTITION_COUNT};
pub use config::Config;
pub use error::CacheError;
