//! Configuration Module
//!
//! Construction options for a cache, with defaults and environment loading.

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::Ttl;

/// Maps a key to a partition index. The result is reduced modulo the
/// partition count, so any `u8` is accepted.
pub type HashFn = Arc<dyn Fn(&str) -> u8 + Send + Sync>;

/// Called with the key and value of every item that leaves the cache through
/// delete, overwrite, flush or expiry.
pub type EvictFn<V> = Arc<dyn Fn(&str, V) + Send + Sync>;

/// Item lifetime used by `from_env` when `CACHE_DEFAULT_TTL_MS` is unset.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Sweep interval used by `from_env` when `CACHE_SWEEP_INTERVAL_MS` is unset.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Cache construction parameters.
///
/// `Config::default()` sets no options: items never expire and no sweep
/// runs, so a cache built from it needs no Tokio runtime. Plain values can be
/// loaded from environment variables; the hash and the eviction callback are
/// set in code.
pub struct Config<V> {
    /// Lifetime given to items written without an explicit TTL
    pub default_ttl: Ttl,
    /// Interval between background sweeps, zero disables the sweep task
    pub sweep_interval: Duration,
    /// Whether reads push an item's expiration forward
    pub renew_on_get: bool,
    /// Partition hash, None uses the key's last byte
    pub hash: Option<HashFn>,
    /// Eviction notification callback
    pub on_evicted: Option<EvictFn<V>>,
}

impl<V> Config<V> {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds, 0 means never expire (default: 300000)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweep interval in milliseconds, 0 disables (default: 1000)
    /// - `CACHE_RENEW_ON_GET` - `true`, `1` or `yes` to renew on read (default: false)
    pub fn from_env() -> Self {
        let default_ttl = env::var("CACHE_DEFAULT_TTL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(|ms| Ttl::from_duration(Duration::from_millis(ms)))
            .unwrap_or(Ttl::After(DEFAULT_TTL));
        let sweep_interval = env::var("CACHE_SWEEP_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);
        let renew_on_get = env::var("CACHE_RENEW_ON_GET")
            .ok()
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        Self {
            default_ttl,
            sweep_interval,
            renew_on_get,
            hash: None,
            on_evicted: None,
        }
    }

    /// Sets the default item lifetime. A zero duration means `Ttl::Never`.
    pub fn with_default_ttl(mut self, ttl: Ttl) -> Self {
        self.default_ttl = ttl.normalized();
        self
    }

    /// Sets the sweep interval; zero disables the sweep task.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Enables or disables renew-on-read.
    pub fn with_renew_on_get(mut self, renew: bool) -> Self {
        self.renew_on_get = renew;
        self
    }

    /// Sets a custom partition hash.
    pub fn with_hash<F>(mut self, hash: F) -> Self
    where
        F: Fn(&str) -> u8 + Send + Sync + 'static,
    {
        self.hash = Some(Arc::new(hash));
        self
    }

    /// Sets the eviction callback.
    ///
    /// Every removed item is reported as long as the callback returns
    /// normally. If it panics, the remaining notifications of that batch are
    /// dropped; the items themselves are already gone.
    pub fn with_on_evicted<F>(mut self, on_evicted: F) -> Self
    where
        F: Fn(&str, V) + Send + Sync + 'static,
    {
        self.on_evicted = Some(Arc::new(on_evicted));
        self
    }
}

impl<V> Default for Config<V> {
    fn default() -> Self {
        Self {
            default_ttl: Ttl::Never,
            sweep_interval: Duration::ZERO,
            renew_on_get: false,
            hash: None,
            on_evicted: None,
        }
    }
}

impl<V> Clone for Config<V> {
    fn clone(&self) -> Self {
        Self {
            default_ttl: self.default_ttl,
            sweep_interval: self.sweep_interval,
            renew_on_get: self.renew_on_get,
            hash: self.hash.clone(),
            on_evicted: self.on_evicted.clone(),
        }
    }
}

impl<V> fmt::Debug for Config<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("default_ttl", &self.default_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("renew_on_get", &self.renew_on_get)
            .field("custom_hash", &self.hash.is_some())
            .field("on_evicted", &self.on_evicted.is_some())
            .finish()
    }
}
