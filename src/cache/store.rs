//! Cache Store Module
//!
//! Main cache engine: routes keys to partitions, owns the settings lock and
//! the background sweep, and implements every public cache operation.
//!
//! # Locking
//! Every per-key operation holds the settings lock shared while it takes a
//! single partition lock for one map operation. Clear, flush and settings
//! changes take the settings lock exclusively, so they never interleave with
//! an in-flight per-key operation. No two partition locks are held at once,
//! and eviction callbacks only run after every lock has been released.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::entry::{Expiration, Item, Ttl};
use crate::cache::partition::Partitions;
use crate::cache::stats::{CacheStats, StatsRecorder};
use crate::cache::{default_hash, PARTITION_COUNT};
use crate::config::{Config, EvictFn, HashFn};
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweep_task;

// == Settings ==
/// Cache-wide settings, guarded by the global lock.
struct Settings<V> {
    default_ttl: Ttl,
    renew_on_get: bool,
    on_evicted: Option<EvictFn<V>>,
    hash: HashFn,
}

impl<V> Settings<V> {
    #[inline]
    fn partition_of(&self, key: &str) -> usize {
        (self.hash)(key) as usize % PARTITION_COUNT
    }
}

// == Evicted ==
/// Eviction notifications collected under lock and delivered after release.
struct Evicted<V> {
    on_evicted: Option<EvictFn<V>>,
    pending: Vec<(String, V)>,
    count: usize,
}

impl<V> Evicted<V> {
    fn new(on_evicted: Option<EvictFn<V>>) -> Self {
        Self {
            on_evicted,
            pending: Vec::new(),
            count: 0,
        }
    }

    fn push(&mut self, key: String, value: V) {
        self.count += 1;
        if self.on_evicted.is_some() {
            self.pending.push((key, value));
        }
    }

    /// Must be called with no cache lock held.
    fn deliver(self, stats: &StatsRecorder) {
        stats.record_evictions(self.count);
        if let Some(on_evicted) = self.on_evicted {
            for (key, value) in self.pending {
                on_evicted(key.as_str(), value);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    /// Expired items are reported, renewal follows the renew-on-get setting
    Get,
    /// No expiry check, always attempt renewal
    Touch,
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        Err(CacheError::EmptyKey)
    } else {
        Ok(())
    }
}

// == Inner ==
/// State shared between cache handles and the sweep task.
pub(crate) struct Inner<V> {
    settings: RwLock<Settings<V>>,
    partitions: Partitions<V>,
    stats: StatsRecorder,
}

impl<V> Inner<V> {
    /// Writes an item, reporting the displaced value as evicted.
    ///
    /// With `only_if_present`, an absent key fails with `NotFound` and nothing
    /// is written.
    fn write_item(
        &self,
        settings: RwLockReadGuard<'_, Settings<V>>,
        key: String,
        item: Item<V>,
        only_if_present: bool,
    ) -> Result<()> {
        let index = settings.partition_of(&key);
        let mut evicted = Evicted::new(settings.on_evicted.clone());

        let previous = {
            let mut shard = self.partitions.shard(index).write();
            if only_if_present {
                match shard.lookup_mut(&key) {
                    Some(slot) => Some(std::mem::replace(slot, item)),
                    None => return Err(CacheError::NotFound(key)),
                }
            } else {
                shard.insert(key.clone(), item)
            }
        };
        if let Some(previous) = previous {
            evicted.push(key, previous.value);
        }

        drop(settings);
        evicted.deliver(&self.stats);
        Ok(())
    }

    /// Shared lookup path of get, get_with_expiration and touch.
    ///
    /// Renewal is optimistic: the item is read under a shared partition lock
    /// and the exclusive lock is only taken when the candidate expiration is
    /// later than the stored one. Presence and ordering are checked again
    /// after the upgrade.
    fn read(&self, key: &str, mode: ReadMode) -> Result<(V, Expiration)>
    where
        V: Clone,
    {
        check_key(key)?;

        let settings = self.settings.read();
        let index = settings.partition_of(key);
        let now = Instant::now();

        let (value, mut expires_at) = {
            let shard = self.partitions.shard(index).read();
            match shard.lookup(key) {
                Some(item) => (item.value.clone(), item.expires_at),
                None => {
                    self.stats.record_miss();
                    return Err(CacheError::NotFound(key.to_string()));
                }
            }
        };

        let renew = match mode {
            ReadMode::Get => {
                if settings.default_ttl.is_finite() && expires_at.expired_at(now) {
                    self.stats.record_expired();
                    return Err(CacheError::Expired(key.to_string()));
                }
                settings.renew_on_get
            }
            ReadMode::Touch => true,
        };

        if renew {
            let candidate = settings.default_ttl.expiration_from(now);
            if expires_at.renews_to(candidate) {
                let mut shard = self.partitions.shard(index).write();
                // The item may have been deleted or renewed further since the read
                if let Some(item) = shard.lookup_mut(key) {
                    if item.expires_at.renews_to(candidate) {
                        item.expires_at = candidate;
                    }
                    expires_at = item.expires_at;
                }
            }
        }

        self.stats.record_hit();
        Ok((value, expires_at))
    }

    /// Removes every item expired as of `now` and notifies the eviction
    /// callback for each one.
    ///
    /// Phase one collects candidate keys one partition at a time under shared
    /// locks. Phase two re-locks each candidate's partition exclusively and
    /// removes the item only if it is still present and still expired, so a
    /// renewal or delete that lands between the phases wins.
    pub(crate) fn delete_expired(&self, now: Instant) -> usize {
        let settings = self.settings.read();

        let candidates: Vec<(usize, Vec<String>)> = self
            .partitions
            .iter()
            .enumerate()
            .map(|(index, shard)| (index, shard.read().expired_keys(now)))
            .filter(|(_, keys)| !keys.is_empty())
            .collect();

        let mut evicted = Evicted::new(settings.on_evicted.clone());
        for (index, keys) in candidates {
            for key in keys {
                let mut shard = self.partitions.shard(index).write();
                let recheck = Instant::now().max(now);
                let still_expired = shard
                    .lookup(&key)
                    .is_some_and(|item| item.is_expired_at(recheck));
                if !still_expired {
                    continue;
                }
                let removed = shard.remove(&key);
                drop(shard);
                if let Some(item) = removed {
                    evicted.push(key, item.value);
                }
            }
        }

        drop(settings);
        let removed = evicted.count;
        evicted.deliver(&self.stats);
        removed
    }

    pub(crate) fn record_sweep(&self) {
        self.stats.record_sweep();
    }

    /// Visits items partition by partition, each under its own shared lock.
    ///
    /// With `valid_only`, items expired at the time their partition is
    /// visited are skipped, unless the cache's default TTL is `Never`.
    fn scan<F>(&self, valid_only: bool, mut visit: F)
    where
        F: FnMut(&String, &Item<V>),
    {
        let settings = self.settings.read();
        let filter = valid_only && settings.default_ttl.is_finite();

        for shard in self.partitions.iter() {
            let shard = shard.read();
            let now = Instant::now();
            for (key, item) in shard.iter() {
                if filter && item.is_expired_at(now) {
                    continue;
                }
                visit(key, item);
            }
        }
    }

    /// Empties every partition under the exclusive settings lock.
    fn drain(&self, notify: bool) -> usize {
        let settings = self.settings.write();
        let drained: Vec<HashMap<String, Item<V>>> = self
            .partitions
            .iter()
            .map(|shard| shard.write().take())
            .collect();
        let on_evicted = settings.on_evicted.clone();
        drop(settings);

        let count = drained.iter().map(HashMap::len).sum();
        if notify {
            let mut evicted = Evicted::new(on_evicted);
            for (key, item) in drained.into_iter().flatten() {
                evicted.push(key, item.value);
            }
            evicted.deliver(&self.stats);
        }
        count
    }

    fn len(&self) -> usize {
        let _settings = self.settings.read();
        self.partitions.iter().map(|shard| shard.read().len()).sum()
    }
}

// == Cache ==
/// A sharded, thread-safe cache with per-item TTL.
///
/// `Cache` is a cheap handle: clones share the same storage. Values are
/// cloned out on reads, so wrap large values in an `Arc`.
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
    sweep: Option<Arc<JoinHandle<()>>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            sweep: self.sweep.clone(),
        }
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.inner.len())
            .field("sweeping", &self.is_sweeping())
            .finish()
    }
}

impl<V> Cache<V> {
    // == Length ==
    /// Returns the number of items, expired-but-unswept items included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the cache holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true while the background sweep task is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweep
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache from `config`.
    ///
    /// When `config.sweep_interval` is non-zero a background sweep is spawned
    /// on the current Tokio runtime and runs until `shutdown` is cancelled or
    /// every handle to the cache has been dropped.
    ///
    /// # Errors
    /// `CacheError::NoRuntime` if a sweep is configured and no Tokio runtime
    /// is running.
    pub fn new(config: Config<V>, shutdown: CancellationToken) -> Result<Self> {
        let hash: HashFn = match config.hash {
            Some(hash) => hash,
            None => Arc::new(default_hash),
        };

        let inner = Arc::new(Inner {
            settings: RwLock::new(Settings {
                default_ttl: config.default_ttl,
                renew_on_get: config.renew_on_get,
                on_evicted: config.on_evicted,
                hash,
            }),
            partitions: Partitions::new(),
            stats: StatsRecorder::default(),
        });

        let sweep = if config.sweep_interval.is_zero() {
            None
        } else {
            let runtime = tokio::runtime::Handle::try_current()?;
            let handle = spawn_sweep_task(
                &runtime,
                Arc::downgrade(&inner),
                config.sweep_interval,
                shutdown,
            );
            Some(Arc::new(handle))
        };

        Ok(Self { inner, sweep })
    }

    // == Set ==
    /// Stores a value with the cache's default TTL.
    ///
    /// An existing item is overwritten and its old value is passed to the
    /// eviction callback.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<()> {
        let key = key.into();
        check_key(&key)?;

        let settings = self.inner.settings.read();
        let expires_at = settings.default_ttl.expiration_from(Instant::now());
        self.inner
            .write_item(settings, key, Item::new(value, expires_at), false)
    }

    /// Stores a value with a TTL for this item only.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Ttl) -> Result<()> {
        let key = key.into();
        check_key(&key)?;

        let expires_at = ttl.expiration_from(Instant::now());
        let settings = self.inner.settings.read();
        self.inner
            .write_item(settings, key, Item::new(value, expires_at), false)
    }

    // == Replace ==
    /// Overwrites an existing item, failing with `NotFound` if it is absent.
    pub fn replace(&self, key: impl Into<String>, value: V) -> Result<()> {
        let key = key.into();
        check_key(&key)?;

        let settings = self.inner.settings.read();
        let expires_at = settings.default_ttl.expiration_from(Instant::now());
        self.inner
            .write_item(settings, key, Item::new(value, expires_at), true)
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Fails with `Expired` when the item is past its expiration and the
    /// cache has a finite default TTL. With renew-on-get enabled, a hit moves
    /// the expiration forward to `now + default TTL` if that is later.
    pub fn get(&self, key: &str) -> Result<V> {
        self.inner.read(key, ReadMode::Get).map(|(value, _)| value)
    }

    /// Like `get`, also returning the item's expiration after any renewal.
    pub fn get_with_expiration(&self, key: &str) -> Result<(V, Expiration)> {
        self.inner.read(key, ReadMode::Get)
    }

    // == Touch ==
    /// Renews an item's expiration regardless of the renew-on-get setting.
    ///
    /// Does not check expiry, so touching an expired item that has not been
    /// swept yet brings it back.
    pub fn touch(&self, key: &str) -> Result<V> {
        self.inner.read(key, ReadMode::Touch).map(|(value, _)| value)
    }

    // == Delete ==
    /// Removes a key, returning whether it was present.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.delete_many([key]).map(|removed| removed == 1)
    }

    /// Removes several keys, returning how many were present.
    ///
    /// The batch is rejected with `EmptyKey` before anything is removed if
    /// any key is empty.
    pub fn delete_many<I, K>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let keys: Vec<K> = keys.into_iter().collect();
        for key in &keys {
            check_key(key.as_ref())?;
        }

        let settings = self.inner.settings.read();
        let mut evicted = Evicted::new(settings.on_evicted.clone());
        for key in &keys {
            let key = key.as_ref();
            let index = settings.partition_of(key);
            let removed = self.inner.partitions.shard(index).write().remove(key);
            if let Some(item) = removed {
                evicted.push(key.to_string(), item.value);
            }
        }
        drop(settings);

        let removed = evicted.count;
        evicted.deliver(&self.inner.stats);
        Ok(removed)
    }

    /// Runs one expiry sweep as of `now`, returning the number of items removed.
    pub fn delete_expired(&self, now: Instant) -> usize {
        self.inner.delete_expired(now)
    }

    // == Enumeration ==
    /// Returns every key, expired items included.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(PARTITION_COUNT);
        self.inner.scan(false, |key, _| keys.push(key.clone()));
        keys
    }

    /// Returns the keys of items that have not expired.
    pub fn valid_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(PARTITION_COUNT);
        self.inner.scan(true, |key, _| keys.push(key.clone()));
        keys
    }

    /// Returns every key/value pair, expired items included.
    pub fn entries(&self) -> HashMap<String, V> {
        let mut entries = HashMap::new();
        self.inner.scan(false, |key, item| {
            entries.insert(key.clone(), item.value.clone());
        });
        entries
    }

    /// Returns the key/value pairs of items that have not expired.
    pub fn valid_entries(&self) -> HashMap<String, V> {
        let mut entries = HashMap::new();
        self.inner.scan(true, |key, item| {
            entries.insert(key.clone(), item.value.clone());
        });
        entries
    }

    // == Clear / Flush ==
    /// Discards every item without notifying the eviction callback.
    pub fn clear(&self) {
        let discarded = self.inner.drain(false);
        debug!("Cache cleared: discarded {} items", discarded);
    }

    /// Discards every item, passing each one to the eviction callback.
    pub fn flush(&self) {
        let discarded = self.inner.drain(true);
        debug!("Cache flushed: evicted {} items", discarded);
    }

    // == Settings ==
    /// Returns the default TTL.
    pub fn default_ttl(&self) -> Ttl {
        self.inner.settings.read().default_ttl
    }

    /// Sets the default TTL for items written or renewed from now on.
    /// A zero duration means `Ttl::Never`.
    pub fn set_default_ttl(&self, ttl: Ttl) {
        self.inner.settings.write().default_ttl = ttl.normalized();
    }

    /// Returns whether reads renew expiration.
    pub fn renew_on_get(&self) -> bool {
        self.inner.settings.read().renew_on_get
    }

    pub fn enable_renew_on_get(&self) {
        self.inner.settings.write().renew_on_get = true;
    }

    pub fn disable_renew_on_get(&self) {
        self.inner.settings.write().renew_on_get = false;
    }

    /// Sets the eviction callback, replacing any previous one.
    ///
    /// A panic in the callback unwinds into whichever operation removed the
    /// item, and the other notifications of that batch are lost. A flush
    /// whose first callback panics reports none of the remaining items.
    pub fn set_on_evicted<F>(&self, on_evicted: F)
    where
        F: Fn(&str, V) + Send + Sync + 'static,
    {
        self.inner.settings.write().on_evicted = Some(Arc::new(on_evicted));
    }

    /// Removes the eviction callback.
    pub fn remove_on_evicted(&self) {
        self.inner.settings.write().on_evicted = None;
    }

    // == Expired ==
    /// Reports a key's expiration status.
    ///
    /// # Returns
    /// - `(None, true)` if the key is absent
    /// - `(Some(expiration), expired)` otherwise, where `Never` is not expired
    pub fn expired(&self, key: &str) -> Result<(Option<Expiration>, bool)> {
        check_key(key)?;

        let settings = self.inner.settings.read();
        let index = settings.partition_of(key);
        let shard = self.inner.partitions.shard(index).read();
        Ok(match shard.lookup(key) {
            Some(item) => (
                Some(item.expires_at),
                item.is_expired_at(Instant::now()),
            ),
            None => (None, true),
        })
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.inner.len())
    }
}
