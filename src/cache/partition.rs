//! Partition Store Module
//!
//! A fixed set of independently locked key/item tables. This module knows
//! nothing about expiry policy; callers lock a partition, do one storage
//! operation, and release it.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

use crate::cache::entry::Item;
use crate::cache::PARTITION_COUNT;

// == Partition ==
/// A single key/item table.
#[derive(Debug)]
pub(crate) struct Partition<V> {
    items: HashMap<String, Item<V>>,
}

impl<V> Partition<V> {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    /// Looks up an item by key.
    pub(crate) fn lookup(&self, key: &str) -> Option<&Item<V>> {
        self.items.get(key)
    }

    /// Looks up an item for in-place mutation of its expiration.
    pub(crate) fn lookup_mut(&mut self, key: &str) -> Option<&mut Item<V>> {
        self.items.get_mut(key)
    }

    /// Inserts an item, returning the one it displaced.
    pub(crate) fn insert(&mut self, key: String, item: Item<V>) -> Option<Item<V>> {
        self.items.insert(key, item)
    }

    /// Removes an item by key.
    pub(crate) fn remove(&mut self, key: &str) -> Option<Item<V>> {
        self.items.remove(key)
    }

    /// Iterates over all items in the partition.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Item<V>)> {
        self.items.iter()
    }

    /// Swaps the contents out for an empty table.
    pub(crate) fn take(&mut self) -> HashMap<String, Item<V>> {
        std::mem::take(&mut self.items)
    }

    /// Collects keys whose items are expired as of `now`.
    pub(crate) fn expired_keys(&self, now: Instant) -> Vec<String> {
        self.items
            .iter()
            .filter(|(_, item)| item.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

// == Partitions ==
/// The full set of partitions, each behind its own reader/writer lock.
#[derive(Debug)]
pub(crate) struct Partitions<V> {
    shards: Box<[RwLock<Partition<V>>]>,
}

impl<V> Partitions<V> {
    /// Allocates `PARTITION_COUNT` empty partitions.
    pub(crate) fn new() -> Self {
        let shards = (0..PARTITION_COUNT)
            .map(|_| RwLock::new(Partition::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    /// Returns the lock guarding partition `index`.
    ///
    /// `index` must already be reduced into `[0, PARTITION_COUNT)`.
    #[inline]
    pub(crate) fn shard(&self, index: usize) -> &RwLock<Partition<V>> {
        &self.shards[index]
    }

    /// Iterates over the partition locks in index order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &RwLock<Partition<V>>> {
        self.shards.iter()
    }
}
