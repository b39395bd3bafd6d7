// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path segment store
//!
//! Fixed-capacity map from [`PathKey`] to [`PathLeaf`] evicting the least
//! recently used entry once full. Lookups and upserts both refresh recency.
//! Every operation takes the store lock once, so concurrent resolutions
//! never observe a partially written entry.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::types::{PathKey, PathLeaf};

#[derive(Clone, Copy, Debug)]
struct Slot {
    leaf: PathLeaf,
    stamp: u64,
}

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<PathKey, Slot>,
    /// Recency order: oldest stamp first.
    order: BTreeMap<u64, PathKey>,
    clock: u64,
    stats: StoreStats,
}

impl LruState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: PathKey) -> Option<PathLeaf> {
        let stamp = self.tick();
        let slot = self.entries.get_mut(&key)?;
        self.order.remove(&slot.stamp);
        slot.stamp = stamp;
        self.order.insert(stamp, key);
        Some(slot.leaf)
    }

    fn evict_oldest(&mut self) {
        if let Some((_, victim)) = self.order.pop_first() {
            self.entries.remove(&victim);
            self.stats.evictions += 1;
        }
    }
}

/// Counters describing store traffic since creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub updates: u64,
    pub evictions: u64,
}

/// LRU segment store shared by the hook and external walkers.
#[derive(Debug)]
pub struct PathnameStore {
    capacity: usize,
    state: Mutex<LruState>,
}

impl PathnameStore {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace the entry for `key`.
    pub fn put(&self, key: PathKey, leaf: PathLeaf) {
        let mut guard = self.state.lock();
        if guard.touch(key).is_some() {
            if let Some(slot) = guard.entries.get_mut(&key) {
                slot.leaf = leaf;
            }
            guard.stats.updates += 1;
            return;
        }

        if guard.entries.len() >= self.capacity {
            guard.evict_oldest();
        }
        let stamp = guard.tick();
        guard.entries.insert(key, Slot { leaf, stamp });
        guard.order.insert(stamp, key);
        guard.stats.inserts += 1;
    }

    /// Look up `key`. A miss means the segment must be resolved again.
    pub fn get(&self, key: &PathKey) -> Option<PathLeaf> {
        let mut guard = self.state.lock();
        let found = guard.touch(*key);
        if found.is_some() {
            guard.stats.hits += 1;
        } else {
            guard.stats.misses += 1;
        }
        found
    }

    /// Look up `key` without refreshing recency or counting the access.
    pub fn peek(&self, key: &PathKey) -> Option<PathLeaf> {
        self.state.lock().entries.get(key).map(|slot| slot.leaf)
    }

    pub fn contains(&self, key: &PathKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn stats(&self) -> StoreStats {
        self.state.lock().stats
    }
}

impl Default for PathnameStore {
    fn default() -> Self {
        Self::new(crate::types::PATHNAMES_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(ino: u64) -> PathKey {
        PathKey::new(1, ino, 0)
    }

    fn leaf(name: &str) -> PathLeaf {
        PathLeaf::new(PathKey::ROOT, name.as_bytes())
    }

    #[test]
    fn put_then_get_returns_leaf() {
        let store = PathnameStore::new(4);
        store.put(key(1), leaf("etc"));
        assert_eq!(store.get(&key(1)).unwrap().name_bytes(), b"etc");
        assert!(store.get(&key(2)).is_none());

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 1);
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let store = PathnameStore::new(4);
        store.put(key(1), leaf("old"));
        store.put(key(1), leaf("new"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.peek(&key(1)).unwrap().name_bytes(), b"new");
        assert_eq!(store.stats().updates, 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let store = PathnameStore::new(3);
        store.put(key(1), leaf("a"));
        store.put(key(2), leaf("b"));
        store.put(key(3), leaf("c"));

        // refresh 1 so 2 becomes the oldest
        assert!(store.get(&key(1)).is_some());
        store.put(key(4), leaf("d"));

        assert_eq!(store.len(), 3);
        assert!(store.contains(&key(1)));
        assert!(!store.contains(&key(2)));
        assert!(store.contains(&key(3)));
        assert!(store.contains(&key(4)));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn peek_does_not_refresh_recency() {
        let store = PathnameStore::new(2);
        store.put(key(1), leaf("a"));
        store.put(key(2), leaf("b"));
        assert!(store.peek(&key(1)).is_some());
        store.put(key(3), leaf("c"));
        assert!(!store.contains(&key(1)));
    }

    #[test]
    fn never_exceeds_full_capacity() {
        let store = PathnameStore::default();
        for ino in 1..=(crate::types::PATHNAMES_CAPACITY as u64 + 500) {
            store.put(key(ino), leaf("x"));
        }
        assert_eq!(store.len(), crate::types::PATHNAMES_CAPACITY);
        assert_eq!(store.stats().evictions, 500);
        // the first 500 inserted were the least recently used
        assert!(!store.contains(&key(500)));
        assert!(store.contains(&key(501)));
    }

    #[test]
    fn concurrent_upserts_keep_entries_whole() {
        let store = Arc::new(PathnameStore::new(64));
        std::thread::scope(|scope| {
            for t in 0..4u8 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    let name = [b'a' + t; 200];
                    for _ in 0..500 {
                        store.put(key(7), PathLeaf::new(PathKey::new(1, t as u64 + 1, 0), &name));
                        let got = store.get(&key(7)).unwrap();
                        let first = got.name_bytes()[0];
                        // name and parent always come from the same writer
                        assert!(got.name_bytes().iter().all(|&b| b == first));
                        assert_eq!(got.parent.ino, (first - b'a') as u64 + 1);
                    }
                });
            }
        });
        assert_eq!(store.len(), 1);
    }
}
