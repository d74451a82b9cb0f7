//! Concurrent map with a single TTL and O(1) generational purge.
//!
//! Two internal generations rotate: when a `put` lands more than one TTL
//! after the last rotation, the old generation is replaced with a fresh map
//! and the roles swap. Entries therefore live at most 2×TTL, and a lookup
//! still checks the entry's own age, so nothing older than the TTL is ever
//! returned.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use super::clock::Clock;

struct CacheEntry<V> {
    added: SystemTime,
    value: V,
}

struct Generations<K, V> {
    maps: [HashMap<K, CacheEntry<V>>; 2],
    newest: usize,
    last_purge: SystemTime,
}

pub struct MapCache<K, V> {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    inner: RwLock<Generations<K, V>>,
}

impl<K, V> MapCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Entries expire exactly at their TTL.
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let last_purge = clock.now();
        Self {
            clock,
            ttl,
            inner: RwLock::new(Generations {
                maps: [HashMap::new(), HashMap::new()],
                newest: 0,
                last_purge,
            }),
        }
    }

    /// Split `keys` into found `(key, value)` pairs and missing keys.
    /// The relative input order is preserved across both slices.
    pub fn get(&self, keys: &[K]) -> (Vec<(K, V)>, Vec<K>) {
        let now = self.clock.now();
        let mut found = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();

        let inner = self.inner.read().unwrap();
        for key in keys {
            match inner.lookup(now, self.ttl, key) {
                Some(value) => found.push((key.clone(), value)),
                None => missing.push(key.clone()),
            }
        }

        (found, missing)
    }

    /// Insert or overwrite. TTL is assessed relative to the clock at `put`
    /// time; rotation of the generations also happens here.
    pub fn put(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap();

        let newest = inner.newest;
        inner.maps[newest].insert(key, CacheEntry { added: now, value });

        if elapsed(inner.last_purge, now) > self.ttl {
            let capacity = inner.maps[newest].len();
            let oldest = 1 - newest;
            inner.maps[oldest] = HashMap::with_capacity(capacity);
            inner.newest = oldest;
            inner.last_purge = now;
        }
    }

    #[cfg(test)]
    fn generation_sizes(&self) -> (usize, usize) {
        let inner = self.inner.read().unwrap();
        (
            inner.maps[inner.newest].len(),
            inner.maps[1 - inner.newest].len(),
        )
    }
}

impl<K, V> Generations<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn lookup(&self, now: SystemTime, ttl: Duration, key: &K) -> Option<V> {
        // A key in the new generation always has an added time >= the same
        // key in the old one, so the new generation wins.
        let entry = self.maps[self.newest]
            .get(key)
            .or_else(|| self.maps[1 - self.newest].get(key))?;

        if elapsed(entry.added, now) > ttl {
            return None;
        }

        Some(entry.value.clone())
    }
}

fn elapsed(since: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or(Duration::ZERO)
}
