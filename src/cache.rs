//! Size-bounded, TTL-based response cache for presentation reads. Deliberately
//! external to the settlement and leaderboard logic so it can never touch a
//! financial invariant.

use std::time::{Duration, Instant};

use dashmap::DashMap;

pub struct TtlCache<V: Clone> {
    entries: DashMap<String, (Instant, V)>,
    max_entries: usize,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self { entries: DashMap::new(), max_entries, ttl }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        let (inserted_at, value) = entry.value();
        if inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(value.clone())
    }

    pub fn put(&self, key: String, value: V) {
        // Bounded: evict expired entries first, then refuse growth beyond the
        // cap rather than evicting live ones — staleness here costs only an
        // extra database read.
        if self.entries.len() >= self.max_entries {
            self.entries.retain(|_, v| v.0.elapsed() <= self.ttl);
        }
        if self.entries.len() < self.max_entries || self.entries.contains_key(&key) {
            self.entries.insert(key, (Instant::now(), value));
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
