//! Memory Store Module
//!
//! Bounded HashMap with LRU eviction and TTL expiry. This is the fallback
//! side of the resilient cache: everything the backend would answer, the
//! store can answer too while the backend is out of reach.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::keys::glob_match;
use crate::cache::{CacheEntry, LruTracker, MemoryStats};
use crate::error::{CacheError, Result};

// == Memory Store ==
/// In-memory key/value map used when the network backend is unavailable.
#[derive(Debug)]
pub struct MemoryStore {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    stats: MemoryStats,
    max_entries: usize,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a store that holds at most `max_entries` keys (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: MemoryStats::new(),
            max_entries: max_entries.max(1),
        }
    }

    // == Set ==
    /// Stores a serialized value, replacing any previous value and TTL.
    ///
    /// Inserting a new key at capacity evicts the least recently used key.
    pub fn set(&mut self, key: &str, value: String, ttl: Option<Duration>) {
        if !self.entries.contains_key(key) {
            self.make_room();
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        self.lru.touch(key);
        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// Returns the live value for a key, purging it first if it has expired.
    pub fn get(&mut self, key: &str) -> Option<String> {
        if self.purge_if_expired(key) {
            self.stats.record_miss();
            return None;
        }

        match self.entries.get(key) {
            Some(entry) => {
                let value = entry.value.clone();
                self.stats.record_hit();
                self.lru.touch(key);
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Contains ==
    /// Existence check honoring expiry. Does not count as an access.
    pub fn contains(&mut self, key: &str) -> bool {
        !self.purge_if_expired(key) && self.entries.contains_key(key)
    }

    // == Remove ==
    /// Removes a key, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Increment ==
    /// Adds one to the integer stored at `key`, starting from zero.
    ///
    /// The existing expiry is kept, so a counter given a window TTL keeps
    /// counting down while it is incremented.
    pub fn incr(&mut self, key: &str) -> Result<i64> {
        self.purge_if_expired(key);

        if let Some(entry) = self.entries.get_mut(key) {
            let current: i64 = entry
                .value
                .trim()
                .parse()
                .map_err(|_| CacheError::NotAnInteger(key.to_string()))?;
            let next = current
                .checked_add(1)
                .ok_or_else(|| CacheError::IncrementOverflow(key.to_string()))?;
            entry.value = next.to_string();
            self.lru.touch(key);
            return Ok(next);
        }

        self.set(key, "1".to_string(), None);
        Ok(1)
    }

    // == Expire ==
    /// Sets a new TTL on a live key. Returns false if the key is absent.
    pub fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        if self.purge_if_expired(key) {
            return false;
        }

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.expire_in(ttl);
                true
            }
            None => false,
        }
    }

    // == Time To Live ==
    /// Remaining TTL of a live key; `Some(None)` means the key never expires.
    pub fn ttl(&mut self, key: &str) -> Option<Option<Duration>> {
        if self.purge_if_expired(key) {
            return None;
        }
        self.entries.get(key).map(CacheEntry::ttl_remaining)
    }

    // == Keys ==
    /// Live keys matching a glob pattern (`*` and `?`).
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.entries.remove(key);
            self.lru.remove(key);
        }

        self.stats.record_expirations(expired_keys.len());
        self.stats.set_total_entries(self.entries.len());
        expired_keys.len()
    }

    /// Drops every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    pub fn stats(&self) -> MemoryStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_if_expired(&mut self, key: &str) -> bool {
        let expired = self
            .entries
            .get(key)
            .map(CacheEntry::is_expired)
            .unwrap_or(false);

        if expired {
            self.entries.remove(key);
            self.lru.remove(key);
            self.stats.record_expirations(1);
            self.stats.set_total_entries(self.entries.len());
        }
        expired
    }

    fn make_room(&mut self) {
        while self.entries.len() >= self.max_entries {
            match self.lru.evict_oldest() {
                Some(evicted) => {
                    self.entries.remove(&evicted);
                    self.stats.record_eviction();
                }
                None => break,
            }
        }
    }
}
