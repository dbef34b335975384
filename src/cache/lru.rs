//! LRU Tracker Module
//!
//! Least Recently Used ordering used to bound the fallback map.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Tracks access order for LRU eviction.
///
/// Every touch stamps the key with a fresh sequence number; the smallest
/// live stamp is the least recently used key.
#[derive(Debug, Default)]
pub struct LruTracker {
    next_seq: u64,
    stamps: HashMap<String, u64>,
    order: BTreeMap<u64, String>,
}

impl LruTracker {
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used.
    pub fn touch(&mut self, key: &str) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(old) = self.stamps.insert(key.to_string(), seq) {
            self.order.remove(&old);
        }
        self.order.insert(seq, key.to_string());
    }

    /// Stops tracking a key.
    pub fn remove(&mut self, key: &str) {
        if let Some(seq) = self.stamps.remove(key) {
            self.order.remove(&seq);
        }
    }

    // == Evict Oldest ==
    /// Returns and forgets the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.stamps.remove(&key);
        Some(key)
    }

    #[cfg(test)]
    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.first_key_value().map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
        self.order.clear();
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.stamps.contains_key(key)
    }
}
