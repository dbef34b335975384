//! Cache Entry Module
//!
//! Defines the structure for entries held by the in-memory fallback map.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A serialized value plus its optional absolute expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value (JSON text)
    pub value: String,
    /// When the entry was written
    pub created_at: Instant,
    /// Absolute expiry, None = no expiration
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL.
    ///
    /// A zero TTL means the entry never expires.
    pub fn new(value: String, ttl: Option<Duration>) -> Self {
        let now = Instant::now();

        Self {
            value,
            created_at: now,
            expires_at: ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| now + ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiry instant,
    /// so a TTL of N seconds is unreadable from exactly N seconds on.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => Instant::now() >= expires,
            None => false,
        }
    }

    // == Expire At ==
    /// Replaces the expiry, keeping the value untouched.
    pub fn expire_in(&mut self, ttl: Duration) {
        self.expires_at = Some(Instant::now() + ttl);
    }

    // == Time To Live ==
    /// Returns the remaining TTL, or None if no expiration is set.
    ///
    /// Returns `Some(Duration::ZERO)` once the entry has expired.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }
}
