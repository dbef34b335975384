//! Resilient Cache Service
//!
//! A key/value cache that prefers a network backend and falls back to a
//! bounded in-memory map. Two degradation tiers:
//!
//! - a single backend command failing while connected is served from memory
//!   for that call only, and the next call tries the backend again;
//! - `max_attempts` consecutive failed handshakes switch the service into
//!   [`ConnectionState::MemoryFallback`], which only an explicit
//!   [`ResilientCache::connect`] can leave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::cache::backend::CacheBackend;
use crate::cache::keys;
use crate::cache::state::{CacheStatus, ConnectionState};
use crate::cache::MemoryStore;
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Backend command failures are logged on the first occurrence and then
/// once every this many.
const FAILURE_LOG_EVERY: u64 = 5;

// == Settings ==
/// Tuning knobs for [`ResilientCache`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Consecutive failed handshakes before settling on memory
    pub max_attempts: u32,
    /// Upper bound for a single handshake
    pub connect_timeout: Duration,
    /// Capacity of the in-memory map
    pub max_entries: usize,
}

impl CacheSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.redis_max_attempts,
            connect_timeout: Duration::from_secs(config.redis_connect_timeout),
            max_entries: config.max_entries,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            connect_timeout: Duration::from_secs(10),
            max_entries: 10_000,
        }
    }
}

#[derive(Debug)]
struct Connection {
    state: ConnectionState,
    attempts: u32,
}

// == Resilient Cache ==
/// Cache facade shared by middleware and handlers as `Arc<ResilientCache>`.
pub struct ResilientCache {
    backend: Arc<dyn CacheBackend>,
    settings: CacheSettings,
    connection: RwLock<Connection>,
    /// Serializes handshakes; never held by plain cache operations.
    handshake: tokio::sync::Mutex<()>,
    memory: Mutex<MemoryStore>,
    backend_failures: AtomicU64,
}

impl ResilientCache {
    /// Creates a disconnected cache. No I/O happens until [`connect`] or the
    /// first operation.
    ///
    /// [`connect`]: ResilientCache::connect
    pub fn new(backend: Arc<dyn CacheBackend>, settings: CacheSettings) -> Self {
        let memory = MemoryStore::new(settings.max_entries);
        Self {
            backend,
            settings,
            connection: RwLock::new(Connection {
                state: ConnectionState::Disconnected,
                attempts: 0,
            }),
            handshake: tokio::sync::Mutex::new(()),
            memory: Mutex::new(memory),
            backend_failures: AtomicU64::new(0),
        }
    }

    // == Connection Management ==
    /// Attempts the backend handshake.
    ///
    /// Never fails: an unreachable backend only moves the state machine.
    /// A no-op when already connected; this is also the only way to leave
    /// [`ConnectionState::MemoryFallback`].
    pub async fn connect(&self) {
        let _guard = self.handshake.lock().await;
        if self.state() == ConnectionState::Connected {
            return;
        }
        self.handshake_locked().await;
    }

    /// Closes the backend connection and forgets everything held in memory.
    pub async fn disconnect(&self) {
        let _guard = self.handshake.lock().await;
        if let Err(e) = self.backend.disconnect().await {
            warn!(backend = self.backend.name(), error = %e, "Error while disconnecting");
        }
        {
            let mut conn = self.connection_mut();
            conn.state = ConnectionState::Disconnected;
            conn.attempts = 0;
        }
        self.with_memory(MemoryStore::clear);
        info!("Cache disconnected");
    }

    /// Caller must hold `self.handshake`.
    async fn handshake_locked(&self) {
        let previous = std::mem::replace(
            &mut self.connection_mut().state,
            ConnectionState::Connecting,
        );

        let outcome =
            match tokio::time::timeout(self.settings.connect_timeout, self.backend.connect())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(CacheError::Backend(format!(
                    "connect timed out after {}s",
                    self.settings.connect_timeout.as_secs()
                ))),
            };

        let mut conn = self.connection_mut();
        match outcome {
            Ok(()) => {
                conn.state = ConnectionState::Connected;
                conn.attempts = 0;
                info!(backend = self.backend.name(), "Cache backend connected");
            }
            Err(e) => {
                conn.attempts += 1;
                if conn.attempts >= self.settings.max_attempts {
                    conn.state = ConnectionState::MemoryFallback;
                    if previous == ConnectionState::MemoryFallback {
                        debug!(attempts = conn.attempts, error = %e, "Reconnect failed, staying in memory mode");
                    } else {
                        warn!(
                            backend = self.backend.name(),
                            attempts = conn.attempts,
                            error = %e,
                            "Cache backend unavailable, using in-memory cache"
                        );
                    }
                } else {
                    conn.state = ConnectionState::Disconnected;
                    warn!(
                        backend = self.backend.name(),
                        attempt = conn.attempts,
                        max_attempts = self.settings.max_attempts,
                        error = %e,
                        "Cache backend connection failed"
                    );
                }
            }
        }
    }

    /// Decides whether this call goes to the backend, handshaking first when
    /// disconnected.
    async fn backend_in_use(&self) -> bool {
        match self.state() {
            ConnectionState::Connected => true,
            ConnectionState::Connecting | ConnectionState::MemoryFallback => false,
            ConnectionState::Disconnected => {
                let _guard = self.handshake.lock().await;
                if self.state() == ConnectionState::Disconnected {
                    self.handshake_locked().await;
                }
                self.state() == ConnectionState::Connected
            }
        }
    }

    fn note_backend_failure(&self, op: &'static str, key: &str, err: &CacheError) {
        let failures = self.backend_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == 1 || failures % FAILURE_LOG_EVERY == 0 {
            warn!(
                op,
                key,
                failures,
                error = %err,
                "Cache backend command failed, serving from memory"
            );
        }
    }

    // == Key/Value Operations ==
    /// Returns the value stored at `key`, or None when absent or expired.
    ///
    /// Fails only if the stored JSON does not decode into `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw = self.get_raw(key).await;
        Ok(raw.map(|v| serde_json::from_str(&v)).transpose()?)
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        if self.backend_in_use().await {
            match self.backend.get(key).await {
                Ok(value) => return value,
                Err(e) => self.note_backend_failure("get", key, &e),
            }
        }
        self.with_memory(|m| m.get(key))
    }

    /// Stores `value` as JSON. A TTL of None or zero means no expiry.
    ///
    /// Serialization errors are returned; backend errors are not.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: Option<u64>,
    ) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        let ttl = ttl_seconds.filter(|ttl| *ttl > 0);

        if self.backend_in_use().await {
            match self.backend.set(key, &serialized, ttl).await {
                Ok(()) => {
                    // a copy left behind by an earlier failed call is stale now
                    self.with_memory(|m| m.remove(key));
                    return Ok(());
                }
                Err(e) => self.note_backend_failure("set", key, &e),
            }
        }

        self.with_memory(|m| m.set(key, serialized, ttl.map(Duration::from_secs)));
        Ok(())
    }

    /// Removes `key` from both stores. Never fails.
    pub async fn del(&self, key: &str) {
        if self.backend_in_use().await {
            if let Err(e) = self.backend.del(key).await {
                self.note_backend_failure("del", key, &e);
            }
        }
        self.with_memory(|m| m.remove(key));
    }

    /// Existence check honoring expiry.
    pub async fn exists(&self, key: &str) -> bool {
        if self.backend_in_use().await {
            match self.backend.exists(key).await {
                Ok(exists) => return exists,
                Err(e) => self.note_backend_failure("exists", key, &e),
            }
        }
        self.with_memory(|m| m.contains(key))
    }

    /// Increments the counter at `key`, starting from 1.
    ///
    /// A value that is not an integer is a caller error in either store and
    /// is returned rather than absorbed.
    ///
    /// The memory path runs inside a single lock acquisition, so concurrent
    /// increments never lose updates.
    pub async fn incr(&self, key: &str) -> Result<i64> {
        if self.backend_in_use().await {
            match self.backend.incr(key).await {
                Ok(value) => return Ok(value),
                Err(e @ (CacheError::NotAnInteger(_) | CacheError::IncrementOverflow(_))) => {
                    return Err(e)
                }
                Err(e) => self.note_backend_failure("incr", key, &e),
            }
        }
        self.with_memory(|m| m.incr(key))
    }

    /// Sets or overwrites the TTL of an existing key. Absent keys are left
    /// alone; zero seconds expires the key immediately.
    pub async fn expire(&self, key: &str, seconds: u64) {
        if self.backend_in_use().await {
            match self.backend.expire(key, seconds).await {
                Ok(()) => return,
                Err(e) => self.note_backend_failure("expire", key, &e),
            }
        }
        self.with_memory(|m| m.expire(key, Duration::from_secs(seconds)));
    }

    /// Remaining TTL in whole seconds; None for absent or persistent keys.
    pub async fn ttl(&self, key: &str) -> Option<u64> {
        if self.backend_in_use().await {
            match self.backend.ttl(key).await {
                Ok(ttl) => return ttl,
                Err(e) => self.note_backend_failure("ttl", key, &e),
            }
        }
        self.with_memory(|m| m.ttl(key).flatten().map(|d| d.as_secs()))
    }

    /// Keys matching a glob pattern in the store currently in use.
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        if self.backend_in_use().await {
            match self.backend.keys(pattern).await {
                Ok(keys) => return keys,
                Err(e) => self.note_backend_failure("keys", pattern, &e),
            }
        }
        self.with_memory(|m| m.keys(pattern))
    }

    /// Deletes every key matching `pattern`, returning how many were found.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let keys = self.keys(pattern).await;
        for key in &keys {
            self.del(key).await;
        }
        if !keys.is_empty() {
            info!(pattern, count = keys.len(), "Cache invalidated");
        }
        keys.len()
    }

    // == Token Blacklist ==
    /// Revokes a token for `ttl_seconds`, normally its remaining lifetime,
    /// so the entry disappears when the token would have expired anyway.
    pub async fn add_to_blacklist(&self, token: &str, ttl_seconds: u64) -> Result<()> {
        self.set(&keys::blacklist(token), &true, Some(ttl_seconds))
            .await
    }

    pub async fn is_token_blacklisted(&self, token: &str) -> bool {
        self.exists(&keys::blacklist(token)).await
    }

    // == Maintenance & Observability ==
    /// Sweeps expired entries out of the in-memory map.
    pub fn cleanup_expired(&self) -> usize {
        self.with_memory(MemoryStore::cleanup_expired)
    }

    pub fn state(&self) -> ConnectionState {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Snapshot of the connection state machine and memory counters.
    pub fn status(&self) -> CacheStatus {
        let (state, attempts) = {
            let conn = self
                .connection
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            (conn.state, conn.attempts)
        };

        CacheStatus {
            state,
            connected: state == ConnectionState::Connected,
            using_memory: state == ConnectionState::MemoryFallback,
            attempts,
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
            memory: self.with_memory(|m| m.stats()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::MemoryFallback
        )
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn connection_mut(&self) -> std::sync::RwLockWriteGuard<'_, Connection> {
        self.connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn with_memory<R>(&self, f: impl FnOnce(&mut MemoryStore) -> R) -> R {
        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut memory)
    }
}
