//! Backend double shared by the crate's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::cache::backend::CacheBackend;
use crate::cache::keys::glob_match;
use crate::cache::{CacheSettings, ResilientCache};
use crate::error::{CacheError, Result};

/// In-process backend whose failures are switched on and off by the test.
#[derive(Default)]
pub struct ScriptedBackend {
    pub data: Mutex<HashMap<String, String>>,
    /// Last TTL sent for each key by `set` or `expire`
    pub ttls: Mutex<HashMap<String, Option<u64>>>,
    pub refuse_connect: AtomicBool,
    pub hang_connect: AtomicBool,
    pub fail_commands: AtomicBool,
    pub connects: AtomicU32,
}

impl ScriptedBackend {
    /// A backend that refuses every handshake.
    pub fn unreachable() -> Self {
        let backend = Self::default();
        backend.refuse_connect.store(true, Ordering::SeqCst);
        backend
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    pub fn ttl_sent(&self, key: &str) -> Option<Option<u64>> {
        self.ttls.lock().unwrap().get(key).copied()
    }

    fn check(&self) -> Result<()> {
        if self.fail_commands.load(Ordering::SeqCst) {
            Err(CacheError::Backend("connection reset".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("connection refused".into()));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.stored(key))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        self.check()?;
        self.ttls
            .lock()
            .unwrap()
            .insert(key.to_string(), ttl_seconds);
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.check()?;
        self.data.lock().unwrap().remove(key);
        self.ttls.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check()?;
        Ok(self.data.lock().unwrap().contains_key(key))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let current = match data.get(key) {
            Some(v) => v
                .parse::<i64>()
                .map_err(|_| CacheError::NotAnInteger(key.to_string()))?,
            None => 0,
        };
        let next = current
            .checked_add(1)
            .ok_or_else(|| CacheError::IncrementOverflow(key.to_string()))?;
        data.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<()> {
        self.check()?;
        self.ttls
            .lock()
            .unwrap()
            .insert(key.to_string(), Some(seconds));
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        self.check()?;
        if self.stored(key).is_none() {
            return Ok(None);
        }
        Ok(self.ttl_sent(key).flatten())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check()?;
        Ok(self
            .data
            .lock()
            .unwrap()
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// A cache that has exhausted its handshakes and settled in memory mode.
pub async fn memory_only_cache() -> Arc<ResilientCache> {
    let settings = CacheSettings {
        max_attempts: 1,
        ..CacheSettings::default()
    };
    let cache = Arc::new(ResilientCache::new(
        Arc::new(ScriptedBackend::unreachable()),
        settings,
    ));
    cache.connect().await;
    cache
}
