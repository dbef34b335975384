//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use serde_json::Value;

use resilient_cache::cache::{keys::glob_match, CacheBackend, CacheSettings, ResilientCache};
use resilient_cache::{create_router, AppState, CacheError, Config, Result};

pub const TOKEN: &str = "integration-token";

/// In-process backend that can be taken down and brought back.
#[derive(Default)]
pub struct FlakyBackend {
    data: Mutex<HashMap<String, String>>,
    ttls: Mutex<HashMap<String, Option<u64>>>,
    down: AtomicBool,
}

impl FlakyBackend {
    pub fn up() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn down() -> Arc<Self> {
        let backend = Self::default();
        backend.set_down(true);
        Arc::new(backend)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    /// Last TTL sent for `key` by `set` or `expire`.
    pub fn ttl_sent(&self, key: &str) -> Option<Option<u64>> {
        self.ttls.lock().unwrap().get(key).copied()
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(CacheError::Backend("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn connect(&self) -> Result<()> {
        self.check()
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

/// Test configuration: one handshake before memory fallback.
pub fn test_config() -> Config {
    Config {
        redis_max_attempts: 1,
        ..Config::default()
    }
}

/// Builds the full router over `backend` after an initial handshake.
pub async fn create_test_app(backend: Arc<FlakyBackend>, config: Config) -> (Router, AppState) {
    let cache = Arc::new(ResilientCache::new(
        backend,
        CacheSettings::from_config(&config),
    ));
    cache.connect().await;
    let state = AppState::new(cache, config);
    (create_router(state.clone()), state)
}

pub fn request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
    request_as(TOKEN, method, uri, body)
}

pub fn request_as(token: &str, method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap()
}

pub async fn body_to_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
