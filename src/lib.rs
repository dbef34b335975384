//! Resilient Cache - a Redis-backed cache that keeps serving from memory
//!
//! Wraps a network key-value backend with a bounded in-memory fallback, and
//! exposes it through an HTTP API with rate limiting, response caching and
//! token revocation built on top.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheBackend, ConnectionState, ResilientCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_cleanup_task, spawn_reconnect_task};
