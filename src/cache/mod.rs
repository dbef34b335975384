//! Cache Module
//!
//! The resilient cache service, its network backend seam and the bounded
//! in-memory map it falls back to.

pub mod backend;
mod entry;
pub mod keys;
mod lru;
mod service;
mod state;
mod stats;
mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export public types
pub use backend::{CacheBackend, RedisBackend, RedisSettings};
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use service::{CacheSettings, ResilientCache};
pub use state::{CacheStatus, ConnectionState};
pub use stats::MemoryStats;
pub use store::MemoryStore;

// == Public Constants ==
/// Maximum allowed key length in bytes for keys set through the HTTP API
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed serialized value size in bytes for the HTTP API and for
/// cached response bodies
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
