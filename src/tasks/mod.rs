//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired in-memory entries at configured intervals
//! - Reconnect: Retries the backend while the cache is in memory fallback

mod cleanup;
mod reconnect;

pub use cleanup::spawn_cleanup_task;
pub use reconnect::spawn_reconnect_task;
