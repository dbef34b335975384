//! Connection state and the status snapshot exposed to observers.

use serde::Serialize;

use crate::cache::MemoryStats;

/// Where the resilient cache currently sends its operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No backend connection; the next operation attempts a handshake
    Disconnected,
    /// A handshake is in flight; operations use memory meanwhile
    Connecting,
    /// Operations go to the backend
    Connected,
    /// Retry budget exhausted; memory only until an explicit reconnect
    MemoryFallback,
}

/// Point-in-time view of the cache service.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub using_memory: bool,
    /// Consecutive failed handshakes
    pub attempts: u32,
    /// Backend operations that failed while connected
    pub backend_failures: u64,
    pub memory: MemoryStats,
}

impl CacheStatus {
    /// Healthy means requests are served by a known store: either the
    /// backend is up or the service has settled on memory.
    pub fn is_healthy(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::MemoryFallback
        )
    }
}
