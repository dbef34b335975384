//! Reconnect Task
//!
//! Memory fallback is sticky; this task periodically retries the backend so
//! a recovered Redis is picked up without an operator calling
//! `POST /status/reconnect`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{ConnectionState, ResilientCache};

/// Spawns a task that calls `connect()` every `interval_secs` while the
/// cache sits in memory fallback.
pub fn spawn_reconnect_task(cache: Arc<ResilientCache>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting reconnect task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            if cache.state() != ConnectionState::MemoryFallback {
                continue;
            }

            debug!("Retrying cache backend");
            cache.connect().await;
            if cache.state() == ConnectionState::Connected {
                info!("Cache backend recovered, leaving memory mode");
            }
        }
    })
}
