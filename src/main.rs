//! Resilient Cache - HTTP front end for the Redis-backed cache
//!
//! Starts the API server, the TTL sweeper and, when configured, the
//! reconnect task.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resilient_cache::{
    create_router, spawn_cleanup_task, spawn_reconnect_task, AppState, Config,
};

/// Main entry point for the cache service.
///
/// # Startup Sequence
/// 1. Load `.env` and initialize the tracing subscriber
/// 2. Load configuration from environment variables
/// 3. Build the cache and attempt the first backend handshake
/// 4. Start background tasks
/// 5. Serve HTTP until SIGINT/SIGTERM, then disconnect the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resilient_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resilient Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: redis={}:{}, max_attempts={}, max_entries={}, port={}, cleanup_interval={}s",
        config.redis_host,
        config.redis_port,
        config.redis_max_attempts,
        config.max_entries,
        config.server_port,
        config.cleanup_interval
    );

    let state = AppState::from_config(config).context("invalid Redis connection settings")?;
    let cache = state.cache.clone();
    let config = state.config.clone();

    // Never fails; an unreachable Redis leaves the cache in memory mode.
    cache.connect().await;
    info!(state = ?cache.state(), "Cache initialized");

    let mut tasks = vec![spawn_cleanup_task(cache.clone(), config.cleanup_interval)];
    if config.reconnect_interval > 0 {
        tasks.push(spawn_reconnect_task(
            cache.clone(),
            config.reconnect_interval,
        ));
    }
    info!("Background tasks started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    // ConnectInfo feeds the per-IP rate limit
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(tasks))
    .await
    .context("server error")?;

    cache.disconnect().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the
/// background tasks.
async fn shutdown_signal(tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for task in tasks {
        task.abort();
    }
    warn!("Background tasks aborted");
}
