//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::cache::RedisSettings;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis host
    pub redis_host: String,
    /// Redis port
    pub redis_port: u16,
    /// Redis password, None when unset or empty
    pub redis_password: Option<String>,
    /// Consecutive failed handshakes before switching to memory mode
    pub redis_max_attempts: u32,
    /// Handshake timeout in seconds
    pub redis_connect_timeout: u64,
    /// Capacity of the in-memory fallback map
    pub max_entries: usize,
    /// Expired-entry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Reconnect attempt interval in seconds while in memory mode, 0 = never
    pub reconnect_interval: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Requests allowed per client per window
    pub rate_limit_max_requests: i64,
    /// Rate limit window in seconds
    pub rate_limit_window: u64,
    /// TTL in seconds for cached GET responses
    pub response_cache_ttl: u64,
    /// Blacklist TTL in seconds when logout does not say how long the token has left
    pub token_ttl: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_HOST` (default: localhost), `REDIS_PORT` (default: 6379)
    /// - `REDIS_PASSWORD` (optional)
    /// - `REDIS_MAX_ATTEMPTS` (default: 3)
    /// - `REDIS_CONNECT_TIMEOUT` - seconds (default: 10)
    /// - `MAX_ENTRIES` - fallback map capacity (default: 10000)
    /// - `CLEANUP_INTERVAL` - seconds (default: 60)
    /// - `RECONNECT_INTERVAL` - seconds, 0 disables (default: 0)
    /// - `SERVER_PORT` (default: 3000)
    /// - `RATE_LIMIT_MAX_REQUESTS` (default: 100), `RATE_LIMIT_WINDOW` - seconds (default: 900)
    /// - `RESPONSE_CACHE_TTL` - seconds (default: 300)
    /// - `TOKEN_TTL` - seconds (default: 3600)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_host: env::var("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: parse_var("REDIS_PORT", defaults.redis_port),
            redis_password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            redis_max_attempts: parse_var("REDIS_MAX_ATTEMPTS", defaults.redis_max_attempts)
                .max(1),
            redis_connect_timeout: parse_var(
                "REDIS_CONNECT_TIMEOUT",
                defaults.redis_connect_timeout,
            ),
            max_entries: parse_var("MAX_ENTRIES", defaults.max_entries).max(1),
            cleanup_interval: parse_var("CLEANUP_INTERVAL", defaults.cleanup_interval).max(1),
            reconnect_interval: parse_var("RECONNECT_INTERVAL", defaults.reconnect_interval),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
            rate_limit_max_requests: parse_var(
                "RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            ),
            rate_limit_window: parse_var("RATE_LIMIT_WINDOW", defaults.rate_limit_window).max(1),
            response_cache_ttl: parse_var("RESPONSE_CACHE_TTL", defaults.response_cache_ttl),
            token_ttl: parse_var("TOKEN_TTL", defaults.token_ttl),
        }
    }

    /// Redis connection settings derived from this config.
    pub fn redis_settings(&self) -> RedisSettings {
        RedisSettings {
            host: self.redis_host.clone(),
            port: self.redis_port,
            password: self.redis_password.clone(),
            db: 0,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: None,
            redis_max_attempts: 3,
            redis_connect_timeout: 10,
            max_entries: 10_000,
            cleanup_interval: 60,
            reconnect_interval: 0,
            server_port: 3000,
            rate_limit_max_requests: 100,
            rate_limit_window: 900,
            response_cache_ttl: 300,
            token_ttl: 3600,
        }
    }
}
