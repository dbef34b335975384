//! Network cache backend
//!
//! The resilient cache talks to its network store only through the
//! [`CacheBackend`] trait, so tests can substitute an in-process double.
//! [`RedisBackend`] is the production implementation.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, ErrorKind, RedisConnectionInfo};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{CacheError, Result};

/// Operations the resilient cache needs from a network key/value store.
///
/// Values are already-serialized JSON text. Every method may fail with
/// [`CacheError::Backend`]; the caller decides how to degrade.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Performs the connection handshake
    async fn connect(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores a value; `ttl_seconds` of None means no expiry
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomic increment, starting from zero for absent keys
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn expire(&self, key: &str, seconds: u64) -> Result<()>;

    /// Remaining TTL in seconds; None when the key is absent or persistent
    async fn ttl(&self, key: &str) -> Result<Option<u64>>;

    /// Keys matching a glob pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Drops the connection
    async fn disconnect(&self) -> Result<()>;
}

// == Redis Backend ==
/// `ConnectionManager` retries its first connection on its own unless told
/// otherwise; with zero retries the base and factor are unused.
const CONNECT_RETRIES: usize = 0;
const BACKOFF_EXPONENT_BASE: u64 = 2;
const BACKOFF_FACTOR_MS: u64 = 100;

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisSettings {
    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                username: None,
                password: self.password.clone(),
            },
        }
    }
}

/// Redis-backed [`CacheBackend`].
///
/// The connection manager is created lazily by [`CacheBackend::connect`];
/// until then every command fails with a backend error.
pub struct RedisBackend {
    client: redis::Client,
    conn: RwLock<Option<ConnectionManager>>,
}

impl RedisBackend {
    /// Creates an unconnected backend. Fails only on malformed settings.
    pub fn new(settings: &RedisSettings) -> Result<Self> {
        let client = redis::Client::open(settings.connection_info())?;
        Ok(Self {
            client,
            conn: RwLock::new(None),
        })
    }

    async fn conn(&self) -> Result<ConnectionManager> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| CacheError::Backend("not connected".to_string()))
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn connect(&self) -> Result<()> {
        // One TCP handshake per call; ResilientCache counts and bounds retries.
        let manager = self
            .client
            .get_connection_manager_with_backoff(
                BACKOFF_EXPONENT_BASE,
                BACKOFF_FACTOR_MS,
                CONNECT_RETRIES,
            )
            .await?;
        *self.conn.write().await = Some(manager);
        info!("Redis connection established");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.conn().await?;
        match ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.incr(key, 1i64).await.map_err(|e| match e.kind() {
            ErrorKind::ResponseError if e.to_string().contains("overflow") => {
                CacheError::IncrementOverflow(key.to_string())
            }
            // INCR answers "ERR value is not an integer" or WRONGTYPE
            ErrorKind::ResponseError | ErrorKind::TypeError => {
                CacheError::NotAnInteger(key.to_string())
            }
            _ => e.into(),
        })
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: bool = conn.expire(key, seconds as i64).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.conn().await?;
        // -2: no such key, -1: no expiry
        let seconds: i64 = conn.ttl(key).await?;
        Ok(u64::try_from(seconds).ok())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn disconnect(&self) -> Result<()> {
        if self.conn.write().await.take().is_some() {
            debug!("Redis connection dropped");
        }
        Ok(())
    }
}
