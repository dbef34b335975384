//! API Handlers
//!
//! HTTP request handlers for the key-value, status and auth endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::Value;
use tracing::info;

use crate::cache::{keys, CacheSettings, CacheStatus, RedisBackend, ResilientCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::middleware::AuthenticatedToken;
use crate::models::{
    ApiResponse, CounterData, ExistsData, ExpireRequest, HealthResponse, KeyValueData,
    LogoutRequest, SetRequest,
};

/// Application state shared across all handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ResilientCache>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(cache: Arc<ResilientCache>, config: Config) -> Self {
        Self {
            cache,
            config: Arc::new(config),
        }
    }

    /// Builds the Redis-backed cache described by `config`.
    ///
    /// No connection is attempted here; the first operation or an explicit
    /// `connect()` does that.
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = RedisBackend::new(&config.redis_settings())?;
        let cache = ResilientCache::new(Arc::new(backend), CacheSettings::from_config(&config));
        Ok(Self::new(Arc::new(cache), config))
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>>;

/// Handler for PUT /api/kv
///
/// API keys live under their own prefix, so they can never address the
/// blacklist, rate limit counters or cached responses.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> ApiResult<KeyValueData> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.set(&keys::kv(&req.key), &req.value, req.ttl).await?;

    Ok(Json(ApiResponse::ok(
        "Value stored",
        KeyValueData {
            key: req.key,
            value: req.value,
        },
    )))
}

/// Handler for GET /api/kv/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<KeyValueData> {
    let value = state
        .cache
        .get::<Value>(&keys::kv(&key))
        .await?
        .ok_or_else(|| CacheError::NotFound(format!("Key '{}' not found", key)))?;

    Ok(Json(ApiResponse::ok("Value found", KeyValueData { key, value })))
}

/// Handler for DELETE /api/kv/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let stored = keys::kv(&key);
    if !state.cache.exists(&stored).await {
        return Err(CacheError::NotFound(format!("Key '{}' not found", key)));
    }
    state.cache.del(&stored).await;

    Ok(Json(ApiResponse::message(format!("Key '{}' deleted", key))))
}

/// Handler for GET /api/kv/:key/exists
pub async fn exists_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<ExistsData> {
    let exists = state.cache.exists(&keys::kv(&key)).await;
    Ok(Json(ApiResponse::ok("Existence checked", ExistsData { key, exists })))
}

/// Handler for POST /api/kv/:key/incr
pub async fn incr_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<CounterData> {
    let value = state.cache.incr(&keys::kv(&key)).await?;
    Ok(Json(ApiResponse::ok("Counter incremented", CounterData { key, value })))
}

/// Handler for POST /api/kv/:key/expire
pub async fn expire_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<ExpireRequest>,
) -> Result<Json<ApiResponse<()>>> {
    let stored = keys::kv(&key);
    if !state.cache.exists(&stored).await {
        return Err(CacheError::NotFound(format!("Key '{}' not found", key)));
    }
    state.cache.expire(&stored, req.seconds).await;

    Ok(Json(ApiResponse::message(format!(
        "Key '{}' expires in {}s",
        key, req.seconds
    ))))
}

/// Handler for GET /status
pub async fn status_handler(State(state): State<AppState>) -> Json<ApiResponse<CacheStatus>> {
    Json(ApiResponse::ok("Cache status", state.cache.status()))
}

/// Handler for POST /status/reconnect
///
/// Retries the backend handshake, even out of memory fallback.
pub async fn reconnect_handler(State(state): State<AppState>) -> Json<ApiResponse<CacheStatus>> {
    info!("Reconnect requested");
    state.cache.connect().await;
    Json(ApiResponse::ok("Reconnect attempted", state.cache.status()))
}

/// Handler for GET /health
///
/// Answers 503 with `success: false` while the cache is between states.
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let healthy = state.cache.is_healthy();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = if healthy {
        "Cache is serving requests"
    } else {
        "Cache backend is reconnecting"
    };

    (
        status,
        Json(ApiResponse {
            success: healthy,
            message: message.to_string(),
            data: Some(HealthResponse::new(healthy, state.cache.backend_name())),
        }),
    )
}

/// Handler for POST /auth/logout
///
/// Blacklists the caller's token for `expires_in` seconds, or for the
/// configured token lifetime when the body omits it.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedToken(token)): Extension<AuthenticatedToken>,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<ApiResponse<()>>> {
    let ttl = body
        .and_then(|Json(req)| req.expires_in)
        .unwrap_or(state.config.token_ttl);

    state.cache.add_to_blacklist(&token, ttl).await?;
    info!(ttl, "Token revoked");

    Ok(Json(ApiResponse::message("Logged out")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::ScriptedBackend;
    use crate::cache::ConnectionState;

    async fn test_state() -> AppState {
        let cache = ResilientCache::new(
            Arc::new(ScriptedBackend::default()),
            CacheSettings::default(),
        );
        cache.connect().await;
        AppState::new(Arc::new(cache), Config::default())
    }

    fn set_request(key: &str, value: Value) -> Json<SetRequest> {
        Json(SetRequest {
            key: key.to_string(),
            value,
            ttl: None,
        })
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state().await;

        let result = set_handler(
            State(state.clone()),
            set_request("test_key", serde_json::json!({"x": 1})),
        )
        .await;
        assert!(result.is_ok());

        let response = get_handler(State(state), Path("test_key".to_string()))
            .await
            .unwrap();
        let data = response.0.data.unwrap();
        assert_eq!(data.value, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let state = test_state().await;

        let result = get_handler(State(state), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = test_state().await;
        let _stored = set_handler(State(state.clone()), set_request("to_delete", "v".into()))
            .await
            .unwrap();

        assert!(delete_handler(State(state.clone()), Path("to_delete".to_string()))
            .await
            .is_ok());
        assert!(matches!(
            delete_handler(State(state), Path("to_delete".to_string())).await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_incr_and_exists_handlers() {
        let state = test_state().await;

        for expected in 1..=3 {
            let response = incr_handler(State(state.clone()), Path("hits".to_string()))
                .await
                .unwrap();
            assert_eq!(response.0.data.unwrap().value, expected);
        }

        let response = exists_handler(State(state), Path("hits".to_string())).await.unwrap();
        assert!(response.0.data.unwrap().exists);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let state = test_state().await;
        let _stored = set_handler(State(state.clone()), set_request("name", "bob".into()))
            .await
            .unwrap();

        let result = incr_handler(State(state), Path("name".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotAnInteger(_))));
    }

    #[tokio::test]
    async fn test_expire_missing_key() {
        let state = test_state().await;

        let result = expire_handler(
            State(state),
            Path("missing".to_string()),
            Json(ExpireRequest { seconds: 5 }),
        )
        .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let state = test_state().await;

        let result = set_handler(State(state), set_request("", "value".into())).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_status_and_health_handlers() {
        let state = test_state().await;

        let status = status_handler(State(state.clone())).await.0.data.unwrap();
        assert_eq!(status.state, ConnectionState::Connected);

        let (code, health) = health_handler(State(state)).await;
        assert_eq!(code, StatusCode::OK);
        assert!(health.0.success);
        assert_eq!(health.0.data.unwrap().status, "healthy");
    }

    #[tokio::test]
    async fn test_logout_blacklists_token() {
        let state = test_state().await;

        let response = logout_handler(
            State(state.clone()),
            Extension(AuthenticatedToken("tok".to_string())),
            None,
        )
        .await
        .unwrap();
        assert!(response.0.success);

        assert!(state.cache.is_token_blacklisted("tok").await);
        assert!(!state.cache.is_token_blacklisted("other").await);
    }

    #[tokio::test]
    async fn test_health_degraded_reports_failure() {
        let cache = ResilientCache::new(
            Arc::new(ScriptedBackend::unreachable()),
            CacheSettings::default(),
        );
        // one failed handshake out of three: disconnected, not yet fallback
        cache.connect().await;
        let state = AppState::new(Arc::new(cache), Config::default());

        let (code, health) = health_handler(State(state)).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!health.0.success);
        assert_eq!(health.0.data.unwrap().status, "degraded");
    }

    #[tokio::test]
    async fn test_api_keys_cannot_reach_internal_keys() {
        let state = test_state().await;
        state.cache.add_to_blacklist("revoked", 3600).await.unwrap();

        let result =
            delete_handler(State(state.clone()), Path("blacklist:revoked".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));

        let _stored = set_handler(
            State(state.clone()),
            set_request("blacklist:victim", serde_json::json!(true)),
        )
        .await
        .unwrap();

        assert!(state.cache.is_token_blacklisted("revoked").await);
        assert!(!state.cache.is_token_blacklisted("victim").await);
    }
}
