//! API Routes
//!
//! Configures the Axum router and wires the cache-backed middleware.

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, exists_handler, expire_handler, get_handler, health_handler, incr_handler,
    logout_handler, reconnect_handler, set_handler, status_handler, AppState,
};
use crate::cache::keys;
use crate::middleware::{
    cache_response, invalidate, rate_limit, require_token, CacheInvalidator, RateLimitConfig,
    RateLimiter, ResponseCache,
};

/// Cached responses dropped after any key-value mutation.
const KV_RESPONSES: &str = "cache:/api/kv*";

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health`, `GET /status`, `POST /status/reconnect` (public)
/// - `PUT /api/kv`, `GET|DELETE /api/kv/:key`, `GET /api/kv/:key/exists`,
///   `POST /api/kv/:key/incr`, `POST /api/kv/:key/expire`
/// - `POST /auth/logout`
///
/// Everything outside the public group needs a bearer token and is rate
/// limited per token. Key-value reads are response-cached and mutations
/// invalidate those cached reads.
pub fn create_router(state: AppState) -> Router {
    let cache = state.cache.clone();
    let config = state.config.clone();

    let limiter = RateLimiter::new(
        cache.clone(),
        RateLimitConfig::new(config.rate_limit_max_requests, config.rate_limit_window),
    );
    let cached = from_fn_with_state(
        ResponseCache::new(
            cache.clone(),
            config.response_cache_ttl,
            keys::RESPONSE_CACHE_PREFIX,
        ),
        cache_response,
    );
    let invalidating = from_fn_with_state(CacheInvalidator::new(cache, KV_RESPONSES), invalidate);

    let protected = Router::new()
        .route("/api/kv", put(set_handler).layer(invalidating.clone()))
        .route(
            "/api/kv/:key",
            get(get_handler)
                .layer(cached)
                .merge(delete(delete_handler).layer(invalidating.clone())),
        )
        .route("/api/kv/:key/exists", get(exists_handler))
        .route(
            "/api/kv/:key/incr",
            post(incr_handler).layer(invalidating.clone()),
        )
        .route(
            "/api/kv/:key/expire",
            post(expire_handler).layer(invalidating),
        )
        .route("/auth/logout", post(logout_handler))
        // the last route_layer runs first: auth, then the per-token counter
        .route_layer(from_fn_with_state(limiter, rate_limit))
        .route_layer(from_fn_with_state(state.clone(), require_token));

    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/status/reconnect", post(reconnect_handler));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{self, header, StatusCode},
    };
    use tower::util::ServiceExt;

    use crate::cache::testing::memory_only_cache;
    use crate::config::Config;

    async fn create_test_app() -> Router {
        let state = AppState::new(memory_only_cache().await, Config::default());
        create_router(state)
    }

    fn authed(method: &str, uri: &str, body: Body) -> http::Request<Body> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, "Bearer test-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                http::Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                http::Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_kv_requires_token() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                http::Request::builder()
                    .uri("/api/kv/anything")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_set_endpoint() {
        let app = create_test_app().await;

        let response = app
            .oneshot(authed(
                "PUT",
                "/api/kv",
                Body::from(r#"{"key":"test","value":"hello"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let app = create_test_app().await;

        let response = app
            .oneshot(authed("GET", "/api/kv/nonexistent", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_drops_cached_read() {
        let cache = memory_only_cache().await;
        let app = create_router(AppState::new(Arc::clone(&cache), Config::default()));

        app.clone()
            .oneshot(authed(
                "PUT",
                "/api/kv",
                Body::from(r#"{"key":"k","value":1}"#),
            ))
            .await
            .unwrap();
        app.clone()
            .oneshot(authed("GET", "/api/kv/k", Body::empty()))
            .await
            .unwrap();
        assert!(cache.exists("cache:/api/kv/k").await);

        let response = app
            .oneshot(authed("DELETE", "/api/kv/k", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!cache.exists("cache:/api/kv/k").await);
    }
}
