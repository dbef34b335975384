//! Rate limiting middleware
//!
//! Fixed-window counters kept in the resilient cache: the first request of
//! a window creates the counter and gives it the window as TTL.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::cache::{keys, ResilientCache};
use crate::middleware::auth::AuthenticatedToken;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: i64,
    /// Window size in seconds
    pub window_seconds: u64,
}

impl RateLimitConfig {
    pub fn new(max_requests: i64, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }

    /// 10 requests per 5 minutes
    pub fn strict() -> Self {
        Self::new(10, 300)
    }

    /// 100 requests per 15 minutes
    pub fn normal() -> Self {
        Self::new(100, 900)
    }

    /// 1000 requests per hour
    pub fn lenient() -> Self {
        Self::new(1000, 3600)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::normal()
    }
}

/// Middleware state: the cache holding the counters and the limits.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<ResilientCache>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<ResilientCache>, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }
}

/// Counter key: the bearer token when authenticated, else the client IP.
fn client_key(request: &Request) -> String {
    if let Some(AuthenticatedToken(token)) = request.extensions().get::<AuthenticatedToken>() {
        return keys::rate_limit_token(token);
    }

    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    keys::rate_limit_ip(&ip)
}

fn apply_headers(headers: &mut HeaderMap, limit: i64, count: i64, reset_at: DateTime<Utc>) {
    headers.insert(HeaderName::from_static("x-ratelimit-limit"), HeaderValue::from(limit));
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from((limit - count).max(0)),
    );
    if let Ok(reset) = HeaderValue::from_str(&reset_at.to_rfc3339()) {
        headers.insert(HeaderName::from_static("x-ratelimit-reset"), reset);
    }
}

/// Counts the request and answers 429 once the window's budget is spent.
///
/// A cache error never blocks the request.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let RateLimitConfig {
        max_requests,
        window_seconds,
    } = limiter.config;
    let key = client_key(&request);

    let count = match limiter.cache.incr(&key).await {
        Ok(count) => count,
        Err(e) => {
            warn!(key = %key, error = %e, "Rate limit counter unavailable, letting request through");
            return next.run(request).await;
        }
    };

    if count == 1 {
        limiter.cache.expire(&key, window_seconds).await;
    } else if count > max_requests && limiter.cache.ttl(&key).await.is_none() {
        // the first request's EXPIRE was lost; without a window the client
        // would stay limited forever
        warn!(key = %key, count, "Rate limit counter had no window, restarting it");
        limiter.cache.expire(&key, window_seconds).await;
    }

    let reset_at = Utc::now() + chrono::Duration::seconds(window_seconds as i64);

    if count > max_requests {
        debug!(key = %key, count, max_requests, "Rate limit exceeded");
        let body = Json(json!({
            "success": false,
            "message": "Too many requests, try again later",
            "data": null,
            "retry_after": window_seconds
        }));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        apply_headers(response.headers_mut(), max_requests, count, reset_at);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(window_seconds));
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), max_requests, count, reset_at);
    response
}
