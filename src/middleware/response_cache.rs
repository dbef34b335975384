//! Response caching middleware
//!
//! Serves repeated GET requests from the resilient cache and drops cached
//! responses after mutating requests succeed.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{keys, ResilientCache, MAX_VALUE_SIZE};
use crate::error::CacheError;

fn x_cache() -> HeaderName {
    HeaderName::from_static("x-cache")
}

/// Middleware state for [`cache_response`].
#[derive(Clone)]
pub struct ResponseCache {
    cache: Arc<ResilientCache>,
    ttl_seconds: u64,
    prefix: String,
}

impl ResponseCache {
    pub fn new(cache: Arc<ResilientCache>, ttl_seconds: u64, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            ttl_seconds,
            prefix: prefix.into(),
        }
    }
}

/// Answers GET requests from the cache when possible.
///
/// On a miss the handler runs and its body is stored when the status is 200
/// and the JSON envelope says `success: true`.
pub async fn cache_response(
    State(rc): State<ResponseCache>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = keys::response(&rc.prefix, &path);

    match rc.cache.get::<Value>(&key).await {
        Ok(Some(body)) => {
            debug!(key = %key, "Cache HIT");
            let mut response = Json(body).into_response();
            response
                .headers_mut()
                .insert(x_cache(), HeaderValue::from_static("HIT"));
            return response;
        }
        Ok(None) => debug!(key = %key, "Cache MISS"),
        Err(e) => warn!(key = %key, error = %e, "Ignoring undecodable cached response"),
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => return CacheError::Internal(e.to_string()).into_response(),
    };

    if bytes.len() <= MAX_VALUE_SIZE {
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            if value.get("success").and_then(Value::as_bool) == Some(true) {
                if let Err(e) = rc.cache.set(&key, &value, Some(rc.ttl_seconds)).await {
                    warn!(key = %key, error = %e, "Failed to cache response");
                }
            }
        }
    }

    parts
        .headers
        .insert(x_cache(), HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

/// Middleware state for [`invalidate`].
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<ResilientCache>,
    pattern: String,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<ResilientCache>, pattern: impl Into<String>) -> Self {
        Self {
            cache,
            pattern: pattern.into(),
        }
    }
}

/// Drops every cached response matching the pattern once the wrapped
/// handler answers 200 or 201.
pub async fn invalidate(
    State(inv): State<CacheInvalidator>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if matches!(response.status(), StatusCode::OK | StatusCode::CREATED) {
        inv.cache.invalidate_pattern(&inv.pattern).await;
    }
    response
}
