//! Error types for the cache service
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache service and its HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Value could not be serialized or a stored value could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network backend failure (unreachable, timed out, protocol error)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Increment on a value that is not an integer
    #[error("Value at '{0}' is not an integer")]
    NotAnInteger(String),

    /// Increment past `i64::MAX`
    #[error("Increment of '{0}' would overflow")]
    IncrementOverflow(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or revoked bearer token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_)
            | CacheError::NotAnInteger(_)
            | CacheError::IncrementOverflow(_)
            | CacheError::Serialization(_) => StatusCode::BAD_REQUEST,
            CacheError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CacheError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
            "data": null
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache service.
pub type Result<T> = std::result::Result<T, CacheError>;
