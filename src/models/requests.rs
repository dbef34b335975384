//! Request DTOs for the HTTP API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::{MAX_KEY_LENGTH, MAX_VALUE_SIZE};

/// Request body for `PUT /api/kv`
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// Any JSON value
    pub value: serde_json::Value,
    /// Optional TTL in seconds; absent or 0 means no expiry
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            ));
        }
        if self.value.to_string().len() > MAX_VALUE_SIZE {
            return Some(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            ));
        }
        None
    }
}

/// Request body for `POST /api/kv/:key/expire`
#[derive(Debug, Clone, Deserialize)]
pub struct ExpireRequest {
    pub seconds: u64,
}

/// Optional request body for `POST /auth/logout`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    /// Seconds until the token would have expired on its own
    #[serde(default)]
    pub expires_in: Option<u64>,
}
