//! Response DTOs for the HTTP API
//!
//! Every JSON body uses the `{success, message, data}` envelope.

use serde::{Deserialize, Serialize};

/// Response envelope shared by all endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Successful response without a payload
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Payload for key reads and writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValueData {
    pub key: String,
    pub value: serde_json::Value,
}

/// Payload for `POST /api/kv/:key/incr`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterData {
    pub key: String,
    pub value: i64,
}

/// Payload for `GET /api/kv/:key/exists`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistsData {
    pub key: String,
    pub exists: bool,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    /// Name of the network backend
    pub backend: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(healthy: bool, backend: &str) -> Self {
        Self {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            backend: backend.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
