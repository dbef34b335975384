//! API Module
//!
//! HTTP handlers and routing for the cache service REST API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /status` - Connection state and memory statistics
//! - `POST /status/reconnect` - Retry the backend handshake
//! - `PUT /api/kv` - Store a JSON value
//! - `GET /api/kv/:key` - Retrieve a value by key
//! - `DELETE /api/kv/:key` - Delete a key
//! - `GET /api/kv/:key/exists` - Existence check
//! - `POST /api/kv/:key/incr` - Increment a counter
//! - `POST /api/kv/:key/expire` - Set a key's TTL
//! - `POST /auth/logout` - Revoke the caller's token

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
