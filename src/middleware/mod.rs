//! Middleware Module
//!
//! The cache's consumers on the request path.
//!
//! - `auth`: bearer-token gate backed by the token blacklist
//! - `rate_limit`: fixed-window request counters
//! - `response_cache`: GET response caching and pattern invalidation

pub mod auth;
pub mod rate_limit;
pub mod response_cache;

pub use auth::{extract_bearer_token, require_token, AuthenticatedToken};
pub use rate_limit::{rate_limit, RateLimitConfig, RateLimiter};
pub use response_cache::{cache_response, invalidate, CacheInvalidator, ResponseCache};
