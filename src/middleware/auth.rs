//! Authentication middleware
//!
//! Requires a bearer token and rejects tokens revoked through logout.
//! Token signatures are checked upstream; here the token is opaque.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::api::AppState;
use crate::error::CacheError;

/// Bearer token of the current request, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedToken(pub String);

/// Returns the token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a bearer token or with a blacklisted one.
pub async fn require_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, CacheError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_string)
        .ok_or_else(|| CacheError::Unauthorized("Access token required".to_string()))?;

    if state.cache.is_token_blacklisted(&token).await {
        warn!(path = %request.uri().path(), "Rejected revoked token");
        return Err(CacheError::Unauthorized(
            "Token has been revoked".to_string(),
        ));
    }

    debug!(path = %request.uri().path(), "Bearer token accepted");
    request.extensions_mut().insert(AuthenticatedToken(token));

    Ok(next.run(request).await)
}
