use std::collections::HashMap;

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};

use crate::{ApiResponse, AppState};

/// Header carrying the admin token. `?token=` is accepted as well.
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// SHA-256 hex digest. Tokens are compared as fixed-length digests so the
/// comparison time does not depend on how much of the token matched.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_public(path: &str) -> bool {
    path == "/" || path == "/health"
}

fn provided_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    from_header.or_else(|| {
        Query::<HashMap<String, String>>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(mut params)| params.remove("token"))
            .filter(|v| !v.is_empty())
    })
}

/// Guards every route except the health checks with the admin token.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if is_public(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let expected = state.admin_token_hash().ok_or(AuthError::NotConfigured)?;
    let provided = provided_token(&request).ok_or(AuthError::MissingToken)?;

    if hash_token(&provided) != expected {
        tracing::warn!(path = %request.uri().path(), "Invalid admin token attempted");
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    NotConfigured,
    MissingToken,
    InvalidToken,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::NotConfigured => write!(f, "admin token not set on server"),
            AuthError::MissingToken => write!(f, "missing admin token"),
            AuthError::InvalidToken => write!(f, "forbidden"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::NotConfigured | AuthError::InvalidToken => StatusCode::FORBIDDEN,
            AuthError::MissingToken => StatusCode::UNAUTHORIZED,
        };
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str, header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(token) = header {
            builder = builder.header(ADMIN_TOKEN_HEADER, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn hash_is_stable_hex() {
        let hash = hash_token("secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("secret"));
        assert_ne!(hash, hash_token("Secret"));
    }

    #[test]
    fn token_from_header() {
        let req = request("/latest", Some("abc"));
        assert_eq!(provided_token(&req).as_deref(), Some("abc"));
    }

    #[test]
    fn token_from_query() {
        let req = request("/run-now?token=abc&x=1", None);
        assert_eq!(provided_token(&req).as_deref(), Some("abc"));
    }

    #[test]
    fn header_wins_over_query() {
        let req = request("/pause?token=from-query", Some("from-header"));
        assert_eq!(provided_token(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn blank_token_is_missing() {
        assert_eq!(provided_token(&request("/latest", Some("  "))), None);
        assert_eq!(provided_token(&request("/latest?token=", None)), None);
    }

    #[test]
    fn health_is_public() {
        assert!(is_public("/health"));
        assert!(is_public("/"));
        assert!(!is_public("/admin/active_trade"));
    }
}
