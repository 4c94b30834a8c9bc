//! HTTP middleware for the API layer.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;
use crate::domain::ErrorBody;

/// Constant-time comparison of two byte slices to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Pull the `apiKey` query parameter, the fallback credential location.
fn query_api_key(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == "apiKey" && !value.is_empty()).then(|| value.to_string())
    })
}

/// API key gate for every relay route.
///
/// Credential comes from the `x-api-key` header (or `apiKey` query parameter).
/// Missing key → 401, mismatch → 403; either way no handler or adapter runs.
/// Comparison goes through SHA-256 digests so it is constant-time with
/// respect to the secret.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| query_api_key(request.uri().query()));

    let Some(provided) = provided else {
        warn!(path = %request.uri().path(), "API auth failed: missing x-api-key header");
        metrics::counter!("relay_auth_denied_total", "reason" => "missing").increment(1);
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new("API key required")),
        )
            .into_response();
    };

    let expected_hash = Sha256::digest(state.api_key.expose_secret().as_bytes());
    let provided_hash = Sha256::digest(provided.as_bytes());

    if !constant_time_eq(expected_hash.as_slice(), provided_hash.as_slice()) {
        warn!(path = %request.uri().path(), "API auth failed: invalid x-api-key");
        metrics::counter!("relay_auth_denied_total", "reason" => "invalid").increment(1);
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorBody::new("Invalid API key")),
        )
            .into_response();
    }

    next.run(request).await
}
