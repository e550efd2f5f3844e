// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared-secret authentication for scheduler and internal API routes.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header carrying the internal API token.
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Require a valid `x-internal-token` header for `/tasks/*` and `/api/*` routes.
pub async fn require_internal_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = request
        .headers()
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok());

    let Some(provided) = provided else {
        tracing::warn!(path = %request.uri().path(), "Blocked request without internal token");
        return Err(StatusCode::UNAUTHORIZED);
    };

    if !token_matches(provided, &state.config.internal_api_token) {
        tracing::warn!(path = %request.uri().path(), "Blocked request with invalid internal token");
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}

fn token_matches(provided: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
