// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Caller supplied a value the pipeline refuses (bad FTP, date window, filters).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transient Strava failure (network, rate limit, 5xx). Retried via the queue.
    #[error("Strava API error: {0}")]
    StravaApi(String),

    /// Strava rejected an activity or athlete update.
    #[error("Strava rejected the update: {0}")]
    StravaWrite(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub const STRAVA_RATE_LIMIT: &'static str = "Rate limit exceeded";
    pub const STRAVA_TOKEN_ERROR: &'static str = "Token expired or invalid";

    /// True when the upstream object is gone and retrying is pointless.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// True when Strava refused our access token.
    pub fn is_strava_token_error(&self) -> bool {
        match self {
            AppError::StravaApi(msg) => {
                msg == Self::STRAVA_TOKEN_ERROR
                    || msg.contains("Token expired")
                    || msg.to_lowercase().contains("invalid")
            }
            _ => false,
        }
    }

    /// Message suitable for showing to the athlete (stored on the processed record).
    pub fn friendly_message(&self) -> String {
        match self {
            AppError::StravaWrite(msg) | AppError::StravaApi(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                Some(msg.clone()),
            ),
            AppError::StravaApi(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(msg.clone()))
            }
            AppError::StravaWrite(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_write_error", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
