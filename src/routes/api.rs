// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Internal API routes.
//!
//! Used by the companion web app and admin tooling. Every route is guarded
//! by the internal token middleware.

use crate::error::{AppError, Result};
use crate::models::{ActivityFilter, FtpEstimate, ProcessedActivity, ProcessedActivityQuery, User};
use crate::AppState;
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Internal API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users/{id}/activities", get(get_activities))
        .route("/api/users/{id}/batch", post(batch_process))
        .route("/api/users/{id}/ftp", get(estimate_ftp).post(save_ftp))
}

async fn load_user(state: &AppState, athlete_id: u64) -> Result<User> {
    state
        .users
        .get_user(athlete_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {athlete_id}")))
}

// ─── Processed activities ────────────────────────────────────

#[derive(Deserialize)]
struct ActivitiesQuery {
    /// Only records processed at or after this time (RFC3339)
    from: Option<DateTime<Utc>>,
    /// Only records processed at or before this time (RFC3339)
    to: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ActivitiesResponse {
    activities: Vec<ProcessedActivity>,
}

/// List the user's processed activities, most recent first.
async fn get_activities(
    State(state): State<Arc<AppState>>,
    Path(athlete_id): Path<u64>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(AppError::BadRequest(
                "'from' must not be after 'to'".to_string(),
            ));
        }
    }

    let user = load_user(&state, athlete_id).await?;
    let query = ProcessedActivityQuery {
        user_id: Some(user.id),
        date_from: params.from,
        date_to: params.to,
        limit: Some(params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)),
    };

    let activities = state.processor.get_processed_activities(&query).await?;
    tracing::debug!(
        athlete_id,
        count = activities.len(),
        "Fetched processed activities"
    );
    Ok(Json(ActivitiesResponse { activities }))
}

// ─── Batch processing ────────────────────────────────────────

#[derive(Deserialize)]
struct BatchRequest {
    date_from: DateTime<Utc>,
    date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    filter: ActivityFilter,
}

#[derive(Serialize)]
struct BatchResponse {
    queued: usize,
}

/// Queue the user's past activities for processing.
async fn batch_process(
    State(state): State<Arc<AppState>>,
    Path(athlete_id): Path<u64>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>> {
    let user = load_user(&state, athlete_id).await?;
    let queued = state
        .processor
        .batch_process(&user, request.date_from, request.date_to, &request.filter)
        .await?;
    Ok(Json(BatchResponse { queued }))
}

// ─── FTP ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct FtpEstimateResponse {
    estimate: Option<FtpEstimate>,
}

/// Estimate the user's FTP from recent activities.
async fn estimate_ftp(
    State(state): State<Arc<AppState>>,
    Path(athlete_id): Path<u64>,
) -> Result<Json<FtpEstimateResponse>> {
    let mut user = load_user(&state, athlete_id).await?;
    let estimate = state.ftp.estimate(&mut user, None).await?;
    Ok(Json(FtpEstimateResponse { estimate }))
}

#[derive(Deserialize)]
struct SaveFtpRequest {
    ftp: i64,
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
struct SaveFtpResponse {
    updated: bool,
}

/// Save a new FTP on Strava.
async fn save_ftp(
    State(state): State<Arc<AppState>>,
    Path(athlete_id): Path<u64>,
    Json(request): Json<SaveFtpRequest>,
) -> Result<Json<SaveFtpResponse>> {
    let mut user = load_user(&state, athlete_id).await?;
    let updated = state.ftp.save(&mut user, request.ftp, request.force).await?;
    Ok(Json(SaveFtpResponse { updated }))
}
