// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task handler routes for the scheduler.
//!
//! These endpoints are called by Cloud Scheduler, not directly by users,
//! and are protected by the internal token middleware.

use crate::error::AppError;
use crate::services::DrainResult;
use crate::AppState;
use axum::{
    extract::{Json, Query, State},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Task handler routes (called by the scheduler).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/check-queue", post(check_queue))
        .route("/tasks/process-queue", post(process_queue))
        .route("/tasks/cleanup", post(cleanup))
}

#[derive(Serialize)]
struct CheckQueueResponse {
    drained: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<DrainResult>,
}

/// Drain the queue if the oldest queued activity is due.
async fn check_queue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CheckQueueResponse>, AppError> {
    let result = state.queue.check_queued(&state.processor).await?;
    Ok(Json(CheckQueueResponse {
        drained: result.is_some(),
        result,
    }))
}

#[derive(Deserialize)]
struct ProcessQueueParams {
    batch_size: Option<usize>,
}

/// Drain the queue unconditionally.
async fn process_queue(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProcessQueueParams>,
) -> Result<Json<DrainResult>, AppError> {
    if params.batch_size == Some(0) {
        return Err(AppError::BadRequest("batch_size must be positive".to_string()));
    }
    let result = state
        .queue
        .drain(&state.processor, params.batch_size)
        .await?;
    Ok(Json(result))
}

#[derive(Serialize)]
struct CleanupResponse {
    deleted: usize,
}

/// Delete processed activities older than the retention period.
async fn cleanup(State(state): State<Arc<AppState>>) -> Result<Json<CleanupResponse>, AppError> {
    let deleted = state
        .processor
        .delete_processed_activities(None, Some(state.config.processed_retention_days))
        .await?;
    Ok(Json(CleanupResponse { deleted }))
}
