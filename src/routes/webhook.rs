// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Strava events.

use crate::AppState;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", get(verify).post(handle_event))
}

/// Strava webhook verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: String,
    #[serde(rename = "hub.challenge")]
    challenge: String,
    #[serde(rename = "hub.verify_token")]
    verify_token: String,
}

/// Verification response.
#[derive(Serialize, Default)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Verify webhook subscription (GET).
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    if params.mode == "subscribe" && params.verify_token == state.config.webhook_verify_token {
        tracing::info!("Webhook subscription verified");
        (
            StatusCode::OK,
            Json(VerifyResponse {
                challenge: params.challenge,
            }),
        )
    } else {
        tracing::warn!(
            mode = %params.mode,
            "Webhook verification failed: invalid token"
        );
        (StatusCode::FORBIDDEN, Json(VerifyResponse::default()))
    }
}

/// Strava webhook event payload.
#[derive(Deserialize, Debug)]
struct WebhookEvent {
    object_type: String, // "activity" or "athlete"
    object_id: u64,
    aspect_type: String, // "create", "update", "delete"
    owner_id: u64,
    subscription_id: u64,
}

/// Handle incoming webhook events (POST).
///
/// Always answers 200 so Strava does not redeliver; failures are logged.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    let event: WebhookEvent = match serde_json::from_value(payload) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse webhook event");
            return StatusCode::OK;
        }
    };

    if let Some(expected) = state.config.strava_subscription_id {
        if event.subscription_id != expected {
            tracing::warn!(
                received_id = event.subscription_id,
                expected_id = expected,
                "Webhook subscription ID mismatch, ignoring event"
            );
            return StatusCode::OK;
        }
    }

    tracing::info!(
        object_type = %event.object_type,
        object_id = event.object_id,
        aspect_type = %event.aspect_type,
        owner_id = event.owner_id,
        "Webhook event received"
    );

    match (event.object_type.as_str(), event.aspect_type.as_str()) {
        ("activity", "create") => handle_activity_created(state, event.owner_id, event.object_id).await,
        _ => {
            tracing::debug!(
                object_type = %event.object_type,
                aspect_type = %event.aspect_type,
                "Ignoring webhook event"
            );
        }
    }

    StatusCode::OK
}

async fn handle_activity_created(state: Arc<AppState>, athlete_id: u64, activity_id: u64) {
    let user = match state.users.get_user(athlete_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(athlete_id, activity_id, "Webhook for unknown athlete");
            return;
        }
        Err(e) => {
            tracing::error!(athlete_id, activity_id, error = %e, "Failed to load athlete");
            return;
        }
    };

    if user.preferences.delayed_processing {
        if let Err(e) = state.queue.enqueue(&user, activity_id, false).await {
            tracing::error!(athlete_id, activity_id, error = %e, "Failed to queue activity");
        }
        return;
    }

    // Realtime path: answer Strava right away, process in the background.
    tokio::spawn(async move {
        let mut user = user;
        if let Err(e) = state.processor.process(&mut user, activity_id, false).await {
            tracing::error!(athlete_id, activity_id, error = %e, "Realtime processing failed");
        }
    });
}
