// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity Automator API Server
//!
//! Receives Strava webhooks, applies each athlete's automation recipes to
//! new activities and keeps their FTP current.

use activity_automator::{
    config::Config,
    db::FirestoreDb,
    services::{notifications::spawn_event_logger, BasicRuleEngine, StravaClient, StravaService},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Activity Automator API");

    // Initialize Firestore database
    let db = Arc::new(FirestoreDb::new(&config.gcp_project_id).await?);

    let client = StravaClient::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
    );
    let provider = Arc::new(StravaService::new(client, db.clone()));
    let rules = Arc::new(BasicRuleEngine::new());

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        db.clone(),
        db,
        provider,
        rules,
    ));
    spawn_event_logger(&state.events);
    spawn_queue_poller(state.clone());

    // Build router
    let app = activity_automator::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drain the delayed-processing queue once its oldest entry is due.
fn spawn_queue_poller(state: Arc<AppState>) {
    let period = Duration::from_secs(state.queue.config().poll_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match state.queue.check_queued(&state.processor).await {
                Ok(Some(result)) => tracing::info!(
                    processed = result.processed,
                    skipped = result.skipped,
                    retrying = result.retrying,
                    dropped = result.dropped_ids.len(),
                    "Queue drained"
                ),
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "Queue poll failed"),
            }
        }
    });
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("activity_automator=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
