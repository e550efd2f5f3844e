// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Tunables for the processing queue, FTP estimation and subscription plans
//! have defaults; credentials are required.

use std::env;
use std::str::FromStr;

/// Delayed-processing queue settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Minimum age (seconds) of a queued activity before it is drained.
    pub delay_interval_secs: i64,
    /// Default number of queued activities processed per drain.
    pub batch_size: usize,
    /// Attempts allowed before a failing activity is dropped from the queue.
    pub max_retries: u32,
    /// How often the in-process poller checks the watermark (seconds).
    pub poll_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            delay_interval_secs: 600,
            batch_size: 10,
            max_retries: 3,
            poll_interval_secs: 60,
        }
    }
}

/// FTP estimation settings.
#[derive(Debug, Clone)]
pub struct FtpConfig {
    /// How many weeks of history feed an estimate.
    pub weeks: i64,
    /// Cooldown between FTP updates (hours).
    pub since_last_hours: i64,
    /// Fraction of FTP lost per full idle week.
    pub idle_loss_per_week: f64,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            weeks: 14,
            since_last_hours: 24,
            idle_loss_per_week: 0.005,
        }
    }
}

/// Limits that depend on the user's subscription.
#[derive(Debug, Clone)]
pub struct PlanLimits {
    /// Recipes evaluated for free users (extra recipes are ignored).
    pub free_max_recipes: usize,
    /// Batch processing lookback for free users (days).
    pub free_batch_days: i64,
    /// Batch processing lookback for PRO users (days).
    pub pro_batch_days: i64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            free_max_recipes: 5,
            free_batch_days: 30,
            pro_batch_days: 365,
        }
    }
}

impl PlanLimits {
    pub fn batch_days(&self, is_pro: bool) -> i64 {
        if is_pro {
            self.pro_batch_days
        } else {
            self.free_batch_days
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Expected webhook subscription ID (checked when set)
    pub strava_subscription_id: Option<u64>,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Processed activities older than this are removed by the cleanup task.
    pub processed_retention_days: u32,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Webhook verification token
    pub webhook_verify_token: String,
    /// Shared secret for scheduler and internal API calls
    pub internal_api_token: String,

    pub queue: QueueConfig,
    pub ftp: FtpConfig,
    pub plans: PlanLimits,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_subscription_id: Some(12345),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            processed_retention_days: 365,
            strava_client_secret: "test_secret".to_string(),
            webhook_verify_token: "test_verify_token".to_string(),
            internal_api_token: "test_internal_token".to_string(),
            queue: QueueConfig::default(),
            ftp: FtpConfig::default(),
            plans: PlanLimits::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let queue_defaults = QueueConfig::default();
        let ftp_defaults = FtpConfig::default();
        let plan_defaults = PlanLimits::default();

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_subscription_id: optional_var("STRAVA_SUBSCRIPTION_ID")?,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_var("PORT", 8080)?,
            processed_retention_days: parse_var("PROCESSED_RETENTION_DAYS", 365)?,

            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            webhook_verify_token: env::var("WEBHOOK_VERIFY_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WEBHOOK_VERIFY_TOKEN"))?,
            internal_api_token: env::var("INTERNAL_API_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("INTERNAL_API_TOKEN"))?,

            queue: QueueConfig {
                delay_interval_secs: parse_var(
                    "QUEUE_DELAY_INTERVAL_SECS",
                    queue_defaults.delay_interval_secs,
                )?,
                batch_size: parse_var("QUEUE_BATCH_SIZE", queue_defaults.batch_size)?,
                max_retries: parse_var("QUEUE_MAX_RETRIES", queue_defaults.max_retries)?,
                poll_interval_secs: parse_var(
                    "QUEUE_POLL_INTERVAL_SECS",
                    queue_defaults.poll_interval_secs,
                )?,
            },
            ftp: FtpConfig {
                weeks: parse_var("FTP_WEEKS", ftp_defaults.weeks)?,
                since_last_hours: parse_var("FTP_SINCE_LAST_HOURS", ftp_defaults.since_last_hours)?,
                idle_loss_per_week: parse_var(
                    "FTP_IDLE_LOSS_PER_WEEK",
                    ftp_defaults.idle_loss_per_week,
                )?,
            },
            plans: PlanLimits {
                free_max_recipes: parse_var("FREE_MAX_RECIPES", plan_defaults.free_max_recipes)?,
                free_batch_days: parse_var("FREE_BATCH_DAYS", plan_defaults.free_batch_days)?,
                pro_batch_days: parse_var("PRO_BATCH_DAYS", plan_defaults.pro_batch_days)?,
            },
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn optional_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        _ => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
