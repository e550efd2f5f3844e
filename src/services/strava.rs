// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for fetching and updating activities.
//!
//! Handles:
//! - Activity fetching and paginated listing
//! - Activity and athlete updates
//! - Power streams for interval analysis
//! - Rate limit and not-found detection (queue retry vs. drop)
//! - Access token refresh

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{PowerStream, StravaActivity, StravaTokens, User, UserUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const STRAVA_API_URL: &str = "https://www.strava.com/api/v3";
const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";

/// Page size for the athlete activities endpoint (Strava maximum).
const ACTIVITIES_PER_PAGE: u32 = 200;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Provider operations the pipeline depends on.
///
/// `get_activity` must return [`AppError::NotFound`] for deleted or
/// inaccessible activities so they are dropped instead of retried.
#[async_trait]
pub trait ActivityProvider: Send + Sync {
    async fn get_activity(&self, user: &User, activity_id: u64)
        -> Result<StravaActivity, AppError>;

    /// All activities that started inside `(after, before)`.
    async fn list_activities(
        &self,
        user: &User,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<StravaActivity>, AppError>;

    /// Push the activity's `updated_fields` to Strava.
    async fn update_activity(&self, user: &User, activity: &StravaActivity)
        -> Result<(), AppError>;

    async fn get_athlete(&self, user: &User) -> Result<StravaAthlete, AppError>;

    async fn update_athlete_ftp(&self, user: &User, ftp: u32) -> Result<(), AppError>;

    /// Watts stream for an activity, `None` when the activity has no power data.
    async fn get_power_stream(
        &self,
        user: &User,
        activity_id: u64,
    ) -> Result<Option<PowerStream>, AppError>;
}

/// Authenticated athlete profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaAthlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub ftp: Option<u32>,
}

/// Token refresh response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self::with_urls(STRAVA_API_URL, STRAVA_TOKEN_URL, client_id, client_secret)
    }

    /// Client against another API host, e.g. a local stand-in.
    pub fn with_urls(
        base_url: &str,
        token_url: &str,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            client_id,
            client_secret,
        }
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token refresh request failed: {}", e)))?;

        check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);
        self.get_json(&url, access_token, &[]).await
    }

    /// List one page of the athlete's activities.
    pub async fn list_activities(
        &self,
        access_token: &str,
        after: i64, // Unix timestamp
        before: i64,
        page: u32,
    ) -> Result<Vec<StravaActivity>, AppError> {
        let url = format!("{}/athlete/activities", self.base_url);
        self.get_json(
            &url,
            access_token,
            &[
                ("after", after.to_string()),
                ("before", before.to_string()),
                ("page", page.to_string()),
                ("per_page", ACTIVITIES_PER_PAGE.to_string()),
            ],
        )
        .await
    }

    /// Update an activity with a partial JSON body.
    pub async fn update_activity(
        &self,
        access_token: &str,
        activity_id: u64,
        body: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AppError> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);

        let response = self
            .http
            .put(&url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response(response).await.map(|_| ())
    }

    /// Get authenticated athlete profile.
    pub async fn get_athlete(&self, access_token: &str) -> Result<StravaAthlete, AppError> {
        let url = format!("{}/athlete", self.base_url);
        self.get_json(&url, access_token, &[]).await
    }

    pub async fn update_athlete_ftp(&self, access_token: &str, ftp: u32) -> Result<(), AppError> {
        let url = format!("{}/athlete", self.base_url);

        let response = self
            .http
            .put(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "ftp": ftp }))
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response(response).await.map(|_| ())
    }

    /// Get the watts stream of an activity.
    pub async fn get_power_stream(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<Option<PowerStream>, AppError> {
        let url = format!("{}/activities/{}/streams", self.base_url, activity_id);
        let mut streams: HashMap<String, PowerStream> = self
            .get_json(
                &url,
                access_token,
                &[
                    ("keys", "watts".to_string()),
                    ("key_by_type", "true".to_string()),
                ],
            )
            .await?;

        Ok(streams.remove("watts"))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
    }
}

/// Check response status and map failures to application errors.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        404 => Err(AppError::NotFound(format!("Strava: {}", body))),
        429 => {
            tracing::warn!("Strava rate limit hit (429)");
            Err(AppError::StravaApi(AppError::STRAVA_RATE_LIMIT.to_string()))
        }
        401 => Err(AppError::StravaApi(AppError::STRAVA_TOKEN_ERROR.to_string())),
        _ => Err(AppError::StravaApi(format!("HTTP {}: {}", status, body))),
    }
}

/// Cached access token with expiry information.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Provider implementation backed by the Strava REST API.
///
/// Access tokens come from the user document and are refreshed shortly
/// before they expire. Refreshed tokens are written back to the user and
/// cached for later calls.
pub struct StravaService {
    client: StravaClient,
    users: Arc<dyn UserStore>,
    token_cache: DashMap<u64, CachedToken>,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: DashMap<u64, Arc<Mutex<()>>>,
}

fn token_is_fresh(expires_at: i64, now: i64) -> bool {
    now + TOKEN_REFRESH_MARGIN_SECS < expires_at
}

fn token_error() -> AppError {
    AppError::StravaApi(AppError::STRAVA_TOKEN_ERROR.to_string())
}

impl StravaService {
    pub fn new(client: StravaClient, users: Arc<dyn UserStore>) -> Self {
        Self {
            client,
            users,
            token_cache: DashMap::new(),
            refresh_locks: DashMap::new(),
        }
    }

    fn cached_token(&self, athlete_id: u64, now: i64) -> Option<String> {
        self.token_cache
            .get(&athlete_id)
            .filter(|cached| token_is_fresh(cached.expires_at, now))
            .map(|cached| cached.access_token.clone())
    }

    fn cache_token(&self, athlete_id: u64, tokens: &StravaTokens) -> String {
        self.token_cache.insert(
            athlete_id,
            CachedToken {
                access_token: tokens.access_token.clone(),
                expires_at: tokens.expires_at,
            },
        );
        tokens.access_token.clone()
    }

    /// A valid access token for the user, refreshing it when it is about
    /// to expire.
    pub async fn access_token(&self, user: &User) -> Result<String, AppError> {
        let athlete_id = user.id;
        let now = Utc::now().timestamp();

        if let Some(token) = self.cached_token(athlete_id, now) {
            return Ok(token);
        }

        let tokens = user.strava_tokens.as_ref().ok_or_else(token_error)?;
        if token_is_fresh(tokens.expires_at, now) {
            return Ok(self.cache_token(athlete_id, tokens));
        }

        let lock = self
            .refresh_locks
            .entry(athlete_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        if let Some(token) = self.cached_token(athlete_id, now) {
            return Ok(token);
        }

        if tokens.refresh_token.is_empty() {
            tracing::warn!(athlete_id, "Strava access token expired, no refresh token");
            return Err(token_error());
        }

        tracing::info!(athlete_id, "Access token expired, refreshing");

        let refreshed = match self.client.refresh_token(&tokens.refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                // Another instance may have refreshed first, invalidating our
                // refresh token. Its tokens are on the user document.
                if let Some(token) = self.reload_token(athlete_id, tokens, now).await {
                    return Ok(token);
                }
                tracing::warn!(athlete_id, error = %e, "Strava token refresh failed");
                return Err(e);
            }
        };

        let new_tokens = StravaTokens {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed.expires_at,
        };

        let update = UserUpdate {
            strava_tokens: Some(new_tokens.clone()),
            ..Default::default()
        };
        if let Err(e) = self.users.update_user(athlete_id, &update).await {
            tracing::error!(athlete_id, error = %e, "Failed to store refreshed Strava tokens");
        }

        tracing::info!(athlete_id, "Strava access token refreshed");
        Ok(self.cache_token(athlete_id, &new_tokens))
    }

    /// Fresh tokens stored for the user by someone else, if any.
    async fn reload_token(&self, athlete_id: u64, stale: &StravaTokens, now: i64) -> Option<String> {
        let user = match self.users.get_user(athlete_id).await {
            Ok(user) => user?,
            Err(e) => {
                tracing::warn!(athlete_id, error = %e, "Failed to reload Strava tokens");
                return None;
            }
        };
        let tokens = user
            .strava_tokens
            .filter(|t| t.access_token != stale.access_token && token_is_fresh(t.expires_at, now))?;

        tracing::info!(athlete_id, "Using Strava tokens refreshed elsewhere");
        Some(self.cache_token(athlete_id, &tokens))
    }
}

#[async_trait]
impl ActivityProvider for StravaService {
    async fn get_activity(
        &self,
        user: &User,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        let token = self.access_token(user).await?;
        self.client.get_activity(&token, activity_id).await
    }

    async fn list_activities(
        &self,
        user: &User,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<StravaActivity>, AppError> {
        let token = self.access_token(user).await?;
        let mut activities = Vec::new();
        let mut page = 1;

        loop {
            let batch = self
                .client
                .list_activities(&token, after.timestamp(), before.timestamp(), page)
                .await?;
            let done = batch.len() < ACTIVITIES_PER_PAGE as usize;
            activities.extend(batch);
            if done {
                break;
            }
            page += 1;
        }

        tracing::debug!(
            athlete_id = user.id,
            count = activities.len(),
            pages = page,
            "Listed Strava activities"
        );
        Ok(activities)
    }

    async fn update_activity(
        &self,
        user: &User,
        activity: &StravaActivity,
    ) -> Result<(), AppError> {
        let token = self.access_token(user).await?;
        let body = activity.update_payload();

        match self.client.update_activity(&token, activity.id, &body).await {
            Ok(()) => Ok(()),
            Err(AppError::StravaApi(msg)) => Err(AppError::StravaWrite(msg)),
            Err(AppError::NotFound(msg)) => Err(AppError::StravaWrite(msg)),
            Err(e) => Err(e),
        }
    }

    async fn get_athlete(&self, user: &User) -> Result<StravaAthlete, AppError> {
        let token = self.access_token(user).await?;
        self.client.get_athlete(&token).await
    }

    async fn update_athlete_ftp(&self, user: &User, ftp: u32) -> Result<(), AppError> {
        let token = self.access_token(user).await?;
        self.client.update_athlete_ftp(&token, ftp).await
    }

    async fn get_power_stream(
        &self,
        user: &User,
        activity_id: u64,
    ) -> Result<Option<PowerStream>, AppError> {
        let token = self.access_token(user).await?;
        match self.client.get_power_stream(&token, activity_id).await {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }
}
