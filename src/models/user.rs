// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use crate::models::Recipe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Strava athlete ID (also used as document ID)
    pub id: u64,
    pub display_name: String,
    /// Automation recipes keyed by recipe ID
    #[serde(default)]
    pub recipes: HashMap<String, Recipe>,
    /// Suspended accounts are never processed
    #[serde(default)]
    pub suspended: bool,
    /// Strava write access is missing or revoked
    #[serde(default)]
    pub write_suspended: bool,
    #[serde(default)]
    pub is_pro: bool,
    #[serde(default)]
    pub profile: AthleteProfile,
    #[serde(default)]
    pub preferences: UserPreferences,
    #[serde(
        default,
        with = "crate::time_utils::rfc3339_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_last_ftp_update: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "crate::time_utils::rfc3339_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_last_batch_processing: Option<DateTime<Utc>>,
    /// Number of activities processed for this user
    #[serde(default)]
    pub activity_count: u64,
    /// Strava access token, maintained by the auth flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strava_tokens: Option<StravaTokens>,
}

impl User {
    pub fn has_recipes(&self) -> bool {
        !self.recipes.is_empty()
    }

    /// Short label used in log lines.
    pub fn label(&self) -> String {
        format!("{} {}", self.id, self.display_name)
    }
}

/// Athlete data mirrored from Strava.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AthleteProfile {
    /// Current FTP in watts, when the athlete has set one
    #[serde(default)]
    pub ftp: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Don't store activity names and dates on processed records
    #[serde(default)]
    pub privacy_mode: bool,
    /// Let the FTP estimator update the athlete's FTP
    #[serde(default)]
    pub ftp_auto_update: bool,
    /// Queue webhook activities instead of processing them immediately
    #[serde(default)]
    pub delayed_processing: bool,
}

/// Strava OAuth tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StravaTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Unix timestamp
    pub expires_at: i64,
}

/// Partial update of the fields this service owns on a user.
///
/// Only the fields that are set are written, so concurrent updates of
/// different fields don't overwrite each other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(
        with = "crate::time_utils::rfc3339_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_last_ftp_update: Option<DateTime<Utc>>,
    #[serde(
        with = "crate::time_utils::rfc3339_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_last_batch_processing: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strava_tokens: Option<StravaTokens>,
}

impl UserUpdate {
    /// Document fields this update writes.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.date_last_ftp_update.is_some() {
            fields.push("date_last_ftp_update");
        }
        if self.date_last_batch_processing.is_some() {
            fields.push("date_last_batch_processing");
        }
        if self.strava_tokens.is_some() {
            fields.push("strava_tokens");
        }
        fields
    }

    pub fn apply_to(&self, user: &mut User) {
        if let Some(date) = self.date_last_ftp_update {
            user.date_last_ftp_update = Some(date);
        }
        if let Some(date) = self.date_last_batch_processing {
            user.date_last_batch_processing = Some(date);
        }
        if let Some(tokens) = &self.strava_tokens {
            user.strava_tokens = Some(tokens.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_fields_only_lists_set_values() {
        let update = UserUpdate {
            date_last_ftp_update: Some(Utc::now()),
            ..Default::default()
        };
        assert_eq!(update.fields(), vec!["date_last_ftp_update"]);
        assert!(UserUpdate::default().fields().is_empty());

        let json = serde_json::to_value(&update).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["date_last_ftp_update"]);
    }
}
