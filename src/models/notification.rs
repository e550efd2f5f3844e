// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User-facing notifications created by the pipeline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Days before a failure notification expires.
pub const FAILURE_NOTIFICATION_EXPIRY_DAYS: i64 = 14;

/// Notification shown to the athlete on their next visit.
///
/// Stored at: `notifications/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: u64,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<u64>,
    #[serde(with = "crate::time_utils::rfc3339")]
    pub date_created: DateTime<Utc>,
    #[serde(with = "crate::time_utils::rfc3339")]
    pub date_expiry: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    /// Notification for an activity whose updates Strava refused.
    ///
    /// `local_end` is the activity end time already shifted to the athlete's
    /// timezone.
    pub fn activity_failed(
        user_id: u64,
        activity_id: u64,
        sport_type: &str,
        name: &str,
        local_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let body = format!(
            "There was an error processing your {} \"{}\", on {}. Strava returned an error message.",
            sport_type,
            name,
            local_end.format("%b %-d, %Y %-I:%M %p")
        );
        Self {
            id: format!("{}-{}-{}", user_id, activity_id, now.timestamp()),
            user_id,
            title: format!("Failed to process activity {}", activity_id),
            body,
            activity_id: Some(activity_id),
            date_created: now,
            date_expiry: now + Duration::days(FAILURE_NOTIFICATION_EXPIRY_DAYS),
            read: false,
        }
    }
}
