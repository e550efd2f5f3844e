// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Processed activity record: doubles as the queue entry while pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Stored activity record in Firestore (document ID = Strava activity ID).
///
/// While `date_processed` is unset the record is a pending queue entry;
/// once set it is the terminal outcome of a processing round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedActivity {
    /// Strava activity ID
    pub id: u64,
    /// Activity owner
    pub user: ProcessedActivityUser,

    /// When the activity was first queued
    #[serde(
        default,
        with = "crate::time_utils::rfc3339_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_queued: Option<DateTime<Utc>>,
    /// When processing completed
    #[serde(
        default,
        with = "crate::time_utils::rfc3339_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_processed: Option<DateTime<Utc>>,
    /// Number of enqueue / retry attempts
    #[serde(default)]
    pub retry_count: u32,
    /// Queued by batch processing of older activities
    #[serde(default)]
    pub batch: bool,

    /// Triggered recipes keyed by recipe ID
    #[serde(default)]
    pub recipes: HashMap<String, RecipeSummary>,
    /// Updated field name to the value that was applied
    #[serde(default)]
    pub updated_fields: BTreeMap<String, String>,
    /// Error returned by Strava when saving the activity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub linkback: bool,

    // Only stored when the user has not enabled privacy mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        with = "crate::time_utils::rfc3339_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_start: Option<DateTime<Utc>>,
    /// Offset from UTC in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_start_offset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_records: Option<Vec<String>>,
}

impl ProcessedActivity {
    /// Empty record for an activity that is about to be queued.
    pub fn pending(id: u64, user: ProcessedActivityUser) -> Self {
        Self {
            id,
            user,
            date_queued: None,
            date_processed: None,
            retry_count: 0,
            batch: false,
            recipes: HashMap::new(),
            updated_fields: BTreeMap::new(),
            error: None,
            linkback: false,
            sport_type: None,
            name: None,
            date_start: None,
            utc_start_offset: None,
            new_records: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.date_processed.is_none()
    }
}

/// Owner reference stored on each record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedActivityUser {
    pub id: u64,
    pub display_name: String,
}

/// Snapshot of a recipe at the time it fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub title: String,
    pub conditions: Vec<String>,
    pub actions: Vec<String>,
}

/// Read filter for processed activities.
#[derive(Debug, Clone, Default)]
pub struct ProcessedActivityQuery {
    pub user_id: Option<u64>,
    /// Processed on or after
    pub date_from: Option<DateTime<Utc>>,
    /// Processed on or before
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Delete filter for processed activities. At least one field must be set.
#[derive(Debug, Clone, Default)]
pub struct ProcessedActivityDelete {
    pub user_id: Option<u64>,
    /// Delete records processed strictly before this date
    pub processed_before: Option<DateTime<Utc>>,
}

impl ProcessedActivityDelete {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.processed_before.is_none()
    }

    pub fn matches(&self, record: &ProcessedActivity) -> bool {
        if self.user_id.is_some_and(|id| id != record.user.id) {
            return false;
        }
        match self.processed_before {
            Some(cutoff) => record.date_processed.is_some_and(|date| date < cutoff),
            None => true,
        }
    }
}
