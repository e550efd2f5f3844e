// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-athlete personal records.
//!
//! Updated whenever an activity is processed so new bests can be reported
//! on the processed record without rescanning history.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::StravaActivity;

/// Best value for one record category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub value: f64,
    pub activity_id: u64,
    /// Start date of the activity that set the record (ISO 8601)
    pub date: String,
}

/// Personal records for a user, grouped by sport type then category.
///
/// Stored at: `athlete_records/{athlete_id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AthleteRecords {
    #[serde(default)]
    pub by_sport: HashMap<String, HashMap<String, RecordEntry>>,
    /// Activity IDs already checked (for duplicate detection)
    #[serde(default)]
    pub checked_activity_ids: HashSet<u64>,
    /// Last update timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: String,
}

impl AthleteRecords {
    /// Compare an activity against the current bests.
    ///
    /// Returns the categories where the activity set a new record. An
    /// activity that was already checked returns nothing. The first activity
    /// of a sport seeds the records without reporting them as new.
    pub fn update_from_activity(&mut self, activity: &StravaActivity, now: &str) -> Vec<String> {
        if !self.checked_activity_ids.insert(activity.id) {
            return vec![];
        }
        self.updated_at = now.to_string();

        let seeding = !self.by_sport.contains_key(&activity.sport_type);
        let records = self.by_sport.entry(activity.sport_type.clone()).or_default();
        let date = crate::time_utils::format_utc_rfc3339(activity.start_date);

        let mut new_records = Vec::new();
        for (category, value) in record_values(activity) {
            if value <= 0.0 {
                continue;
            }
            let improved = records.get(category).is_none_or(|best| value > best.value);
            if improved {
                records.insert(
                    category.to_string(),
                    RecordEntry {
                        value,
                        activity_id: activity.id,
                        date: date.clone(),
                    },
                );
                if !seeding {
                    new_records.push(category.to_string());
                }
            }
        }

        new_records
    }
}

fn record_values(activity: &StravaActivity) -> [(&'static str, f64); 4] {
    [
        ("distance", activity.distance),
        ("moving_time", f64::from(activity.moving_time)),
        ("elevation_gain", activity.total_elevation_gain),
        (
            "weighted_watts",
            if activity.has_power {
                activity.weighted_average_watts.unwrap_or(0.0)
            } else {
                0.0
            },
        ),
    ]
}
