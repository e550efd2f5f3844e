// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava activity snapshot and the fields recipes are allowed to change.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Strava workout_type values that mark a race.
const RIDE_RACE_WORKOUT_TYPE: u32 = 11;
const RUN_RACE_WORKOUT_TYPE: u32 = 1;

/// Sport types that count as cycling for FTP purposes.
const CYCLING_SPORT_TYPES: [&str; 4] = ["Ride", "GravelRide", "MountainBikeRide", "VirtualRide"];

/// Detailed activity as returned by Strava.
///
/// Treated as an immutable snapshot except for the bookkeeping fields that
/// recipes fill in while being evaluated (`updated_fields`, `new_records`,
/// `linkback`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sport_type: String,
    #[serde(deserialize_with = "crate::time_utils::rfc3339::deserialize")]
    pub start_date: DateTime<Utc>,
    /// Offset from UTC in seconds.
    #[serde(default)]
    pub utc_offset: f64,
    /// Moving time in seconds
    #[serde(default)]
    pub moving_time: u32,
    /// Elapsed time in seconds
    #[serde(default)]
    pub elapsed_time: u32,
    /// Distance in meters
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub total_elevation_gain: f64,
    /// Whether watts come from a power meter
    #[serde(default, rename = "device_watts")]
    pub has_power: bool,
    #[serde(default)]
    pub average_watts: Option<f64>,
    #[serde(default)]
    pub weighted_average_watts: Option<f64>,
    #[serde(default)]
    pub commute: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub trainer: bool,
    #[serde(default)]
    pub hide_from_home: bool,
    #[serde(default)]
    pub workout_type: Option<u32>,
    #[serde(default)]
    pub gear: Option<StravaGear>,
    #[serde(default)]
    pub start_latlng: Vec<f64>,

    /// Fields changed by recipes, in the order they were changed.
    #[serde(skip)]
    pub updated_fields: Vec<ActivityField>,
    /// Personal records set by this activity.
    #[serde(skip)]
    pub new_records: Vec<String>,
    /// A recipe appended a link back to this service.
    #[serde(skip)]
    pub linkback: bool,
}

/// Gear attached to an activity. The id `none` clears the gear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StravaGear {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl StravaGear {
    pub const NONE_ID: &'static str = "none";

    pub fn none() -> Self {
        Self {
            id: Self::NONE_ID.to_string(),
            name: "None".to_string(),
        }
    }
}

impl StravaActivity {
    /// Moving time, or elapsed time when Strava did not report moving time.
    pub fn total_time(&self) -> u32 {
        if self.moving_time > 0 {
            self.moving_time
        } else {
            self.elapsed_time
        }
    }

    pub fn date_end(&self) -> DateTime<Utc> {
        self.start_date + Duration::seconds(i64::from(self.elapsed_time))
    }

    /// Offset from UTC in whole minutes.
    pub fn utc_start_offset_minutes(&self) -> i32 {
        (self.utc_offset / 60.0).round() as i32
    }

    pub fn is_cycling(&self) -> bool {
        CYCLING_SPORT_TYPES.contains(&self.sport_type.as_str())
    }

    pub fn is_race(&self) -> bool {
        matches!(
            self.workout_type,
            Some(RIDE_RACE_WORKOUT_TYPE) | Some(RUN_RACE_WORKOUT_TYPE)
        )
    }

    /// Higher of weighted and average power.
    pub fn best_watts(&self) -> f64 {
        let weighted = self.weighted_average_watts.unwrap_or(0.0);
        let average = self.average_watts.unwrap_or(0.0);
        weighted.max(average)
    }

    /// Record that a recipe changed `field`.
    pub fn mark_updated(&mut self, field: ActivityField) {
        self.updated_fields.push(field);
    }

    /// Drop repeated entries from `updated_fields`, keeping first occurrence order.
    pub fn dedup_updated_fields(&mut self) {
        let mut seen = Vec::with_capacity(self.updated_fields.len());
        self.updated_fields.retain(|field| {
            if seen.contains(field) {
                false
            } else {
                seen.push(*field);
                true
            }
        });
    }

    /// Human readable value of an updated field, as stored on the processed record.
    pub fn field_value(&self, field: ActivityField) -> String {
        match field {
            ActivityField::Name => self.name.clone(),
            ActivityField::Description => self.description.clone().unwrap_or_default(),
            ActivityField::SportType => self.sport_type.clone(),
            ActivityField::Commute => self.commute.to_string(),
            ActivityField::Trainer => self.trainer.to_string(),
            ActivityField::HideHome => self.hide_from_home.to_string(),
            ActivityField::Gear => match &self.gear {
                Some(gear) if gear.id != StravaGear::NONE_ID => {
                    format!("{} ({})", gear.name, gear.id)
                }
                _ => "None".to_string(),
            },
        }
    }

    /// JSON body for Strava's update endpoint, limited to the updated fields.
    pub fn update_payload(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut body = serde_json::Map::new();
        for field in &self.updated_fields {
            let (key, value) = match field {
                ActivityField::Name => ("name", serde_json::json!(self.name)),
                ActivityField::Description => (
                    "description",
                    serde_json::json!(self.description.clone().unwrap_or_default()),
                ),
                ActivityField::SportType => ("sport_type", serde_json::json!(self.sport_type)),
                ActivityField::Commute => ("commute", serde_json::json!(self.commute)),
                ActivityField::Trainer => ("trainer", serde_json::json!(self.trainer)),
                ActivityField::HideHome => {
                    ("hide_from_home", serde_json::json!(self.hide_from_home))
                }
                ActivityField::Gear => (
                    "gear_id",
                    serde_json::json!(self
                        .gear
                        .as_ref()
                        .map(|g| g.id.clone())
                        .unwrap_or_else(|| StravaGear::NONE_ID.to_string())),
                ),
            };
            body.insert(key.to_string(), value);
        }
        body
    }
}

/// Activity fields that recipes can change and Strava accepts on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityField {
    Name,
    Description,
    SportType,
    Commute,
    Trainer,
    HideHome,
    Gear,
}

impl ActivityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityField::Name => "name",
            ActivityField::Description => "description",
            ActivityField::SportType => "sport_type",
            ActivityField::Commute => "commute",
            ActivityField::Trainer => "trainer",
            ActivityField::HideHome => "hide_home",
            ActivityField::Gear => "gear",
        }
    }
}

/// Optional filters for batch processing. `None` means "don't care".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityFilter {
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub commute: Option<bool>,
    #[serde(default)]
    pub race: Option<bool>,
    #[serde(default)]
    pub sport_type: Option<String>,
}

impl ActivityFilter {
    pub fn matches(&self, activity: &StravaActivity) -> bool {
        if self.private.is_some_and(|want| want != activity.private) {
            return false;
        }
        if self.commute.is_some_and(|want| want != activity.commute) {
            return false;
        }
        if self.race.is_some_and(|want| want != activity.is_race()) {
            return false;
        }
        match &self.sport_type {
            Some(sport) => &activity.sport_type == sport,
            None => true,
        }
    }
}
