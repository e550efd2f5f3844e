// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FTP estimation results and power stream data.

use serde::{Deserialize, Serialize};

/// Result of an FTP estimation run. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FtpEstimate {
    /// Estimated FTP in watts
    pub ftp_watts: u32,
    /// FTP currently set on the athlete profile (0 when unset)
    pub ftp_current_watts: u32,
    /// Best normalized power found in the analyzed activities
    pub best_watts: u32,
    /// Activity that produced `best_watts`
    pub best_activity: Option<FtpBestActivity>,
    /// Activities with power data that were analyzed
    pub activity_count: usize,
    /// Mean of the raw power of the analyzed activities
    pub activity_watts_avg: u32,
    /// FTP was updated inside the cooldown window
    pub recently_updated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FtpBestActivity {
    pub id: u64,
    pub name: String,
    pub sport_type: String,
}

/// Best rolling average power over fixed windows, in watts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PowerIntervals {
    pub best_5min: Option<u32>,
    pub best_20min: Option<u32>,
    pub best_60min: Option<u32>,
}

/// Watts stream for an activity, one sample per second at high resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PowerStream {
    #[serde(default)]
    pub data: Vec<f64>,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl PowerStream {
    pub fn is_low_resolution(&self) -> bool {
        self.resolution.as_deref() == Some("low")
    }
}
