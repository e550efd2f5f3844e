// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FTP estimation from recent cycling activities.
//!
//! The estimate is the best duration-normalized power of the analyzed
//! rides, pulled towards the athlete's current FTP when that is higher and
//! reduced for every full week without activities.

use crate::config::FtpConfig;
use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{
    FtpBestActivity, FtpEstimate, PowerIntervals, StravaActivity, User, UserUpdate,
};
use crate::services::notifications::{Events, PipelineEvent};
use crate::services::strava::ActivityProvider;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Activities shorter than this (seconds) are ignored.
const MIN_ACTIVITY_SECS: u32 = 5 * 60;
const TWENTY_MINUTES: u32 = 20 * 60;
const ONE_HOUR: u32 = 60 * 60;

/// Weight of the current FTP when it is higher than the best effort.
const CURRENT_FTP_WEIGHT: f64 = 1.35;

/// Discount applied to the best 5/20/60 minute powers.
const FIVE_MIN_FACTOR: f64 = 0.79;
const TWENTY_MIN_FACTOR: f64 = 0.94;

/// Minimum samples in a power stream.
const MIN_STREAM_SAMPLES: usize = 60;
/// Minimum samples per second of moving time.
const MIN_STREAM_DENSITY: f64 = 0.8;

/// Smallest change (percent of the old/new midpoint) worth saving.
const MIN_SAVE_CHANGE_PERCENT: f64 = 2.0;
/// Automatic updates need the estimate to differ by more than this fraction.
const AUTO_UPDATE_THRESHOLD: f64 = 0.01;

pub struct FtpEstimator {
    provider: Arc<dyn ActivityProvider>,
    users: Arc<dyn UserStore>,
    events: Events,
    config: FtpConfig,
}

impl FtpEstimator {
    pub fn new(
        provider: Arc<dyn ActivityProvider>,
        users: Arc<dyn UserStore>,
        events: Events,
        config: FtpConfig,
    ) -> Self {
        Self {
            provider,
            users,
            events,
            config,
        }
    }

    /// Estimate the user's FTP from `activities`, or from the last
    /// `weeks` of Strava history when none are given.
    ///
    /// Returns `Ok(None)` when no activity qualifies. The user's profile FTP
    /// is refreshed from Strava when possible.
    pub async fn estimate(
        &self,
        user: &mut User,
        activities: Option<Vec<StravaActivity>>,
    ) -> Result<Option<FtpEstimate>, AppError> {
        let activities = match activities {
            Some(list) if !list.is_empty() => list,
            _ => {
                let now = Utc::now();
                let after = now - Duration::weeks(self.config.weeks);
                self.provider.list_activities(user, after, now).await?
            }
        };

        let mut candidates: Vec<f64> = Vec::new();
        let mut best_watts = 0.0_f64;
        let mut best_activity: Option<&StravaActivity> = None;
        let mut last_activity_end: Option<DateTime<Utc>> = None;

        for activity in &activities {
            let end = activity.date_end();
            if last_activity_end.is_none_or(|last| end > last) {
                last_activity_end = Some(end);
            }

            let total_time = activity.total_time();
            if !activity.is_cycling() || !activity.has_power || total_time < MIN_ACTIVITY_SECS {
                continue;
            }

            let mut power = normalized_power(total_time, activity.best_watts());

            if user.is_pro {
                if let Some(intervals) = self.power_intervals(user, activity).await {
                    let discounted = [
                        (f64::from(intervals.best_5min.unwrap_or(0)) * FIVE_MIN_FACTOR).round(),
                        (f64::from(intervals.best_20min.unwrap_or(0)) * TWENTY_MIN_FACTOR)
                            .round(),
                        f64::from(intervals.best_60min.unwrap_or(0)),
                    ];
                    for value in discounted {
                        if value > best_watts {
                            power = Some(value);
                        }
                    }
                }
            }

            let Some(power) = power else {
                continue;
            };
            if power > best_watts {
                best_watts = power;
                best_activity = Some(activity);
            }
            candidates.push(power);
        }

        if candidates.is_empty() {
            tracing::info!(
                athlete_id = user.id,
                activities = activities.len(),
                "No activities with power data, FTP not estimated"
            );
            return Ok(None);
        }

        match self.provider.get_athlete(user).await {
            Ok(athlete) => user.profile.ftp = athlete.ftp,
            Err(e) => tracing::warn!(
                athlete_id = user.id,
                error = %e,
                "Could not refresh athlete data, using stored FTP"
            ),
        }

        let now = Utc::now();
        let avg_watts = (candidates.iter().sum::<f64>() / candidates.len() as f64).round();
        let best_watts = best_watts.round();
        let current_watts = user.profile.ftp.unwrap_or(0);

        let mut ftp = blend_with_current(best_watts, f64::from(current_watts));
        let weeks_idle = last_activity_end
            .map(|end| (now - end).num_days() / 7)
            .unwrap_or(0);
        ftp = apply_idle_decay(ftp, weeks_idle, self.config.idle_loss_per_week);
        let ftp_watts = ftp.round().max(0.0) as u32;

        let recently_updated = self.recently_updated(user, now);

        tracing::info!(
            athlete_id = user.id,
            activities = activities.len(),
            ftp_watts,
            current_watts,
            best_watts,
            best_activity_id = best_activity.map(|a| a.id),
            weeks_idle,
            "Estimated FTP"
        );

        Ok(Some(FtpEstimate {
            ftp_watts,
            ftp_current_watts: current_watts,
            best_watts: best_watts as u32,
            best_activity: best_activity.map(|a| FtpBestActivity {
                id: a.id,
                name: a.name.clone(),
                sport_type: a.sport_type.clone(),
            }),
            activity_count: candidates.len(),
            activity_watts_avg: avg_watts as u32,
            recently_updated,
        }))
    }

    /// Save a new FTP on Strava.
    ///
    /// Unless `force` is set, updates inside the cooldown window or that
    /// change the FTP by less than 2% are skipped (`Ok(false)`).
    pub async fn save(&self, user: &mut User, ftp: i64, force: bool) -> Result<bool, AppError> {
        if ftp <= 0 {
            return Err(AppError::Validation(format!(
                "Invalid FTP {}, must be higher than 0",
                ftp
            )));
        }
        let ftp = u32::try_from(ftp)
            .map_err(|_| AppError::Validation(format!("Invalid FTP {}", ftp)))?;
        let now = Utc::now();

        if !force {
            if self.recently_updated(user, now) {
                tracing::warn!(
                    athlete_id = user.id,
                    ftp,
                    "FTP was already updated recently, not saving"
                );
                return Ok(false);
            }

            let current = user.profile.ftp.unwrap_or(0);
            let percent = change_percent(ftp, current);
            if percent < MIN_SAVE_CHANGE_PERCENT {
                tracing::info!(
                    athlete_id = user.id,
                    ftp,
                    current,
                    percent,
                    "FTP change too small, not saving"
                );
                return Ok(false);
            }
        }

        self.provider.update_athlete_ftp(user, ftp).await?;
        self.users
            .update_user(
                user.id,
                &UserUpdate {
                    date_last_ftp_update: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        user.profile.ftp = Some(ftp);
        user.date_last_ftp_update = Some(now);
        self.events.emit(PipelineEvent::FtpUpdated {
            athlete_id: user.id,
            ftp,
        });
        tracing::info!(athlete_id = user.id, ftp, force, "FTP saved");
        Ok(true)
    }

    /// Estimate and save the FTP when it moved by more than 1%.
    ///
    /// Failures are logged and never returned.
    pub async fn process(&self, user: &mut User) {
        let estimate = match self.estimate(user, None).await {
            Ok(Some(estimate)) => estimate,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(athlete_id = user.id, error = %e, "FTP estimation failed");
                return;
            }
        };

        let current = f64::from(estimate.ftp_current_watts);
        let delta = (f64::from(estimate.ftp_watts) - current).abs();
        if estimate.recently_updated || delta <= current * AUTO_UPDATE_THRESHOLD {
            tracing::debug!(
                athlete_id = user.id,
                ftp = estimate.ftp_watts,
                current = estimate.ftp_current_watts,
                "FTP unchanged"
            );
            return;
        }

        if let Err(e) = self.save(user, i64::from(estimate.ftp_watts), false).await {
            tracing::error!(athlete_id = user.id, error = %e, "Failed to save estimated FTP");
        }
    }

    /// Best 5/20/60 minute powers from the activity's watts stream.
    ///
    /// `None` when the stream is missing, too short or too sparse.
    pub async fn power_intervals(
        &self,
        user: &User,
        activity: &StravaActivity,
    ) -> Option<PowerIntervals> {
        if activity.moving_time < MIN_STREAM_SAMPLES as u32 {
            return None;
        }

        let stream = match self.provider.get_power_stream(user, activity.id).await {
            Ok(Some(stream)) => stream,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    athlete_id = user.id,
                    activity_id = activity.id,
                    error = %e,
                    "Could not fetch power stream"
                );
                return None;
            }
        };

        if stream.is_low_resolution()
            || !stream_is_dense_enough(stream.data.len(), activity.moving_time)
        {
            tracing::info!(
                athlete_id = user.id,
                activity_id = activity.id,
                samples = stream.data.len(),
                resolution = ?stream.resolution,
                "Power stream not good enough for intervals"
            );
            return None;
        }

        let intervals = best_interval_averages(&stream.data);
        tracing::debug!(
            athlete_id = user.id,
            activity_id = activity.id,
            ?intervals,
            "Power intervals"
        );
        Some(intervals)
    }

    fn recently_updated(&self, user: &User, now: DateTime<Utc>) -> bool {
        let cutoff = now - Duration::hours(self.config.since_last_hours);
        user.date_last_ftp_update.is_some_and(|last| last >= cutoff)
    }
}

/// Duration-normalized power for a ride of `total_time` seconds.
///
/// Rides between 20 and 60 minutes are scaled down by 1.1% per 8 minutes
/// short of an hour; longer rides gain 3% per extra hour. Shorter rides
/// have no normalized power.
pub fn normalized_power(total_time: u32, watts: f64) -> Option<f64> {
    if total_time < TWENTY_MINUTES {
        return None;
    }

    if total_time <= ONE_HOUR {
        let percent = (f64::from(ONE_HOUR - total_time) / 480.0) * 0.011;
        return Some((watts * (1.0 - percent)).round());
    }

    let extra_hours = (total_time / ONE_HOUR - 1) as i32;
    let fraction = 1.0 + 0.03 * (f64::from(total_time % ONE_HOUR) / f64::from(ONE_HOUR));
    Some(watts * 1.03_f64.powi(extra_hours) * fraction)
}

/// Weighted average of the best effort and a higher current FTP.
pub fn blend_with_current(best: f64, current: f64) -> f64 {
    if current > best {
        (best + current * CURRENT_FTP_WEIGHT) / (1.0 + CURRENT_FTP_WEIGHT)
    } else {
        best
    }
}

pub fn apply_idle_decay(ftp: f64, weeks_idle: i64, loss_per_week: f64) -> f64 {
    if weeks_idle <= 0 {
        return ftp;
    }
    ftp - ftp * (weeks_idle as f64 * loss_per_week)
}

/// Percent change between two FTP values relative to their midpoint.
pub fn change_percent(new: u32, old: u32) -> f64 {
    let new = f64::from(new);
    let old = f64::from(old);
    100.0 * ((new - old) / ((new + old) / 2.0)).abs()
}

pub fn stream_is_dense_enough(samples: usize, moving_time: u32) -> bool {
    samples >= MIN_STREAM_SAMPLES && samples as f64 >= f64::from(moving_time) * MIN_STREAM_DENSITY
}

/// Best average over every contiguous 5, 20 and 60 minute window.
///
/// Uses prefix sums so the whole stream is scanned once per window size.
pub fn best_interval_averages(watts: &[f64]) -> PowerIntervals {
    let mut prefix = Vec::with_capacity(watts.len() + 1);
    prefix.push(0.0);
    let mut total = 0.0;
    for w in watts {
        total += w;
        prefix.push(total);
    }

    let best = |window: usize| -> Option<u32> {
        if watts.len() < window {
            return None;
        }
        let best_sum = (window..=watts.len())
            .map(|end| prefix[end] - prefix[end - window])
            .fold(0.0_f64, f64::max);
        Some((best_sum / window as f64).round() as u32)
    };

    PowerIntervals {
        best_5min: best(300),
        best_20min: best(1200),
        best_60min: best(3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twenty_minute_ride() {
        // 200 * (1 - (2400 / 480) * 0.011) = 189
        assert_eq!(normalized_power(1200, 200.0), Some(189.0));
    }

    #[test]
    fn test_one_hour_ride_unchanged() {
        assert_eq!(normalized_power(3600, 250.0), Some(250.0));
    }

    #[test]
    fn test_long_ride_gains() {
        // 2.5 hours: 1.03^1 * (1 + 0.03 * 0.5)
        let power = normalized_power(9000, 200.0).unwrap();
        assert!((power - 200.0 * 1.03 * 1.015).abs() < 1e-9);
    }

    #[test]
    fn test_short_ride_has_no_power() {
        assert_eq!(normalized_power(1199, 300.0), None);
        assert_eq!(normalized_power(600, 300.0), None);
    }

    #[test]
    fn test_blend_pulls_towards_higher_current() {
        let blended = blend_with_current(200.0, 250.0);
        assert!((blended - (200.0 + 250.0 * 1.35) / 2.35).abs() < 1e-9);
        assert_eq!(blend_with_current(260.0, 250.0), 260.0);
    }

    #[test]
    fn test_idle_decay() {
        assert_eq!(apply_idle_decay(200.0, 0, 0.005), 200.0);
        assert!((apply_idle_decay(200.0, 4, 0.005) - 196.0).abs() < 1e-9);
    }

    #[test]
    fn test_change_percent() {
        assert!((change_percent(204, 200) - 1.98).abs() < 0.01);
        assert!(change_percent(210, 200) > 2.0);
        assert_eq!(change_percent(250, 0), 200.0);
    }

    #[test]
    fn test_stream_density() {
        assert!(!stream_is_dense_enough(59, 60));
        assert!(!stream_is_dense_enough(700, 1000));
        assert!(stream_is_dense_enough(800, 1000));
    }

    #[test]
    fn test_interval_averages_find_best_window() {
        let mut watts = vec![100.0; 4000];
        for w in &mut watts[1000..1300] {
            *w = 400.0;
        }
        let intervals = best_interval_averages(&watts);
        assert_eq!(intervals.best_5min, Some(400));
        // 300s at 400 plus 900s at 100
        assert_eq!(intervals.best_20min, Some(175));
        assert_eq!(intervals.best_60min, Some(125));
    }

    #[test]
    fn test_interval_includes_last_window() {
        let mut watts = vec![0.0; 600];
        for w in &mut watts[300..] {
            *w = 300.0;
        }
        assert_eq!(best_interval_averages(&watts).best_5min, Some(300));
    }

    #[test]
    fn test_interval_skips_windows_longer_than_stream() {
        let intervals = best_interval_averages(&vec![200.0; 500]);
        assert_eq!(intervals.best_5min, Some(200));
        assert_eq!(intervals.best_20min, None);
        assert_eq!(intervals.best_60min, None);
    }
}
