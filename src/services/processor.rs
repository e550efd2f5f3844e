// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity processing service.
//!
//! Handles the core workflow:
//! 1. Fetch activity from Strava
//! 2. Update personal records
//! 3. Evaluate the user's recipes in order
//! 4. Push the changed fields back to Strava
//! 5. Store the processed record in Firestore
//! 6. Re-estimate FTP after hard recent rides

use crate::config::PlanLimits;
use crate::db::{ActivityStore, UserStore};
use crate::error::{AppError, Result};
use crate::models::recipe::ordered_recipes;
use crate::models::{
    ActivityFilter, Notification, ProcessedActivity, ProcessedActivityDelete,
    ProcessedActivityQuery, ProcessedActivityUser, RecipeSummary, StravaActivity, User,
    UserUpdate,
};
use crate::services::ftp::FtpEstimator;
use crate::services::notifications::{Events, Notifier, PipelineEvent};
use crate::services::queue::ActivityQueue;
use crate::services::recipes::RuleEngine;
use crate::services::strava::ActivityProvider;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Activities older than this (days) never trigger an FTP update.
const FTP_RECENT_DAYS: i64 = 2;

/// Collaborators the processor calls into.
pub struct ProcessorDeps {
    pub provider: Arc<dyn ActivityProvider>,
    pub rules: Arc<dyn RuleEngine>,
    pub store: Arc<dyn ActivityStore>,
    pub users: Arc<dyn UserStore>,
    pub notifier: Arc<dyn Notifier>,
    pub events: Events,
}

pub struct ActivityProcessor {
    provider: Arc<dyn ActivityProvider>,
    rules: Arc<dyn RuleEngine>,
    store: Arc<dyn ActivityStore>,
    users: Arc<dyn UserStore>,
    notifier: Arc<dyn Notifier>,
    events: Events,
    queue: Arc<ActivityQueue>,
    ftp: Arc<FtpEstimator>,
    plans: PlanLimits,
}

impl ActivityProcessor {
    pub fn new(
        deps: ProcessorDeps,
        queue: Arc<ActivityQueue>,
        ftp: Arc<FtpEstimator>,
        plans: PlanLimits,
    ) -> Self {
        Self {
            provider: deps.provider,
            rules: deps.rules,
            store: deps.store,
            users: deps.users,
            notifier: deps.notifier,
            events: deps.events,
            queue,
            ftp,
            plans,
        }
    }

    /// Process an activity by ID.
    ///
    /// Returns the stored record when at least one recipe fired, `None` when
    /// there was nothing to do. Transient Strava errors are returned; when
    /// not called from the queue the activity is queued for a retry first.
    pub async fn process(
        &self,
        user: &mut User,
        activity_id: u64,
        queued: bool,
    ) -> Result<Option<ProcessedActivity>> {
        let athlete_id = user.id;

        if !user.has_recipes() {
            tracing::info!(athlete_id, activity_id, "User has no recipes, skipping activity");
            return Ok(None);
        }
        if user.suspended {
            tracing::warn!(athlete_id, activity_id, "User suspended, skipping activity");
            return Ok(None);
        }

        let mut activity = match self.provider.get_activity(user, activity_id).await {
            Ok(activity) => activity,
            Err(e) if e.is_not_found() => {
                tracing::warn!(athlete_id, activity_id, "Activity not found on Strava");
                return Ok(None);
            }
            Err(e) => {
                if !queued {
                    if let Err(queue_err) = self.queue.enqueue(user, activity_id, false).await {
                        tracing::error!(
                            athlete_id,
                            activity_id,
                            error = %queue_err,
                            "Failed to queue activity for retry"
                        );
                    }
                }
                return Err(e);
            }
        };

        self.track_records(user, &mut activity).await;

        let fired = self.evaluate_recipes(user, &mut activity).await;

        let result = if fired.is_empty() {
            tracing::info!(athlete_id, activity_id, "No matching recipes");
            None
        } else {
            tracing::info!(
                athlete_id,
                activity_id,
                source = if queued { "queue" } else { "realtime" },
                recipes = ?fired.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
                "Recipes matched"
            );

            activity.dedup_updated_fields();

            if user.write_suspended {
                tracing::warn!(
                    athlete_id,
                    activity_id,
                    "User write suspended, activity not updated"
                );
                return Ok(None);
            }

            let save_error = self.push_updates(user, &activity).await;

            match self.users.increment_activity_count(athlete_id).await {
                Ok(()) => user.activity_count += 1,
                Err(e) => tracing::error!(
                    athlete_id,
                    activity_id,
                    error = %e,
                    "Failed to update activity count"
                ),
            }

            let record = build_processed_record(user, &activity, fired, save_error, Utc::now());
            if let Err(e) = self.save_processed_activity(&record).await {
                tracing::error!(
                    athlete_id,
                    activity_id,
                    error = %e,
                    "Processed activity not saved to database"
                );
            }

            self.events.emit(PipelineEvent::ActivityProcessed {
                athlete_id,
                activity_id,
                recipes: record.recipes.len(),
                updated_fields: record.updated_fields.len(),
                error: record.error.clone(),
            });
            Some(record)
        };

        self.maybe_update_ftp(user, &activity).await;

        Ok(result)
    }

    /// Update the athlete's personal records and note new ones on the activity.
    async fn track_records(&self, user: &User, activity: &mut StravaActivity) {
        let mut records = match self.users.get_records(user.id).await {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(athlete_id = user.id, error = %e, "Failed to load athlete records");
                return;
            }
        };

        let now = crate::time_utils::format_utc_rfc3339(Utc::now());
        let new_records = records.update_from_activity(activity, &now);

        if let Err(e) = self.users.set_records(user.id, &records).await {
            tracing::warn!(athlete_id = user.id, error = %e, "Failed to save athlete records");
            return;
        }
        if !new_records.is_empty() {
            tracing::info!(
                athlete_id = user.id,
                activity_id = activity.id,
                records = ?new_records,
                "New personal records"
            );
        }
        activity.new_records = new_records;
    }

    /// Evaluate the user's recipes in order, returning the ones that fired.
    async fn evaluate_recipes(
        &self,
        user: &User,
        activity: &mut StravaActivity,
    ) -> Vec<(String, RecipeSummary)> {
        let mut fired = Vec::new();

        for recipe in ordered_recipes(&user.recipes, user.is_pro, self.plans.free_max_recipes) {
            match self.rules.evaluate(user, &recipe.id, activity).await {
                Ok(true) => {
                    fired.push((
                        recipe.id.clone(),
                        RecipeSummary {
                            title: recipe.title.clone(),
                            conditions: recipe
                                .conditions
                                .iter()
                                .map(|c| self.rules.condition_summary(c))
                                .collect(),
                            actions: recipe
                                .actions
                                .iter()
                                .map(|a| self.rules.action_summary(a))
                                .collect(),
                        },
                    ));

                    if recipe.kill_switch {
                        tracing::debug!(
                            athlete_id = user.id,
                            activity_id = activity.id,
                            recipe_id = %recipe.id,
                            "Recipe kill switch"
                        );
                        break;
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::error!(
                    athlete_id = user.id,
                    activity_id = activity.id,
                    recipe_id = %recipe.id,
                    error = %e,
                    "Recipe evaluation failed"
                ),
            }
        }

        fired
    }

    /// Push updated fields to Strava. Returns the user-facing error on failure.
    async fn push_updates(&self, user: &User, activity: &StravaActivity) -> Option<String> {
        let err = match self.provider.update_activity(user, activity).await {
            Ok(()) => return None,
            Err(e) => e,
        };

        tracing::error!(
            athlete_id = user.id,
            activity_id = activity.id,
            error = %err,
            "Failed to update activity on Strava"
        );

        let local_end =
            activity.date_end() + Duration::minutes(i64::from(activity.utc_start_offset_minutes()));
        let notification = Notification::activity_failed(
            user.id,
            activity.id,
            &activity.sport_type,
            &activity.name,
            local_end,
            Utc::now(),
        );
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::warn!(
                athlete_id = user.id,
                activity_id = activity.id,
                error = %e,
                "Failed to create failure notification"
            );
        }

        Some(err.friendly_message())
    }

    async fn maybe_update_ftp(&self, user: &mut User, activity: &StravaActivity) {
        let Some(current_ftp) = user.profile.ftp.filter(|ftp| *ftp > 0) else {
            return;
        };
        let hard_effort = activity.has_power
            && activity
                .weighted_average_watts
                .is_some_and(|watts| watts >= f64::from(current_ftp));
        let recent = activity.start_date > Utc::now() - Duration::days(FTP_RECENT_DAYS);

        if user.preferences.ftp_auto_update && hard_effort && recent {
            tracing::info!(
                athlete_id = user.id,
                activity_id = activity.id,
                "Hard recent effort, checking FTP"
            );
            self.ftp.process(user).await;
        }
    }

    /// Store the outcome of processing an activity.
    ///
    /// Replaces any queue entry for the same activity.
    pub async fn save_processed_activity(&self, record: &ProcessedActivity) -> Result<()> {
        self.store.set_processed(record).await?;
        tracing::debug!(
            athlete_id = record.user.id,
            activity_id = record.id,
            "Processed activity saved"
        );
        Ok(())
    }

    /// Processed activities, most recently processed first.
    pub async fn get_processed_activities(
        &self,
        query: &ProcessedActivityQuery,
    ) -> Result<Vec<ProcessedActivity>> {
        self.store.search_processed(query).await
    }

    /// Delete processed activities for a user, older than `age_days`, or both.
    pub async fn delete_processed_activities(
        &self,
        user: Option<&User>,
        age_days: Option<u32>,
    ) -> Result<usize> {
        let filter = ProcessedActivityDelete {
            user_id: user.map(|u| u.id),
            processed_before: age_days
                .filter(|days| *days > 0)
                .map(|days| Utc::now() - Duration::days(i64::from(days))),
        };
        if filter.is_empty() {
            return Err(AppError::Validation(
                "A user or a max age in days is required".to_string(),
            ));
        }

        let count = self.store.delete_processed_where(&filter).await?;
        tracing::info!(
            athlete_id = ?filter.user_id,
            age_days = ?age_days,
            count,
            "Deleted processed activities"
        );
        Ok(count)
    }

    /// Queue the user's activities in a date range for processing.
    ///
    /// Returns how many activities were queued.
    pub async fn batch_process(
        &self,
        user: &User,
        date_from: DateTime<Utc>,
        date_to: Option<DateTime<Utc>>,
        filter: &ActivityFilter,
    ) -> Result<usize> {
        if user.suspended || !user.has_recipes() {
            tracing::info!(
                athlete_id = user.id,
                "User suspended or without recipes, batch not processed"
            );
            return Ok(0);
        }

        let now = Utc::now();
        let min_date = start_of_day(now - Duration::days(self.plans.batch_days(user.is_pro)));
        if date_from < min_date {
            return Err(AppError::Validation(format!(
                "Invalid date range, minimum allowed date: {}",
                min_date.format("%Y-%m-%d")
            )));
        }
        let date_to = date_to.unwrap_or(now);

        let activities = self
            .provider
            .list_activities(user, date_from, date_to)
            .await?;

        let mut queued = 0;
        for activity in activities.iter().filter(|a| filter.matches(a)) {
            match self.queue.enqueue(user, activity.id, true).await {
                Ok(()) => queued += 1,
                Err(e) => tracing::error!(
                    athlete_id = user.id,
                    activity_id = activity.id,
                    error = %e,
                    "Failed to queue activity for batch"
                ),
            }
        }

        self.users
            .update_user(
                user.id,
                &UserUpdate {
                    date_last_batch_processing: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            athlete_id = user.id,
            found = activities.len(),
            queued,
            from = %date_from,
            to = %date_to,
            "Batch processing queued"
        );
        Ok(queued)
    }
}

fn start_of_day(date: DateTime<Utc>) -> DateTime<Utc> {
    date.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(date)
}

/// Build the stored record for an activity that had recipes applied.
pub fn build_processed_record(
    user: &User,
    activity: &StravaActivity,
    fired: Vec<(String, RecipeSummary)>,
    error: Option<String>,
    now: DateTime<Utc>,
) -> ProcessedActivity {
    let updated_fields: BTreeMap<String, String> = activity
        .updated_fields
        .iter()
        .map(|field| (field.as_str().to_string(), activity.field_value(*field)))
        .collect();
    let recipes: HashMap<String, RecipeSummary> = fired.into_iter().collect();

    let mut record = ProcessedActivity::pending(
        activity.id,
        ProcessedActivityUser {
            id: user.id,
            display_name: user.display_name.clone(),
        },
    );
    record.date_processed = Some(now);
    record.recipes = recipes;
    record.updated_fields = updated_fields;
    record.error = error;
    record.linkback = activity.linkback;

    if !user.preferences.privacy_mode {
        record.sport_type = Some(activity.sport_type.clone());
        record.name = Some(activity.name.clone());
        record.date_start = Some(activity.start_date);
        record.utc_start_offset = Some(activity.utc_start_offset_minutes());
        if !activity.new_records.is_empty() {
            record.new_records = Some(activity.new_records.clone());
        }
    }

    record
}
