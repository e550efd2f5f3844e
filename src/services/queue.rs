// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Delayed processing queue.
//!
//! Pending activities are stored as processed-activity records without a
//! processing date. Draining hands them to the [`ActivityProcessor`] one at
//! a time. A processed record replaces the queue entry; if it couldn't be
//! saved the entry is removed anyway. Failures are retried a bounded number
//! of times and then dropped.

use crate::config::QueueConfig;
use crate::db::{ActivityStore, UserStore};
use crate::error::Result;
use crate::models::{ProcessedActivity, ProcessedActivityUser, User};
use crate::services::processor::ActivityProcessor;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Outcome of one drain.
///
/// Per-item failures are counted here instead of failing the whole drain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainResult {
    /// Activities that produced a processed record.
    pub processed: u32,
    /// Activities with nothing to do (removed from the queue).
    pub skipped: u32,
    /// Failed activities left in the queue for another attempt.
    pub retrying: u32,
    /// Failed activities removed after exhausting their retries.
    pub dropped_ids: Vec<u64>,
}

impl DrainResult {
    pub fn total(&self) -> u32 {
        self.processed + self.skipped + self.retrying + self.dropped_ids.len() as u32
    }
}

pub struct ActivityQueue {
    store: Arc<dyn ActivityStore>,
    users: Arc<dyn UserStore>,
    config: QueueConfig,
    /// Earliest enqueue time since the last drain. Only decides when to
    /// drain; the store decides what.
    oldest_queue_date: Mutex<Option<DateTime<Utc>>>,
}

impl ActivityQueue {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        users: Arc<dyn UserStore>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            users,
            config,
            oldest_queue_date: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn oldest_queue_date(&self) -> Option<DateTime<Utc>> {
        *self.watermark()
    }

    fn watermark(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.oldest_queue_date
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an activity for delayed processing.
    ///
    /// Re-queueing an activity keeps its original queue date and bumps the
    /// retry counter.
    pub async fn enqueue(&self, user: &User, activity_id: u64, batch: bool) -> Result<()> {
        if user.suspended {
            tracing::info!(
                athlete_id = user.id,
                activity_id,
                "User suspended, activity not queued"
            );
            return Ok(());
        }

        let now = Utc::now();
        let existing = self
            .store
            .get_processed(activity_id)
            .await?
            .filter(ProcessedActivity::is_pending);
        let is_new = existing.is_none();

        // A processed record is replaced by a fresh queue entry.
        let record = match existing {
            Some(mut existing) => {
                existing.retry_count += 1;
                existing.batch |= batch;
                if existing.date_queued.is_none() {
                    existing.date_queued = Some(now);
                }
                tracing::info!(
                    athlete_id = user.id,
                    activity_id,
                    retry_count = existing.retry_count,
                    "Activity already queued"
                );
                existing
            }
            None => {
                let mut record = ProcessedActivity::pending(
                    activity_id,
                    ProcessedActivityUser {
                        id: user.id,
                        display_name: user.display_name.clone(),
                    },
                );
                record.date_queued = Some(now);
                record.retry_count = 1;
                record.batch = batch;
                tracing::info!(athlete_id = user.id, activity_id, batch, "Activity queued");
                record
            }
        };

        self.store.set_processed(&record).await?;

        if is_new {
            let mut watermark = self.watermark();
            if watermark.is_none() {
                *watermark = Some(now);
            }
        }
        Ok(())
    }

    /// Drain the queue if the oldest pending activity is past the delay interval.
    pub async fn check_queued(&self, processor: &ActivityProcessor) -> Result<Option<DrainResult>> {
        let cutoff = Utc::now() - Duration::seconds(self.config.delay_interval_secs);
        let due = self.oldest_queue_date().is_some_and(|oldest| oldest < cutoff);

        if !due {
            return Ok(None);
        }
        self.drain(processor, None).await.map(Some)
    }

    /// Process up to `batch_size` queued activities.
    pub async fn drain(
        &self,
        processor: &ActivityProcessor,
        batch_size: Option<usize>,
    ) -> Result<DrainResult> {
        *self.watermark() = None;

        let limit = batch_size.unwrap_or(self.config.batch_size);
        let before = Utc::now() - Duration::seconds(self.config.delay_interval_secs);

        let mut queued = self.store.queued_before(before, limit).await?;
        if queued.is_empty() {
            queued = self.store.queued_batch(limit).await?;
        }

        let mut result = DrainResult::default();
        if queued.is_empty() {
            tracing::debug!("Queue is empty");
            return Ok(result);
        }

        tracing::info!(count = queued.len(), "Draining queued activities");

        let mut users: HashMap<u64, Option<User>> = HashMap::new();

        for entry in queued {
            let athlete_id = entry.user.id;
            let activity_id = entry.id;

            if !users.contains_key(&athlete_id) {
                let user = match self.users.get_user(athlete_id).await {
                    Ok(user) => user,
                    Err(e) => {
                        tracing::error!(athlete_id, activity_id, error = %e, "Failed to load user");
                        self.handle_failure(&entry, &mut result).await;
                        continue;
                    }
                };
                users.insert(athlete_id, user);
            }

            let Some(Some(user)) = users.get_mut(&athlete_id) else {
                tracing::warn!(athlete_id, activity_id, "User not found, removing queued activity");
                self.remove(activity_id).await;
                result.skipped += 1;
                continue;
            };

            match processor.process(user, activity_id, true).await {
                Ok(Some(_)) => {
                    result.processed += 1;
                    self.retire(activity_id).await;
                }
                Ok(None) => {
                    self.remove(activity_id).await;
                    result.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(athlete_id, activity_id, error = %e, "Queued activity failed");
                    self.handle_failure(&entry, &mut result).await;
                }
            }
        }

        tracing::info!(
            processed = result.processed,
            skipped = result.skipped,
            retrying = result.retrying,
            dropped = result.dropped_ids.len(),
            "Queue drained"
        );
        Ok(result)
    }

    async fn handle_failure(&self, entry: &ProcessedActivity, result: &mut DrainResult) {
        if entry.retry_count >= self.config.max_retries {
            tracing::error!(
                athlete_id = entry.user.id,
                activity_id = entry.id,
                retry_count = entry.retry_count,
                "Dropping activity after too many retries"
            );
            self.remove(entry.id).await;
            result.dropped_ids.push(entry.id);
            return;
        }

        if let Err(e) = self.store.increment_retry_count(entry.id).await {
            tracing::error!(activity_id = entry.id, error = %e, "Failed to update retry count");
        }
        result.retrying += 1;
    }

    /// Remove the queue entry of a processed activity if the outcome record
    /// didn't replace it, so a failed save never re-runs the activity.
    async fn retire(&self, activity_id: u64) {
        match self.store.get_processed(activity_id).await {
            Ok(Some(entry)) if entry.is_pending() => {
                tracing::warn!(
                    athlete_id = entry.user.id,
                    activity_id,
                    "Processed activity still queued, removing entry"
                );
                self.remove(activity_id).await;
            }
            Ok(_) => {}
            Err(e) => tracing::error!(activity_id, error = %e, "Failed to check queued activity"),
        }
    }

    async fn remove(&self, activity_id: u64) {
        if let Err(e) = self.store.delete_processed(activity_id).await {
            tracing::error!(activity_id, error = %e, "Failed to remove queued activity");
        }
    }
}
