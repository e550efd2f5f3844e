// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store used by tests and local runs without Firestore.

use crate::db::{ActivityStore, UserStore};
use crate::error::AppError;
use crate::models::{
    AthleteRecords, Notification, ProcessedActivity, ProcessedActivityDelete,
    ProcessedActivityQuery, User, UserUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryDb {
    users: DashMap<u64, User>,
    activities: DashMap<u64, ProcessedActivity>,
    records: DashMap<u64, AthleteRecords>,
    notifications: DashMap<String, Notification>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn processed_count(&self) -> usize {
        self.activities.len()
    }

    pub fn notifications_for(&self, user_id: u64) -> Vec<Notification> {
        self.notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.value().clone())
            .collect()
    }
}

fn missing(what: &str, id: u64) -> AppError {
    AppError::NotFound(format!("{} {}", what, id))
}

#[async_trait]
impl ActivityStore for MemoryDb {
    async fn get_processed(
        &self,
        activity_id: u64,
    ) -> Result<Option<ProcessedActivity>, AppError> {
        Ok(self.activities.get(&activity_id).map(|r| r.value().clone()))
    }

    async fn set_processed(&self, record: &ProcessedActivity) -> Result<(), AppError> {
        self.activities.insert(record.id, record.clone());
        Ok(())
    }

    async fn search_processed(
        &self,
        query: &ProcessedActivityQuery,
    ) -> Result<Vec<ProcessedActivity>, AppError> {
        let mut found: Vec<ProcessedActivity> = self
            .activities
            .iter()
            .filter(|r| query.user_id.is_none_or(|id| r.user.id == id))
            .filter_map(|r| {
                let processed = r.date_processed?;
                let in_range = query.date_from.is_none_or(|from| processed >= from)
                    && query.date_to.is_none_or(|to| processed <= to);
                in_range.then(|| r.value().clone())
            })
            .collect();

        found.sort_by(|a, b| b.date_processed.cmp(&a.date_processed));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn queued_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ProcessedActivity>, AppError> {
        let mut queued: Vec<ProcessedActivity> = self
            .activities
            .iter()
            .filter(|r| r.date_queued.is_some_and(|d| d <= before))
            .map(|r| r.value().clone())
            .collect();

        queued.sort_by_key(|r| r.date_queued);
        queued.truncate(limit);
        Ok(queued)
    }

    async fn queued_batch(&self, limit: usize) -> Result<Vec<ProcessedActivity>, AppError> {
        let mut queued: Vec<ProcessedActivity> = self
            .activities
            .iter()
            .filter(|r| r.batch)
            .map(|r| r.value().clone())
            .collect();

        queued.sort_by_key(|r| r.id);
        queued.truncate(limit);
        Ok(queued)
    }

    async fn increment_retry_count(&self, activity_id: u64) -> Result<(), AppError> {
        let mut record = self
            .activities
            .get_mut(&activity_id)
            .ok_or_else(|| missing("queued activity", activity_id))?;
        record.retry_count += 1;
        Ok(())
    }

    async fn delete_processed(&self, activity_id: u64) -> Result<bool, AppError> {
        Ok(self.activities.remove(&activity_id).is_some())
    }

    async fn delete_processed_where(
        &self,
        filter: &ProcessedActivityDelete,
    ) -> Result<usize, AppError> {
        if filter.is_empty() {
            return Err(AppError::Validation(
                "a user or a date cutoff is required to delete activities".to_string(),
            ));
        }

        let before = self.activities.len();
        self.activities.retain(|_, record| !filter.matches(record));
        Ok(before - self.activities.len())
    }
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn get_user(&self, athlete_id: u64) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&athlete_id).map(|u| u.value().clone()))
    }

    async fn update_user(&self, athlete_id: u64, update: &UserUpdate) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(&athlete_id)
            .ok_or_else(|| missing("user", athlete_id))?;
        update.apply_to(&mut user);
        Ok(())
    }

    async fn increment_activity_count(&self, athlete_id: u64) -> Result<(), AppError> {
        let mut user = self
            .users
            .get_mut(&athlete_id)
            .ok_or_else(|| missing("user", athlete_id))?;
        user.activity_count += 1;
        Ok(())
    }

    async fn get_records(&self, athlete_id: u64) -> Result<Option<AthleteRecords>, AppError> {
        Ok(self.records.get(&athlete_id).map(|r| r.value().clone()))
    }

    async fn set_records(
        &self,
        athlete_id: u64,
        records: &AthleteRecords,
    ) -> Result<(), AppError> {
        self.records.insert(athlete_id, records.clone());
        Ok(())
    }

    async fn add_notification(&self, notification: &Notification) -> Result<(), AppError> {
        self.notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }
}
