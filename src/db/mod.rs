// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore).
//!
//! The pipeline talks to storage through the [`ActivityStore`] and
//! [`UserStore`] traits so the queue and processor can run against
//! Firestore in production and an in-memory store in tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{
    AthleteRecords, Notification, ProcessedActivity, ProcessedActivityDelete,
    ProcessedActivityQuery, User, UserUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Processed activities, also used as the processing queue
    pub const ACTIVITIES: &str = "activities";
    pub const NOTIFICATIONS: &str = "notifications";
    /// Personal records (keyed by athlete_id)
    pub const ATHLETE_RECORDS: &str = "athlete_records";
}

/// Storage for processed activity records and queue entries.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn get_processed(&self, activity_id: u64)
        -> Result<Option<ProcessedActivity>, AppError>;

    /// Create or fully replace the record for `record.id`.
    async fn set_processed(&self, record: &ProcessedActivity) -> Result<(), AppError>;

    /// Records matching `query`, newest `date_processed` first.
    async fn search_processed(
        &self,
        query: &ProcessedActivityQuery,
    ) -> Result<Vec<ProcessedActivity>, AppError>;

    /// Queue entries with `date_queued <= before`, oldest first.
    async fn queued_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ProcessedActivity>, AppError>;

    /// Queue entries created by batch processing.
    async fn queued_batch(&self, limit: usize) -> Result<Vec<ProcessedActivity>, AppError>;

    async fn increment_retry_count(&self, activity_id: u64) -> Result<(), AppError>;

    /// Returns `true` if a record was removed.
    async fn delete_processed(&self, activity_id: u64) -> Result<bool, AppError>;

    /// Delete every record matching `filter`, returning the count.
    async fn delete_processed_where(
        &self,
        filter: &ProcessedActivityDelete,
    ) -> Result<usize, AppError>;
}

/// User registry plus the per-user documents the pipeline maintains.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, athlete_id: u64) -> Result<Option<User>, AppError>;

    async fn update_user(&self, athlete_id: u64, update: &UserUpdate) -> Result<(), AppError>;

    async fn increment_activity_count(&self, athlete_id: u64) -> Result<(), AppError>;

    async fn get_records(&self, athlete_id: u64) -> Result<Option<AthleteRecords>, AppError>;

    async fn set_records(&self, athlete_id: u64, records: &AthleteRecords)
        -> Result<(), AppError>;

    async fn add_notification(&self, notification: &Notification) -> Result<(), AppError>;
}
