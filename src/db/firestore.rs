// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile, recipes and preferences)
//! - Activities (processed records and pending queue entries)
//! - Athlete records (personal bests)
//! - Notifications

use crate::db::{collections, ActivityStore, UserStore};
use crate::error::AppError;
use crate::models::{
    AthleteRecords, Notification, ProcessedActivity, ProcessedActivityDelete,
    ProcessedActivityQuery, User, UserUpdate,
};
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Create or replace a user document.
    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user.id.to_string())
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Atomically add one to a numeric field of an existing document.
    ///
    /// Uses a server-side transform, so concurrent increments from the queue
    /// and realtime processing are never lost.
    async fn increment_field(
        &self,
        collection: &str,
        id: u64,
        field: &'static str,
    ) -> Result<(), AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collection)
            .precondition(firestore::FirestoreWritePrecondition::Exists(true))
            .document_id(id.to_string())
            .transforms(|t| t.fields([t.field(field).increment(1)]))
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add {} increment: {}", field, e))
            })?;

        match transaction.commit().await {
            Ok(_) => Ok(()),
            Err(firestore::errors::FirestoreError::DataNotFoundError(_)) => {
                Err(AppError::NotFound(format!("{} {}", collection, id)))
            }
            Err(e) => Err(AppError::Database(format!(
                "Failed to commit {} increment: {}",
                field, e
            ))),
        }
    }

    /// Delete processed activities by document ID in transactional chunks.
    async fn batch_delete(&self, ids: &[u64]) -> Result<(), AppError> {
        let client = self.get_client()?;

        for chunk in ids.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collections::ACTIVITIES)
                    .document_id(id.to_string())
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            id, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl ActivityStore for FirestoreDb {
    async fn get_processed(
        &self,
        activity_id: u64,
    ) -> Result<Option<ProcessedActivity>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(&activity_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_processed(&self, record: &ProcessedActivity) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ACTIVITIES)
            .document_id(record.id.to_string())
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn search_processed(
        &self,
        query: &ProcessedActivityQuery,
    ) -> Result<Vec<ProcessedActivity>, AppError> {
        let user_id = query.user_id;
        let date_from = query.date_from.map(format_utc_rfc3339);
        let date_to = query.date_to.map(format_utc_rfc3339);

        let select = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    user_id.and_then(|id| q.field("user.id").eq(id)),
                    date_from
                        .clone()
                        .and_then(|d| q.field("date_processed").greater_than_or_equal(d)),
                    date_to
                        .clone()
                        .and_then(|d| q.field("date_processed").less_than_or_equal(d)),
                ])
            })
            .order_by([(
                "date_processed",
                firestore::FirestoreQueryDirection::Descending,
            )]);

        let select = match query.limit {
            Some(limit) => select.limit(limit as u32),
            None => select,
        };

        let records: Vec<ProcessedActivity> = select
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Pending entries have no processing date and never match a date range,
        // but a user-only search would otherwise include them.
        Ok(records.into_iter().filter(|r| !r.is_pending()).collect())
    }

    async fn queued_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ProcessedActivity>, AppError> {
        let before = format_utc_rfc3339(before);

        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| q.for_all([q.field("date_queued").less_than_or_equal(before.clone())]))
            .order_by([("date_queued", firestore::FirestoreQueryDirection::Ascending)])
            .limit(limit as u32)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn queued_batch(&self, limit: usize) -> Result<Vec<ProcessedActivity>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(|q| q.for_all([q.field("batch").eq(true)]))
            .limit(limit as u32)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn increment_retry_count(&self, activity_id: u64) -> Result<(), AppError> {
        self.increment_field(collections::ACTIVITIES, activity_id, "retry_count")
            .await
    }

    async fn delete_processed(&self, activity_id: u64) -> Result<bool, AppError> {
        if self.get_processed(activity_id).await?.is_none() {
            return Ok(false);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::ACTIVITIES)
            .document_id(activity_id.to_string())
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
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

        let user_id = filter.user_id;
        let cutoff = filter.processed_before.map(format_utc_rfc3339);

        let records: Vec<ProcessedActivity> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    user_id.and_then(|id| q.field("user.id").eq(id)),
                    cutoff
                        .clone()
                        .and_then(|d| q.field("date_processed").less_than(d)),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let ids: Vec<u64> = records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| r.id)
            .collect();
        self.batch_delete(&ids).await?;

        tracing::debug!(
            user_id = ?filter.user_id,
            count = ids.len(),
            "Deleted processed activities"
        );
        Ok(ids.len())
    }
}

#[async_trait]
impl UserStore for FirestoreDb {
    async fn get_user(&self, athlete_id: u64) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&athlete_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn update_user(&self, athlete_id: u64, update: &UserUpdate) -> Result<(), AppError> {
        let fields = update.fields();
        if fields.is_empty() {
            return Ok(());
        }

        // Update mask: fields owned by other writers (counters, tokens,
        // recipes) are left alone.
        let result: Result<(), _> = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields)
            .in_col(collections::USERS)
            .precondition(firestore::FirestoreWritePrecondition::Exists(true))
            .document_id(athlete_id.to_string())
            .object(update)
            .execute()
            .await;

        result.map_err(|e| match e {
            firestore::errors::FirestoreError::DataNotFoundError(_) => {
                AppError::NotFound(format!("user {}", athlete_id))
            }
            e => AppError::Database(e.to_string()),
        })
    }

    async fn increment_activity_count(&self, athlete_id: u64) -> Result<(), AppError> {
        self.increment_field(collections::USERS, athlete_id, "activity_count")
            .await
    }

    async fn get_records(&self, athlete_id: u64) -> Result<Option<AthleteRecords>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ATHLETE_RECORDS)
            .obj()
            .one(&athlete_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_records(
        &self,
        athlete_id: u64,
        records: &AthleteRecords,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ATHLETE_RECORDS)
            .document_id(athlete_id.to_string())
            .object(records)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn add_notification(&self, notification: &Notification) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::NOTIFICATIONS)
            .document_id(&notification.id)
            .object(notification)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
