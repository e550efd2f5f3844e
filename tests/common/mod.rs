// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use activity_automator::config::Config;
use activity_automator::db::{ActivityStore, FirestoreDb, MemoryDb};
use activity_automator::error::AppError;
use activity_automator::models::{
    AthleteProfile, PowerStream, ProcessedActivity, ProcessedActivityDelete,
    ProcessedActivityQuery, Recipe, RecipeAction, RecipeActionType, RecipeCondition,
    RecipeOperator, RecipeProperty, StravaActivity, User, UserPreferences,
};
use activity_automator::routes::create_router;
use activity_automator::services::{ActivityProvider, BasicRuleEngine, StravaAthlete};
use activity_automator::AppState;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Token accepted by the internal routes in `Config::test_default()`.
#[allow(dead_code)]
pub const INTERNAL_TOKEN: &str = "test_internal_token";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// How the mock provider should fail `get_activity`.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum FetchFailure {
    NotFound,
    RateLimit,
}

/// Scripted Strava stand-in.
#[derive(Default)]
pub struct MockProvider {
    pub activities: Mutex<HashMap<u64, StravaActivity>>,
    pub streams: Mutex<HashMap<u64, PowerStream>>,
    pub fetch_failure: Mutex<Option<FetchFailure>>,
    /// Activities whose fetch hits the rate limit.
    pub rate_limited: Mutex<HashSet<u64>>,
    pub reject_updates: Mutex<bool>,
    /// Activity ID and updated field names of every update call.
    pub updates: Mutex<Vec<(u64, Vec<String>)>>,
    pub athlete_ftp: Mutex<Option<u32>>,
    pub saved_ftp: Mutex<Vec<u32>>,
}

#[allow(dead_code)]
impl MockProvider {
    pub fn add_activity(&self, activity: StravaActivity) {
        self.activities.lock().unwrap().insert(activity.id, activity);
    }

    pub fn add_stream(&self, activity_id: u64, stream: PowerStream) {
        self.streams.lock().unwrap().insert(activity_id, stream);
    }

    pub fn fail_fetch(&self, failure: Option<FetchFailure>) {
        *self.fetch_failure.lock().unwrap() = failure;
    }

    pub fn rate_limit_activity(&self, activity_id: u64) {
        self.rate_limited.lock().unwrap().insert(activity_id);
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[async_trait]
impl ActivityProvider for MockProvider {
    async fn get_activity(
        &self,
        _user: &User,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        match *self.fetch_failure.lock().unwrap() {
            Some(FetchFailure::NotFound) => {
                return Err(AppError::NotFound(format!("activity {activity_id}")))
            }
            Some(FetchFailure::RateLimit) => {
                return Err(AppError::StravaApi(
                    AppError::STRAVA_RATE_LIMIT.to_string(),
                ))
            }
            None => {}
        }
        if self.rate_limited.lock().unwrap().contains(&activity_id) {
            return Err(AppError::StravaApi(
                AppError::STRAVA_RATE_LIMIT.to_string(),
            ));
        }
        self.activities
            .lock()
            .unwrap()
            .get(&activity_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("activity {activity_id}")))
    }

    async fn list_activities(
        &self,
        _user: &User,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<StravaActivity>, AppError> {
        let mut list: Vec<StravaActivity> = self
            .activities
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.start_date > after && a.start_date < before)
            .cloned()
            .collect();
        list.sort_by_key(|a| a.start_date);
        Ok(list)
    }

    async fn update_activity(
        &self,
        _user: &User,
        activity: &StravaActivity,
    ) -> Result<(), AppError> {
        let fields = activity
            .updated_fields
            .iter()
            .map(|f| f.as_str().to_string())
            .collect();
        self.updates.lock().unwrap().push((activity.id, fields));
        if *self.reject_updates.lock().unwrap() {
            return Err(AppError::StravaWrite(
                "Strava returned an error".to_string(),
            ));
        }
        Ok(())
    }

    async fn get_athlete(&self, user: &User) -> Result<StravaAthlete, AppError> {
        Ok(StravaAthlete {
            id: user.id,
            firstname: "Test".to_string(),
            lastname: "Rider".to_string(),
            ftp: *self.athlete_ftp.lock().unwrap(),
        })
    }

    async fn update_athlete_ftp(&self, _user: &User, ftp: u32) -> Result<(), AppError> {
        self.saved_ftp.lock().unwrap().push(ftp);
        *self.athlete_ftp.lock().unwrap() = Some(ftp);
        Ok(())
    }

    async fn get_power_stream(
        &self,
        _user: &User,
        activity_id: u64,
    ) -> Result<Option<PowerStream>, AppError> {
        Ok(self.streams.lock().unwrap().get(&activity_id).cloned())
    }
}

/// Everything a test needs to drive the pipeline and inspect its effects.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: Arc<MemoryDb>,
    pub provider: Arc<MockProvider>,
}

/// Create a test app with in-memory storage and a scripted provider.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let mut config = Config::test_default();
    // Queued activities are due immediately.
    config.queue.delay_interval_secs = 0;
    create_test_app_with(config)
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> TestApp {
    let db = Arc::new(MemoryDb::new());
    build_test_app(config, db.clone(), db)
}

/// Like [`create_test_app`], with `store` in front of the activity records.
#[allow(dead_code)]
pub fn create_test_app_with_store<S: ActivityStore + 'static>(
    store: impl FnOnce(Arc<MemoryDb>) -> S,
) -> TestApp {
    let mut config = Config::test_default();
    config.queue.delay_interval_secs = 0;
    let db = Arc::new(MemoryDb::new());
    let store = Arc::new(store(db.clone()));
    build_test_app(config, store, db)
}

fn build_test_app(config: Config, store: Arc<dyn ActivityStore>, db: Arc<MemoryDb>) -> TestApp {
    let provider = Arc::new(MockProvider::default());

    let state = Arc::new(AppState::new(
        config,
        store,
        db.clone(),
        provider.clone(),
        Arc::new(BasicRuleEngine::new()),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        provider,
    }
}

/// Activity store that refuses to save processed (non-queue) records.
#[allow(dead_code)]
pub struct FailingOutcomeStore {
    pub inner: Arc<MemoryDb>,
}

#[async_trait]
impl ActivityStore for FailingOutcomeStore {
    async fn get_processed(
        &self,
        activity_id: u64,
    ) -> Result<Option<ProcessedActivity>, AppError> {
        self.inner.get_processed(activity_id).await
    }

    async fn set_processed(&self, record: &ProcessedActivity) -> Result<(), AppError> {
        if record.date_processed.is_some() {
            return Err(AppError::Database("write rejected".to_string()));
        }
        self.inner.set_processed(record).await
    }

    async fn search_processed(
        &self,
        query: &ProcessedActivityQuery,
    ) -> Result<Vec<ProcessedActivity>, AppError> {
        self.inner.search_processed(query).await
    }

    async fn queued_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ProcessedActivity>, AppError> {
        self.inner.queued_before(before, limit).await
    }

    async fn queued_batch(&self, limit: usize) -> Result<Vec<ProcessedActivity>, AppError> {
        self.inner.queued_batch(limit).await
    }

    async fn increment_retry_count(&self, activity_id: u64) -> Result<(), AppError> {
        self.inner.increment_retry_count(activity_id).await
    }

    async fn delete_processed(&self, activity_id: u64) -> Result<bool, AppError> {
        self.inner.delete_processed(activity_id).await
    }

    async fn delete_processed_where(
        &self,
        filter: &ProcessedActivityDelete,
    ) -> Result<usize, AppError> {
        self.inner.delete_processed_where(filter).await
    }
}

/// A user with no recipes.
#[allow(dead_code)]
pub fn test_user(athlete_id: u64) -> User {
    User {
        id: athlete_id,
        display_name: "Test Rider".to_string(),
        recipes: HashMap::new(),
        suspended: false,
        write_suspended: false,
        is_pro: false,
        profile: AthleteProfile::default(),
        preferences: UserPreferences::default(),
        date_last_ftp_update: None,
        date_last_batch_processing: None,
        activity_count: 0,
        strava_tokens: None,
    }
}

/// A user whose single recipe renames every ride.
#[allow(dead_code)]
pub fn user_with_rename_recipe(athlete_id: u64, new_name: &str) -> User {
    let mut user = test_user(athlete_id);
    let recipe = rename_rides_recipe("r1", new_name);
    user.recipes.insert(recipe.id.clone(), recipe);
    user
}

#[allow(dead_code)]
pub fn rename_rides_recipe(id: &str, new_name: &str) -> Recipe {
    Recipe {
        id: id.to_string(),
        title: format!("Rename to {new_name}"),
        default_for: None,
        order: 0,
        kill_switch: false,
        conditions: vec![RecipeCondition {
            property: RecipeProperty::SportType,
            operator: RecipeOperator::Equal,
            value: serde_json::json!("Ride"),
        }],
        actions: vec![RecipeAction {
            kind: RecipeActionType::Rename,
            value: serde_json::json!(new_name),
        }],
    }
}

/// A one hour ride that started `hours_ago` hours ago.
#[allow(dead_code)]
pub fn test_ride(activity_id: u64, hours_ago: i64) -> StravaActivity {
    StravaActivity {
        id: activity_id,
        name: "Morning Ride".to_string(),
        sport_type: "Ride".to_string(),
        start_date: Utc::now() - Duration::hours(hours_ago),
        moving_time: 3600,
        elapsed_time: 3700,
        distance: 30_000.0,
        total_elevation_gain: 350.0,
        ..Default::default()
    }
}

/// Same as [`test_ride`] with power data.
#[allow(dead_code)]
pub fn test_power_ride(
    activity_id: u64,
    hours_ago: i64,
    moving_time: u32,
    weighted_watts: f64,
) -> StravaActivity {
    StravaActivity {
        moving_time,
        elapsed_time: moving_time,
        has_power: true,
        average_watts: Some(weighted_watts - 10.0),
        weighted_average_watts: Some(weighted_watts),
        ..test_ride(activity_id, hours_ago)
    }
}
