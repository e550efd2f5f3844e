// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for activity processing.

use activity_automator::db::{ActivityStore, UserStore};
use activity_automator::error::AppError;
use activity_automator::models::{ActivityFilter, ProcessedActivityQuery};
use activity_automator::services::processor::build_processed_record;
use activity_automator::services::PipelineEvent;
use chrono::{Duration, Utc};

mod common;
use common::{
    create_test_app, rename_rides_recipe, test_power_ride, test_ride, test_user,
    user_with_rename_recipe, FetchFailure,
};

#[tokio::test]
async fn test_user_without_recipes_is_skipped() {
    let app = create_test_app();
    let mut user = test_user(1);
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 2));

    let result = app.state.processor.process(&mut user, 100, false).await.unwrap();

    assert!(result.is_none());
    assert_eq!(app.provider.update_count(), 0);
    assert_eq!(app.db.processed_count(), 0);
}

#[tokio::test]
async fn test_suspended_user_is_skipped() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    user.suspended = true;
    app.provider.add_activity(test_ride(100, 2));

    let result = app.state.processor.process(&mut user, 100, false).await.unwrap();

    assert!(result.is_none());
    assert_eq!(app.provider.update_count(), 0);
}

#[tokio::test]
async fn test_matching_recipe_updates_activity() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 2));
    let mut events = app.state.events.subscribe();

    let record = app
        .state
        .processor
        .process(&mut user, 100, false)
        .await
        .unwrap()
        .expect("recipe should fire");

    assert_eq!(record.updated_fields["name"], "Commute");
    assert_eq!(record.recipes["r1"].title, "Rename to Commute");
    assert_eq!(record.recipes["r1"].conditions, vec!["sport type = Ride"]);
    assert!(record.error.is_none());
    assert_eq!(record.name.as_deref(), Some("Commute"));

    let updates = app.provider.updates.lock().unwrap().clone();
    assert_eq!(updates, vec![(100, vec!["name".to_string()])]);

    assert_eq!(user.activity_count, 1);
    let stored_user = app.db.get_user(1).await.unwrap().unwrap();
    assert_eq!(stored_user.activity_count, 1);

    let stored = app.db.get_processed(100).await.unwrap().unwrap();
    assert_eq!(stored, record);

    match events.try_recv().unwrap() {
        PipelineEvent::ActivityProcessed {
            athlete_id,
            activity_id,
            recipes,
            updated_fields,
            error,
        } => {
            assert_eq!((athlete_id, activity_id), (1, 100));
            assert_eq!((recipes, updated_fields), (1, 1));
            assert!(error.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_no_matching_recipe_returns_none() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    app.db.insert_user(user.clone());
    let mut run = test_ride(100, 2);
    run.sport_type = "Run".to_string();
    app.provider.add_activity(run);

    let result = app.state.processor.process(&mut user, 100, false).await.unwrap();

    assert!(result.is_none());
    assert_eq!(app.provider.update_count(), 0);
    assert_eq!(user.activity_count, 0);
}

#[tokio::test]
async fn test_kill_switch_stops_later_recipes() {
    let app = create_test_app();
    let mut user = test_user(1);
    let mut first = rename_rides_recipe("a", "First");
    first.order = 1;
    first.kill_switch = true;
    let mut second = rename_rides_recipe("b", "Second");
    second.order = 2;
    user.recipes.insert("a".to_string(), first);
    user.recipes.insert("b".to_string(), second);
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 2));

    let record = app
        .state
        .processor
        .process(&mut user, 100, false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.recipes.len(), 1);
    assert!(record.recipes.contains_key("a"));
    assert_eq!(record.updated_fields["name"], "First");
}

#[tokio::test]
async fn test_later_recipe_overrides_earlier_value() {
    let app = create_test_app();
    let mut user = test_user(1);
    let mut first = rename_rides_recipe("a", "First");
    first.order = 1;
    let mut second = rename_rides_recipe("b", "Second");
    second.order = 2;
    user.recipes.insert("a".to_string(), first);
    user.recipes.insert("b".to_string(), second);
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 2));

    let record = app
        .state
        .processor
        .process(&mut user, 100, false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.recipes.len(), 2);
    assert_eq!(record.updated_fields["name"], "Second");
    let updates = app.provider.updates.lock().unwrap().clone();
    assert_eq!(updates[0].1, vec!["name".to_string()], "fields are deduplicated");
}

#[tokio::test]
async fn test_deleted_activity_returns_none() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    app.provider.fail_fetch(Some(FetchFailure::NotFound));

    let result = app.state.processor.process(&mut user, 100, false).await.unwrap();

    assert!(result.is_none());
    assert!(app.db.get_processed(100).await.unwrap().is_none());
}

#[tokio::test]
async fn test_transient_failure_queues_realtime_activity() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    app.provider.fail_fetch(Some(FetchFailure::RateLimit));

    let err = app
        .state
        .processor
        .process(&mut user, 100, false)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::StravaApi(_)));
    let queued = app.db.get_processed(100).await.unwrap().unwrap();
    assert!(queued.is_pending());
    assert_eq!(queued.retry_count, 1);
}

#[tokio::test]
async fn test_transient_failure_from_queue_is_not_requeued() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    app.provider.fail_fetch(Some(FetchFailure::RateLimit));

    let result = app.state.processor.process(&mut user, 100, true).await;

    assert!(result.is_err());
    assert!(app.db.get_processed(100).await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_suspended_user_not_updated() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    user.write_suspended = true;
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 2));

    let result = app.state.processor.process(&mut user, 100, false).await.unwrap();

    assert!(result.is_none());
    assert_eq!(app.provider.update_count(), 0);
    assert_eq!(app.db.processed_count(), 0);
}

#[tokio::test]
async fn test_rejected_update_is_recorded_and_notified() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 2));
    *app.provider.reject_updates.lock().unwrap() = true;

    let record = app
        .state
        .processor
        .process(&mut user, 100, false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.error.as_deref(), Some("Strava returned an error"));

    let notifications = app.db.notifications_for(1);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Failed to process activity 100");
    assert_eq!(notifications[0].activity_id, Some(100));
    assert!(notifications[0].body.contains("\"Commute\""));
}

#[tokio::test]
async fn test_privacy_mode_hides_activity_details() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    user.preferences.privacy_mode = true;
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 2));

    let record = app
        .state
        .processor
        .process(&mut user, 100, false)
        .await
        .unwrap()
        .unwrap();

    assert!(record.name.is_none());
    assert!(record.date_start.is_none());
    assert_eq!(record.updated_fields["name"], "Commute");
}

#[tokio::test]
async fn test_new_records_reported_on_second_activity() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 5));
    let mut longer = test_ride(101, 2);
    longer.distance = 80_000.0;
    app.provider.add_activity(longer);

    let first = app
        .state
        .processor
        .process(&mut user, 100, false)
        .await
        .unwrap()
        .unwrap();
    assert!(first.new_records.is_none());

    let second = app
        .state
        .processor
        .process(&mut user, 101, false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.new_records, Some(vec!["distance".to_string()]));
}

#[tokio::test]
async fn test_hard_effort_updates_ftp() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    user.preferences.ftp_auto_update = true;
    user.profile.ftp = Some(200);
    app.db.insert_user(user.clone());
    *app.provider.athlete_ftp.lock().unwrap() = Some(200);
    app.provider.add_activity(test_power_ride(100, 2, 3600, 250.0));

    app.state
        .processor
        .process(&mut user, 100, false)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(app.provider.saved_ftp.lock().unwrap().clone(), vec![250]);
    assert_eq!(user.profile.ftp, Some(250));
    assert!(user.date_last_ftp_update.is_some());
}

#[tokio::test]
async fn test_ftp_untouched_without_auto_update() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    user.profile.ftp = Some(200);
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_power_ride(100, 2, 3600, 250.0));

    app.state.processor.process(&mut user, 100, false).await.unwrap();

    assert!(app.provider.saved_ftp.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_ftp_is_not_a_known_ftp() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    user.preferences.ftp_auto_update = true;
    user.profile.ftp = Some(0);
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_power_ride(100, 2, 3600, 250.0));

    app.state.processor.process(&mut user, 100, false).await.unwrap();

    assert!(app.provider.saved_ftp.lock().unwrap().is_empty());
    assert!(user.date_last_ftp_update.is_none());
}

#[tokio::test]
async fn test_get_processed_activities_filters_by_user() {
    let app = create_test_app();
    let mut alice = user_with_rename_recipe(1, "Commute");
    let mut bob = user_with_rename_recipe(2, "Commute");
    app.db.insert_user(alice.clone());
    app.db.insert_user(bob.clone());
    app.provider.add_activity(test_ride(100, 3));
    app.provider.add_activity(test_ride(101, 2));

    app.state.processor.process(&mut alice, 100, false).await.unwrap();
    app.state.processor.process(&mut bob, 101, false).await.unwrap();

    let found = app
        .state
        .processor
        .get_processed_activities(&ProcessedActivityQuery {
            user_id: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, 100);
}

#[tokio::test]
async fn test_delete_processed_activities_requires_filter() {
    let app = create_test_app();
    let err = app
        .state
        .processor
        .delete_processed_activities(None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // A zero age is ignored, leaving the filter empty.
    let err = app
        .state
        .processor
        .delete_processed_activities(None, Some(0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_delete_processed_activities_by_user() {
    let app = create_test_app();
    let mut alice = user_with_rename_recipe(1, "Commute");
    let mut bob = user_with_rename_recipe(2, "Commute");
    app.db.insert_user(alice.clone());
    app.db.insert_user(bob.clone());
    app.provider.add_activity(test_ride(100, 3));
    app.provider.add_activity(test_ride(101, 2));
    app.state.processor.process(&mut alice, 100, false).await.unwrap();
    app.state.processor.process(&mut bob, 101, false).await.unwrap();

    let deleted = app
        .state
        .processor
        .delete_processed_activities(Some(&alice), None)
        .await
        .unwrap();

    assert_eq!(deleted, 1);
    assert!(app.db.get_processed(100).await.unwrap().is_none());
    assert!(app.db.get_processed(101).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_processed_activities_by_age() {
    let app = create_test_app();
    let user = test_user(1);

    let old = build_processed_record(
        &user,
        &test_ride(100, 2),
        vec![],
        None,
        Utc::now() - Duration::days(40),
    );
    let recent = build_processed_record(
        &user,
        &test_ride(101, 2),
        vec![],
        None,
        Utc::now() - Duration::days(5),
    );
    app.db.set_processed(&old).await.unwrap();
    app.db.set_processed(&recent).await.unwrap();

    let deleted = app
        .state
        .processor
        .delete_processed_activities(None, Some(30))
        .await
        .unwrap();

    assert_eq!(deleted, 1);
    assert!(app.db.get_processed(100).await.unwrap().is_none());
    assert!(app.db.get_processed(101).await.unwrap().is_some());
}

#[tokio::test]
async fn test_batch_process_queues_matching_activities() {
    let app = create_test_app();
    let user = user_with_rename_recipe(1, "Commute");
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 48));
    let mut commute = test_ride(101, 24);
    commute.commute = true;
    app.provider.add_activity(commute);

    let filter = ActivityFilter {
        commute: Some(true),
        ..Default::default()
    };
    let queued = app
        .state
        .processor
        .batch_process(&user, Utc::now() - Duration::days(7), None, &filter)
        .await
        .unwrap();

    assert_eq!(queued, 1);
    let record = app.db.get_processed(101).await.unwrap().unwrap();
    assert!(record.batch);
    assert!(app.db.get_processed(100).await.unwrap().is_none());

    let stored_user = app.db.get_user(1).await.unwrap().unwrap();
    assert!(stored_user.date_last_batch_processing.is_some());
}

#[tokio::test]
async fn test_batch_process_rejects_old_start_date() {
    let app = create_test_app();
    let user = user_with_rename_recipe(1, "Commute");
    app.db.insert_user(user.clone());

    let err = app
        .state
        .processor
        .batch_process(
            &user,
            Utc::now() - Duration::days(90),
            None,
            &ActivityFilter::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_batch_process_pro_allows_longer_window() {
    let app = create_test_app();
    let mut user = user_with_rename_recipe(1, "Commute");
    user.is_pro = true;
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 24 * 60));

    let queued = app
        .state
        .processor
        .batch_process(
            &user,
            Utc::now() - Duration::days(90),
            None,
            &ActivityFilter::default(),
        )
        .await
        .unwrap();

    assert_eq!(queued, 1);
}

#[tokio::test]
async fn test_batch_process_without_recipes_queues_nothing() {
    let app = create_test_app();
    let user = test_user(1);
    app.db.insert_user(user.clone());
    app.provider.add_activity(test_ride(100, 24));

    let queued = app
        .state
        .processor
        .batch_process(&user, Utc::now() - Duration::days(7), None, &ActivityFilter::default())
        .await
        .unwrap();

    assert_eq!(queued, 0);
    assert_eq!(app.db.processed_count(), 0);
}
