// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity Automator: apply automation recipes to Strava activities.
//!
//! This crate provides the backend that receives Strava webhooks, runs each
//! new activity through the athlete's recipes (right away or via a delayed
//! queue) and keeps the athlete's FTP up to date from recent power data.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{ActivityStore, UserStore};
use services::{
    ActivityProcessor, ActivityProvider, ActivityQueue, Events, FtpEstimator, ProcessorDeps,
    RuleEngine, StoreNotifier,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub store: Arc<dyn ActivityStore>,
    pub queue: Arc<ActivityQueue>,
    pub processor: Arc<ActivityProcessor>,
    pub ftp: Arc<FtpEstimator>,
    pub events: Events,
}

impl AppState {
    /// Wire the pipeline components around the given collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn ActivityStore>,
        users: Arc<dyn UserStore>,
        provider: Arc<dyn ActivityProvider>,
        rules: Arc<dyn RuleEngine>,
    ) -> Self {
        let events = Events::new();

        let queue = Arc::new(ActivityQueue::new(
            store.clone(),
            users.clone(),
            config.queue.clone(),
        ));
        let ftp = Arc::new(FtpEstimator::new(
            provider.clone(),
            users.clone(),
            events.clone(),
            config.ftp.clone(),
        ));
        let processor = Arc::new(ActivityProcessor::new(
            ProcessorDeps {
                provider,
                rules,
                store: store.clone(),
                users: users.clone(),
                notifier: Arc::new(StoreNotifier::new(users.clone())),
                events: events.clone(),
            },
            queue.clone(),
            ftp.clone(),
            config.plans.clone(),
        ));

        Self {
            config,
            users,
            store,
            queue,
            processor,
            ftp,
            events,
        }
    }
}
