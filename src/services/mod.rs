// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod ftp;
pub mod notifications;
pub mod processor;
pub mod queue;
pub mod recipes;
pub mod strava;

pub use ftp::FtpEstimator;
pub use notifications::{Events, Notifier, PipelineEvent, StoreNotifier};
pub use processor::{ActivityProcessor, ProcessorDeps};
pub use queue::{ActivityQueue, DrainResult};
pub use recipes::{BasicRuleEngine, RuleEngine};
pub use strava::{ActivityProvider, StravaAthlete, StravaClient, StravaService};
