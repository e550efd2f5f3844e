// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod activity;
pub mod ftp;
pub mod notification;
pub mod processed;
pub mod recipe;
pub mod records;
pub mod user;

pub use activity::{ActivityField, ActivityFilter, StravaActivity, StravaGear};
pub use ftp::{FtpBestActivity, FtpEstimate, PowerIntervals, PowerStream};
pub use notification::Notification;
pub use processed::{
    ProcessedActivity, ProcessedActivityDelete, ProcessedActivityQuery, ProcessedActivityUser,
    RecipeSummary,
};
pub use recipe::{
    Recipe, RecipeAction, RecipeActionType, RecipeCondition, RecipeOperator, RecipeProperty,
};
pub use records::AthleteRecords;
pub use user::{AthleteProfile, StravaTokens, User, UserPreferences, UserUpdate};
