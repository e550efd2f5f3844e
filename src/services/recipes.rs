// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recipe evaluation.
//!
//! The processor only depends on [`RuleEngine`]; [`BasicRuleEngine`] covers
//! the common conditions and actions so the service works end to end.

use crate::error::AppError;
use crate::models::{
    ActivityField, RecipeAction, RecipeActionType, RecipeCondition, RecipeOperator,
    RecipeProperty, StravaActivity, StravaGear, User,
};
use async_trait::async_trait;
use chrono::{Datelike, Duration};
use serde_json::Value;

/// Line appended to the description by the linkback action.
pub const LINKBACK_TEXT: &str = "Automated with Activity Automator";

#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// Evaluate one of the user's recipes against `activity`.
    ///
    /// Returns `true` when every condition matched and the actions were
    /// applied. Actions record what they changed in `updated_fields`.
    async fn evaluate(
        &self,
        user: &User,
        recipe_id: &str,
        activity: &mut StravaActivity,
    ) -> Result<bool, AppError>;

    fn condition_summary(&self, condition: &RecipeCondition) -> String;

    fn action_summary(&self, action: &RecipeAction) -> String;
}

#[derive(Debug, Clone, Default)]
pub struct BasicRuleEngine;

impl BasicRuleEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RuleEngine for BasicRuleEngine {
    async fn evaluate(
        &self,
        user: &User,
        recipe_id: &str,
        activity: &mut StravaActivity,
    ) -> Result<bool, AppError> {
        let recipe = user
            .recipes
            .get(recipe_id)
            .ok_or_else(|| AppError::NotFound(format!("recipe {}", recipe_id)))?;

        for condition in &recipe.conditions {
            if !condition_matches(condition, activity)? {
                return Ok(false);
            }
        }

        for action in &recipe.actions {
            apply_action(action, activity)?;
        }
        Ok(true)
    }

    fn condition_summary(&self, condition: &RecipeCondition) -> String {
        let op = match condition.operator {
            RecipeOperator::Equal => "=",
            RecipeOperator::NotEqual => "!=",
            RecipeOperator::Like => "contains",
            RecipeOperator::GreaterThan => ">",
            RecipeOperator::LessThan => "<",
        };
        format!(
            "{} {} {}",
            property_name(condition.property),
            op,
            value_text(&condition.value)
        )
    }

    fn action_summary(&self, action: &RecipeAction) -> String {
        let name = match action.kind {
            RecipeActionType::Rename => "Set name",
            RecipeActionType::SetDescription => "Set description",
            RecipeActionType::AppendDescription => "Append to description",
            RecipeActionType::Commute => "Mark as commute",
            RecipeActionType::Trainer => "Mark as trainer",
            RecipeActionType::HideHome => "Hide from home feed",
            RecipeActionType::Gear => "Set gear",
            RecipeActionType::SportType => "Set sport type",
            RecipeActionType::Linkback => return "Add linkback".to_string(),
        };
        if action.value.is_null() {
            name.to_string()
        } else {
            format!("{}: {}", name, value_text(&action.value))
        }
    }
}

fn property_name(property: RecipeProperty) -> &'static str {
    match property {
        RecipeProperty::SportType => "sport type",
        RecipeProperty::Name => "name",
        RecipeProperty::Distance => "distance",
        RecipeProperty::Commute => "commute",
        RecipeProperty::Trainer => "trainer",
        RecipeProperty::Weekday => "weekday",
    }
}

/// Display text for a JSON value, without quotes around strings.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn invalid(condition: &RecipeCondition) -> AppError {
    AppError::Validation(format!(
        "invalid condition: {} {:?} {}",
        property_name(condition.property),
        condition.operator,
        condition.value
    ))
}

fn condition_matches(
    condition: &RecipeCondition,
    activity: &StravaActivity,
) -> Result<bool, AppError> {
    match condition.property {
        RecipeProperty::SportType => text_matches(condition, &activity.sport_type),
        RecipeProperty::Name => text_matches(condition, &activity.name),
        RecipeProperty::Distance => number_matches(condition, activity.distance / 1000.0),
        RecipeProperty::Weekday => {
            let local = activity.start_date + Duration::seconds(activity.utc_offset as i64);
            number_matches(condition, f64::from(local.weekday().num_days_from_sunday()))
        }
        RecipeProperty::Commute => bool_matches(condition, activity.commute),
        RecipeProperty::Trainer => bool_matches(condition, activity.trainer),
    }
}

fn text_matches(condition: &RecipeCondition, actual: &str) -> Result<bool, AppError> {
    let expected = condition
        .value
        .as_str()
        .ok_or_else(|| invalid(condition))?
        .to_lowercase();
    let actual = actual.to_lowercase();

    match condition.operator {
        RecipeOperator::Equal => Ok(actual == expected),
        RecipeOperator::NotEqual => Ok(actual != expected),
        RecipeOperator::Like => Ok(actual.contains(&expected)),
        _ => Err(invalid(condition)),
    }
}

fn number_matches(condition: &RecipeCondition, actual: f64) -> Result<bool, AppError> {
    let expected = condition.value.as_f64().ok_or_else(|| invalid(condition))?;

    match condition.operator {
        RecipeOperator::Equal => Ok((actual - expected).abs() < 0.5),
        RecipeOperator::NotEqual => Ok((actual - expected).abs() >= 0.5),
        RecipeOperator::GreaterThan => Ok(actual > expected),
        RecipeOperator::LessThan => Ok(actual < expected),
        RecipeOperator::Like => Err(invalid(condition)),
    }
}

fn bool_matches(condition: &RecipeCondition, actual: bool) -> Result<bool, AppError> {
    let expected = condition.value.as_bool().ok_or_else(|| invalid(condition))?;

    match condition.operator {
        RecipeOperator::Equal => Ok(actual == expected),
        RecipeOperator::NotEqual => Ok(actual != expected),
        _ => Err(invalid(condition)),
    }
}

fn apply_action(action: &RecipeAction, activity: &mut StravaActivity) -> Result<(), AppError> {
    let text = || {
        action
            .value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation(format!("{:?} needs a text value", action.kind)))
    };
    let flag = || action.value.as_bool().unwrap_or(true);

    match action.kind {
        RecipeActionType::Rename => {
            activity.name = text()?;
            activity.mark_updated(ActivityField::Name);
        }
        RecipeActionType::SetDescription => {
            activity.description = Some(text()?);
            activity.mark_updated(ActivityField::Description);
        }
        RecipeActionType::AppendDescription => {
            append_description(activity, &text()?);
        }
        RecipeActionType::Commute => {
            activity.commute = flag();
            activity.mark_updated(ActivityField::Commute);
        }
        RecipeActionType::Trainer => {
            activity.trainer = flag();
            activity.mark_updated(ActivityField::Trainer);
        }
        RecipeActionType::HideHome => {
            activity.hide_from_home = flag();
            activity.mark_updated(ActivityField::HideHome);
        }
        RecipeActionType::Gear => {
            let gear = match &action.value {
                Value::String(id) if id == StravaGear::NONE_ID => StravaGear::none(),
                Value::String(id) => StravaGear {
                    id: id.clone(),
                    name: id.clone(),
                },
                other => serde_json::from_value(other.clone())
                    .map_err(|e| AppError::Validation(format!("invalid gear: {}", e)))?,
            };
            activity.gear = Some(gear);
            activity.mark_updated(ActivityField::Gear);
        }
        RecipeActionType::SportType => {
            activity.sport_type = text()?;
            activity.mark_updated(ActivityField::SportType);
        }
        RecipeActionType::Linkback => {
            if !activity.linkback {
                append_description(activity, LINKBACK_TEXT);
                activity.linkback = true;
            }
        }
    }
    Ok(())
}

fn append_description(activity: &mut StravaActivity, text: &str) {
    let description = match activity.description.take().filter(|d| !d.is_empty()) {
        Some(existing) => format!("{}\n{}", existing, text),
        None => text.to_string(),
    };
    activity.description = Some(description);
    activity.mark_updated(ActivityField::Description);
}
