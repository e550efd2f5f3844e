// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Automation recipes: conditions checked against an activity, actions applied when they all match.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub title: String,
    /// Sport type this recipe is the default for (sorted first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_for: Option<String>,
    #[serde(default)]
    pub order: i32,
    /// Stop evaluating further recipes once this one fires
    #[serde(default)]
    pub kill_switch: bool,
    #[serde(default)]
    pub conditions: Vec<RecipeCondition>,
    #[serde(default)]
    pub actions: Vec<RecipeAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeCondition {
    pub property: RecipeProperty,
    pub operator: RecipeOperator,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeProperty {
    SportType,
    Name,
    /// Kilometers
    Distance,
    Commute,
    Trainer,
    /// Local weekday of the start time, 0 = Sunday
    Weekday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeOperator {
    Equal,
    NotEqual,
    Like,
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeAction {
    #[serde(rename = "type")]
    pub kind: RecipeActionType,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeActionType {
    Rename,
    SetDescription,
    AppendDescription,
    Commute,
    Trainer,
    HideHome,
    Gear,
    SportType,
    Linkback,
}

/// Recipes in evaluation order: sport defaults first, then `order`, then title.
///
/// Free users only get the first `free_limit` recipes of that order.
pub fn ordered_recipes(
    recipes: &HashMap<String, Recipe>,
    is_pro: bool,
    free_limit: usize,
) -> Vec<&Recipe> {
    let mut sorted: Vec<&Recipe> = recipes.values().collect();
    sorted.sort_by(|a, b| {
        (a.default_for.is_none(), &a.default_for, a.order, &a.title, &a.id).cmp(&(
            b.default_for.is_none(),
            &b.default_for,
            b.order,
            &b.title,
            &b.id,
        ))
    });

    if !is_pro && sorted.len() > free_limit {
        sorted.truncate(free_limit);
    }
    sorted
}
