// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.
//!
//! Dates are stored as RFC3339 strings with second precision and a `Z` suffix,
//! so lexical order in Firestore matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC3339 timestamp (any offset) into UTC.
pub fn parse_utc_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter for `DateTime<Utc>` fields stored as sortable strings.
pub mod rfc3339 {
    use super::{format_utc_rfc3339, parse_utc_rfc3339};
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_utc_rfc3339(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_utc_rfc3339(&raw).ok_or_else(|| D::Error::custom(format!("invalid date: {raw}")))
    }
}

/// Serde adapter for optional dates; pair with `skip_serializing_if = "Option::is_none"`.
pub mod rfc3339_option {
    use super::{format_utc_rfc3339, parse_utc_rfc3339};
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => s.serialize_str(&format_utc_rfc3339(*date)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => parse_utc_rfc3339(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid date: {raw}"))),
            None => Ok(None),
        }
    }
}
