//! Duration literals in configuration files.
//!
//! Supports two formats:
//! - `humantime`: `45s`, `5m`, `1h 30m`, `1500ms`
//! - ISO 8601: `PT45S`, `PT1H30M`
//!
//! Negative literals are rejected outright: a session cannot last less than
//! zero seconds.

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Parse a duration string.
///
/// Tries humantime first, then ISO 8601.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let trimmed = s.trim();

    if trimmed.starts_with('-') {
        return Err(format!("invalid duration '{}': must not be negative", s));
    }

    if let Ok(d) = humantime::parse_duration(trimmed) {
        return Ok(d);
    }

    if let Ok(d) = iso8601_duration::Duration::parse(trimmed) {
        if let Some(std_duration) = d.to_std() {
            return Ok(std_duration);
        }
    }

    Err(format!(
        "invalid duration '{}': expected humantime (45s) or ISO 8601 (PT45S)",
        s
    ))
}

/// Deserialize a duration from a string.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}
