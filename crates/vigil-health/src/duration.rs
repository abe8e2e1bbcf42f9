//! Human-readable durations for configuration files.
//!
//! Accepts `"500ms"`, `"5s"`, `"2m"`, or a bare integer meaning seconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{HealthError, HealthResult};

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> HealthResult<Duration> {
    let s = s.trim();
    let invalid = || HealthError::InvalidDuration(s.to_string());

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Text(String),
    Seconds(u64),
}

impl RawDuration {
    fn into_duration(self) -> HealthResult<Duration> {
        match self {
            RawDuration::Text(s) => parse_duration(&s),
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        }
    }
}

/// `deserialize_with` helper for `Duration` fields.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    RawDuration::deserialize(deserializer)?
        .into_duration()
        .map_err(serde::de::Error::custom)
}

/// `deserialize_with` helper for `Option<Duration>` fields.
pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawDuration>::deserialize(deserializer)?
        .map(RawDuration::into_duration)
        .transpose()
        .map_err(serde::de::Error::custom)
}
