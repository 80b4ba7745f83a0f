//! Duration parsing for `step.sleep`/`step.sleepUntil` (spec §4.2).
//!
//! Accepts a millisecond count, a human string (`"1h"`, `"90s"`), or an
//! ISO-8601 duration (`"PT1H30M"`).

use crate::error::CoreError;
use std::time::Duration;

/// An input to `step.sleep`: either a raw millisecond count or a string
/// in human or ISO-8601 duration form.
#[derive(Debug, Clone)]
pub enum SleepInput {
    Millis(u64),
    Text(String),
}

impl From<u64> for SleepInput {
    fn from(ms: u64) -> Self {
        SleepInput::Millis(ms)
    }
}

impl From<&str> for SleepInput {
    fn from(s: &str) -> Self {
        SleepInput::Text(s.to_string())
    }
}

/// Parse a sleep input into a duration. The step's `name` (per spec §4.2,
/// "Name is the ms integer as string") is derived from the result.
pub fn parse_sleep(input: &SleepInput) -> Result<Duration, CoreError> {
    match input {
        SleepInput::Millis(ms) => Ok(Duration::from_millis(*ms)),
        SleepInput::Text(s) => parse_duration_text(s),
    }
}

fn parse_duration_text(s: &str) -> Result<Duration, CoreError> {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix('P') {
        return parse_iso8601_duration(rest)
            .ok_or_else(|| CoreError::InvalidDuration(s.to_string()));
    }
    humantime::parse_duration(trimmed).map_err(|_| CoreError::InvalidDuration(s.to_string()))
}

/// Parses the portion of an ISO-8601 duration after the leading `P`.
/// Supports the day/hour/minute/second fields used by the durable-function
/// wire protocol (no years/months — run durations never span those).
fn parse_iso8601_duration(rest: &str) -> Option<Duration> {
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total_secs: f64 = 0.0;
    total_secs += sum_fields(date_part, &[('D', 86_400.0)])?;
    if let Some(time_part) = time_part {
        total_secs += sum_fields(time_part, &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)])?;
    }
    if total_secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(total_secs))
}

fn sum_fields(segment: &str, units: &[(char, f64)]) -> Option<f64> {
    let mut remaining = segment;
    let mut total = 0.0;
    for &(unit, seconds_per_unit) in units {
        let Some(idx) = remaining.find(unit) else {
            continue;
        };
        let value: f64 = remaining[..idx].parse().ok()?;
        total += value * seconds_per_unit;
        remaining = &remaining[idx + 1..];
    }
    if remaining.is_empty() {
        Some(total)
    } else {
        None
    }
}

/// Parse a `sleepUntil` ISO-8601 instant into epoch milliseconds.
pub fn parse_instant(s: &str) -> Result<i64, CoreError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| CoreError::InvalidInstant(s.to_string()))
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
