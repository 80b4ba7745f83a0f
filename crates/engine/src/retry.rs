//! Error classification (spec §7, §9 "Deep inheritance" — `Error ->
//! NonRetriableError | RetryAfterError | StepError` modeled as value
//! shapes rather than a class hierarchy, since user handlers communicate
//! errors as plain JSON across the future boundary).

use durable_core::RetryAfter;
use serde_json::{json, Value};

/// Build the JSON shape user code throws to mark an error as terminal
/// regardless of remaining attempts.
pub fn non_retriable_error(message: impl Into<String>) -> Value {
    json!({ "name": "NonRetriableError", "message": message.into() })
}

/// Build the JSON shape user code throws to request a specific retry
/// delay (milliseconds) instead of the default backoff.
pub fn retry_after_error(message: impl Into<String>, retry_after_ms: u64) -> Value {
    json!({
        "name": "RetryAfterError",
        "message": message.into(),
        "retryAfterMs": retry_after_ms,
    })
}

/// Build the JSON shape user code throws to request a retry at a specific
/// instant rather than a relative delay.
pub fn retry_after_instant_error(message: impl Into<String>, instant: impl Into<String>) -> Value {
    json!({
        "name": "RetryAfterError",
        "message": message.into(),
        "retryAfterIso": instant.into(),
    })
}

/// The wrapper the engine installs around a step's own failure, so a bare
/// re-throw of it at the handler level is recognized (spec §7.4).
pub fn step_error(step_id: &str, cause: Value) -> Value {
    json!({ "name": "StepError", "message": format!("step \"{step_id}\" failed"), "stepId": step_id, "cause": cause })
}

pub fn error_name(err: &Value) -> Option<&str> {
    err.get("name").and_then(Value::as_str)
}

pub fn is_non_retriable(err: &Value) -> bool {
    error_name(err) == Some("NonRetriableError")
}

/// A bare re-throw of the most recently injected `StepError` is
/// non-retriable: the handler swallowed nothing and simply propagated the
/// last step's terminal failure (spec §7.4).
pub fn is_rethrown_step_error(err: &Value, recent_step_error: Option<&Value>) -> bool {
    error_name(err) == Some("StepError") && Some(err) == recent_step_error
}

/// Extract a `RetryAfter` from a `RetryAfterError` value shape, rounding
/// a millisecond delay up to whole seconds (spec P6).
pub fn extract_retry_after(err: &Value) -> Option<RetryAfter> {
    if error_name(err) != Some("RetryAfterError") {
        return None;
    }
    if let Some(ms) = err.get("retryAfterMs").and_then(Value::as_u64) {
        let secs = ms.div_ceil(1000);
        return Some(RetryAfter::Seconds(secs));
    }
    if let Some(iso) = err.get("retryAfterIso").and_then(Value::as_str) {
        return Some(RetryAfter::Instant(iso.to_string()));
    }
    None
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
