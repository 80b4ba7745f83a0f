//! Event payloads (spec §3 "Event payload"). The engine never interprets
//! `data` except to surface it to user code and validate it against a
//! caller-supplied schema at run start.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub name: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<String>,
}

impl EventPayload {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            user: None,
            id: None,
            ts: None,
            v: None,
        }
    }
}

/// A function trigger: either an event name (with an optional filter
/// expression) or a cron string (spec §3 "Trigger").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trigger {
    Event {
        event: String,
        #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
        if_expr: Option<String>,
    },
    Cron {
        cron: String,
    },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
