//! Memoized/outgoing op wire shapes and the `ExecutionResult` taxonomy
//! (spec §3).

use crate::id::HashedId;
use crate::step::{OpCode, RetryAfter, StepOpts};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A single entry in the Executor-supplied memoization map, keyed by
/// hashed id (spec §3 "Memoized op").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoizedOp {
    pub id: HashedId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Set by the engine once rediscovered this replay.
    #[serde(skip)]
    pub seen: bool,
    /// Set by the engine once the user future has settled.
    #[serde(skip)]
    pub fulfilled: bool,
}

impl MemoizedOp {
    pub fn is_fulfilled(&self) -> bool {
        self.data.is_some() || self.error.is_some()
    }
}

/// The map of memoized ops the Executor hands in with a run request,
/// keyed by hashed id (spec §3).
pub type MemoizedState = HashMap<HashedId, MemoizedOp>;

/// Timing for a single executed step (spec §4.7 "GoInterval-shaped").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub start: String,
    pub end: String,
    pub duration_ms: u64,
}

/// The serialized form of a step reported to the Executor (spec §3
/// "Outgoing op").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingOp {
    pub id: HashedId,
    pub op: OpCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opts: Option<StepOpts>,
    #[serde(default = "Value::default")]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userland: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

/// What a single HTTP request returns (spec §3 "Execution result").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExecutionResult {
    FunctionResolved {
        data: Value,
    },
    FunctionRejected {
        error: Value,
        retriable: Retriable,
    },
    StepRan {
        step: OutgoingOp,
    },
    StepsFound {
        steps: Vec<OutgoingOp>,
    },
    StepNotFound {
        step: HashedId,
    },
    ChangeMode {
        to: String,
        token: String,
    },
}

/// Whether a rejected run may be retried, and when (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Retriable {
    Bool(bool),
    After(RetryAfter),
}

impl Retriable {
    pub fn is_retriable(&self) -> bool {
        match self {
            Retriable::Bool(b) => *b,
            Retriable::After(_) => true,
        }
    }
}

/// Normalize `null`/absent JSON values the way spec §3/§8 (P5) requires:
/// every `undefined` becomes `null`. `serde_json::Value` has no
/// `Undefined` variant, so in Rust this normalizes missing object keys
/// are never emitted as `"undefined"` strings and `Option::None` always
/// serializes to `Value::Null` rather than being dropped.
pub fn normalize_undefined(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_undefined(v)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(normalize_undefined).collect())
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
