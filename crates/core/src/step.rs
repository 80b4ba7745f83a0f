//! Step descriptors: the value types a step tool call synchronously
//! produces (spec §3 "Step descriptor").

use crate::id::HashedId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Discriminates the kind of step a descriptor represents (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpCode {
    StepPlanned,
    Sleep,
    WaitForEvent,
    WaitForSignal,
    InvokeFunction,
    AiGateway,
    Gateway,
    StepRun,
    StepError,
    StepFailed,
    StepNotFound,
    RunComplete,
    DiscoveryRequest,
}

/// Whether the engine may execute a step inline (`Sync`) or must always
/// report it for Executor planning first (`Async`), spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepMode {
    Sync,
    Async,
}

/// Ambient concurrency tag inherited from an enclosing `group.parallel`
/// scope, or set explicitly per step (spec §4.2/§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelMode {
    Race,
}

/// How a retry-after delay was expressed by user code (spec §4.7, §7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetryAfter {
    Seconds(u64),
    Instant(String),
}

/// Operation-specific options carried on a step descriptor (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_mode: Option<ParallelMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// A step descriptor, as produced synchronously by a step tool call
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescriptor {
    pub id: String,
    pub hashed_id: HashedId,
    pub op: OpCode,
    pub mode: StepMode,
    #[serde(default)]
    pub opts: StepOpts,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

impl StepDescriptor {
    pub fn new(id: String, hashed_id: HashedId, op: OpCode, mode: StepMode) -> Self {
        let display_name = id.clone();
        Self {
            id,
            hashed_id,
            op,
            mode,
            opts: StepOpts::default(),
            display_name,
            name: None,
            input: None,
        }
    }

    pub fn with_opts(mut self, opts: StepOpts) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }
}

/// `sleep(id, ms)` stores the millisecond count as its display name
/// (spec §4.2 table).
pub fn sleep_name(duration: Duration) -> String {
    duration.as_millis().to_string()
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
