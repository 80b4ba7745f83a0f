//! The inbound run-request body (spec §4.6 step 3 "POST", §6
//! "POST?fnId=...").

use durable_core::{EventPayload, HashedId, MemoizedState};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackPayload {
    #[serde(default)]
    pub stack: Vec<HashedId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CtxPayload {
    pub run_id: String,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub stack: StackPayload,
    /// Optional per spec §6 (`disable_immediate_execution?`). Absent means
    /// the Executor hasn't opted in to early execution yet, so a fresh
    /// single-step discovery is reported back rather than run inline
    /// (spec §8 S1: one newly-discovered step on an empty `steps` map
    /// yields `steps-found`, not `step-ran`).
    #[serde(default = "default_disable_immediate_execution")]
    pub disable_immediate_execution: bool,
}

fn default_disable_immediate_execution() -> bool {
    true
}

/// Decoded from the Executor's POST body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDataPayload {
    pub event: EventPayload,
    #[serde(default)]
    pub events: Vec<EventPayload>,
    #[serde(default)]
    pub steps: MemoizedState,
    pub ctx: CtxPayload,
    /// `-1` means "let the SDK pick" (spec §4.6 step 3 "Version selection").
    #[serde(default = "default_version")]
    pub version: i32,
}

fn default_version() -> i32 {
    -1
}

/// Resolve the negotiated execution version: the caller's explicit
/// choice, or (when it opts out with `-1`) V2 when `optimizeParallelism`
/// is enabled, else V1 (spec §4.6 step 3).
pub fn resolve_version(requested: i32, optimize_parallelism: bool) -> i32 {
    if requested != -1 {
        return requested;
    }
    if optimize_parallelism {
        2
    } else {
        1
    }
}
