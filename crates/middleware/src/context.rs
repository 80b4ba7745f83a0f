//! Value types passed through middleware hooks (spec §4.4).

use durable_core::{EventPayload, StepDescriptor};
use serde_json::Value;

/// The mutable run-level context middleware may transform before the
/// handler starts (spec §4.4 `transformInput`). Mutations are applied in
/// place, matching the spec's "task-local-context references remain
/// valid" requirement: the engine holds this by value for the run's
/// duration and hands out shared references to it.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub event: EventPayload,
    pub events: Vec<EventPayload>,
    pub run_id: String,
    pub attempt: u32,
    pub extensions: std::collections::HashMap<String, Value>,
}

impl RunContext {
    pub fn new(event: EventPayload, run_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            events: vec![event.clone()],
            event,
            run_id: run_id.into(),
            attempt,
            extensions: std::collections::HashMap::new(),
        }
    }
}

/// Identifies a step for the `onStepStart`/`onStepComplete`/`onStepError`
/// and `wrapStep` hooks (spec §4.4).
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub descriptor: StepDescriptor,
}

/// A terminal outcome for a step, passed through `transformOutput`
/// (spec §4.4).
#[derive(Debug, Clone)]
pub enum StepOutput {
    Data(Value),
    Error(Value),
}
