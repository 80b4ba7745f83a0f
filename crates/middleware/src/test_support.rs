//! Test doubles for other crates' tests, mirroring the teacher's
//! `test-support`-gated fakes in its adapter crates.

use crate::context::{RunContext, StepInfo, StepOutput};
use crate::middleware_trait::Middleware;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every hook call (by name) in invocation order, so tests can
/// assert on pipeline ordering without a real side-effecting middleware.
#[derive(Default, Clone)]
pub struct RecordingMiddleware {
    pub label: String,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingMiddleware {
    pub fn new(label: impl Into<String>, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label: label.into(),
            calls,
        }
    }

    fn record(&self, hook: &str) {
        self.calls.lock().push(format!("{}:{}", self.label, hook));
    }
}

#[async_trait]
impl Middleware for RecordingMiddleware {
    fn name(&self) -> &str {
        &self.label
    }

    async fn transform_input(
        &self,
        _ctx: &mut RunContext,
    ) -> Result<(), crate::error::MiddlewareError> {
        self.record("transform_input");
        Ok(())
    }

    async fn on_run_start(&self, _ctx: &RunContext) {
        self.record("on_run_start");
    }

    async fn on_run_complete(&self, _ctx: &RunContext, _data: &serde_json::Value) {
        self.record("on_run_complete");
    }

    async fn on_step_start(&self, _step: &StepInfo) {
        self.record("on_step_start");
    }

    async fn transform_output(&self, output: StepOutput) -> StepOutput {
        self.record("transform_output");
        output
    }

    async fn on_step_complete(&self, _step: &StepInfo, _data: &serde_json::Value) {
        self.record("on_step_complete");
    }

    async fn on_step_error(&self, _step: &StepInfo, _err: &serde_json::Value, _is_final: bool) {
        self.record("on_step_error");
    }
}
