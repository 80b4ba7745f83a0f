//! The `Middleware` trait (spec §4.4).
//!
//! Every hook is optional: a middleware implements only the ones it
//! cares about and inherits no-op defaults for the rest, the same shape
//! as the teacher's small per-concern adapter traits (one method per
//! side-effect, defaults where a no-op is a sensible default).

use crate::context::{RunContext, StepInfo, StepOutput};
use crate::error::MiddlewareError;
use async_trait::async_trait;
use durable_core::ExecutionResult;
use serde_json::Value;

#[async_trait]
pub trait Middleware: Send + Sync {
    /// A short name used in tracing spans and error messages.
    fn name(&self) -> &str {
        "middleware"
    }

    /// May replace `event`/`events`/extensions in place before step
    /// discovery begins (spec §4.4 `transformInput`).
    async fn transform_input(&self, _ctx: &mut RunContext) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Fires once all memoized state has been consumed on the first tick.
    async fn before_memoization(&self, _ctx: &RunContext) {}
    async fn after_memoization(&self, _ctx: &RunContext) {}

    async fn before_execution(&self, _ctx: &RunContext) {}
    async fn after_execution(&self, _ctx: &RunContext) {}

    /// Around-run hook (spec §4.4 `wrapRun`, the outer wrap of the entire
    /// user handler). Expressed the same way as `wrapStep` below: paired
    /// before/after calls instead of a literal closure-wrapping `next()`.
    /// `on_run_start` fires in registration order right before the
    /// handler task is spawned; `on_run_complete` fires once it resolves
    /// successfully. A rejection is reported through `on_run_error`
    /// instead, which already carries the finality the success path
    /// doesn't need.
    async fn on_run_start(&self, _ctx: &RunContext) {}
    async fn on_run_complete(&self, _ctx: &RunContext, _data: &Value) {}

    /// Fires once immediately before the `ExecutionResult` is serialized.
    async fn before_response(&self, _result: &ExecutionResult) {}

    /// Around-step hook (spec §4.4 `wrapStep`). Expressed as paired
    /// before/after calls across the pipeline rather than a literal
    /// closure-wrapping `next()`, per the onion-to-arena note in spec §9:
    /// `on_step_start` fires in registration order, `on_step_complete`/
    /// `on_step_error` fire in reverse order once the step settles.
    async fn on_step_start(&self, _step: &StepInfo) {}
    async fn on_step_complete(&self, _step: &StepInfo, _data: &Value) {}
    async fn on_step_error(&self, _step: &StepInfo, _err: &Value, _is_final: bool) {}

    /// May transform a step's settled value before it is handed to the
    /// user future or memoized (spec §4.4 `transformOutput`).
    async fn transform_output(&self, output: StepOutput) -> StepOutput {
        output
    }

    /// Run-level error hook (spec §7): fired once, after all step-level
    /// `on_step_error` calls, when the user handler itself rejects.
    async fn on_run_error(&self, _err: &Value, _is_final: bool) {}
}

/// A middleware that implements nothing — useful as a pipeline base or
/// a placeholder in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMiddleware;

impl Middleware for NoopMiddleware {}

#[cfg(test)]
#[path = "middleware_trait_tests.rs"]
mod tests;
