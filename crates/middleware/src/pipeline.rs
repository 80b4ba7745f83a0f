//! The ordered middleware chain (spec §4.4): client-level middleware
//! first, then function-level, each hook invoked in registration order
//! (and in reverse for the step-completion/error hooks, to preserve
//! onion semantics without a literal `next()` closure — see the trait
//! doc comment).

use crate::context::{RunContext, StepInfo, StepOutput};
use crate::error::MiddlewareError;
use crate::middleware_trait::Middleware;
use durable_core::ExecutionResult;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    chain: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self { chain: Vec::new() }
    }

    /// Register a middleware. Call in the order it should run:
    /// client-level instances first, then function-level (spec §4.4).
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.chain.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub async fn transform_input(&self, ctx: &mut RunContext) -> Result<(), MiddlewareError> {
        for mw in &self.chain {
            mw.transform_input(ctx).await?;
        }
        Ok(())
    }

    pub async fn before_memoization(&self, ctx: &RunContext) {
        for mw in &self.chain {
            mw.before_memoization(ctx).await;
        }
    }

    pub async fn after_memoization(&self, ctx: &RunContext) {
        for mw in &self.chain {
            mw.after_memoization(ctx).await;
        }
    }

    pub async fn before_execution(&self, ctx: &RunContext) {
        for mw in &self.chain {
            mw.before_execution(ctx).await;
        }
    }

    pub async fn after_execution(&self, ctx: &RunContext) {
        for mw in &self.chain {
            mw.after_execution(ctx).await;
        }
    }

    pub async fn before_response(&self, result: &ExecutionResult) {
        for mw in &self.chain {
            mw.before_response(result).await;
        }
    }

    /// `wrapRun` entry: fires `on_run_start` in registration order.
    pub async fn start_run(&self, ctx: &RunContext) {
        for mw in &self.chain {
            mw.on_run_start(ctx).await;
        }
    }

    /// `wrapRun` exit on the success path, in reverse order (mirrors
    /// `notify_step_settled`'s onion semantics).
    pub async fn complete_run(&self, ctx: &RunContext, data: &Value) {
        for mw in self.chain.iter().rev() {
            mw.on_run_complete(ctx, data).await;
        }
    }

    /// `wrapStep` entry: fires `on_step_start` in registration order.
    pub async fn start_step(&self, step: &StepInfo) {
        for mw in &self.chain {
            mw.on_step_start(step).await;
        }
    }

    /// Runs `transform_output` over the chain in registration order. The
    /// caller inspects the transformed value to compute the real
    /// terminal-ness of an error (non-retriable vs. attempts exhausted)
    /// before calling [`Self::notify_step_settled`], since that
    /// classification depends on the post-transform error payload.
    pub async fn transform_step_output(&self, mut output: StepOutput) -> StepOutput {
        for mw in &self.chain {
            output = mw.transform_output(output).await;
        }
        output
    }

    /// Notifies completion/error hooks in *reverse* order (innermost
    /// middleware observes the step result first, matching onion-wrap
    /// semantics where the last-registered middleware is closest to the
    /// step body). `is_final` reflects whether this error is terminal
    /// (non-retriable, or the run's last attempt) — always `false` for a
    /// successful step.
    pub async fn notify_step_settled(&self, step: &StepInfo, output: &StepOutput, is_final: bool) {
        for mw in self.chain.iter().rev() {
            match output {
                StepOutput::Data(data) => mw.on_step_complete(step, data).await,
                StepOutput::Error(err) => mw.on_step_error(step, err, is_final).await,
            }
        }
    }

    pub async fn on_run_error(&self, err: &Value, is_final: bool) {
        for mw in self.chain.iter().rev() {
            mw.on_run_error(err, is_final).await;
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
