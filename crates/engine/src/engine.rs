//! The core loop (spec §4.7): drives the user handler, harvests
//! discovered steps, picks the next action per `stepMode`, and emits an
//! `ExecutionResult`.

use crate::checkpoint::{CheckpointClient, CheckpointError, NewRunRequest};
use crate::retry::{extract_retry_after, is_non_retriable, is_rethrown_step_error};
use crate::state::{CheckpointSession, ExecutionState, StepHandle, StepSettlement};
use crate::tools::StepTools;
use durable_core::{
    normalize_undefined, Clock, EventPayload, ExecutionResult, FunctionConfig, HashedId,
    MemoizedState, OpCode, OutgoingOp, Retriable, Timing,
};
use durable_middleware::{MiddlewarePipeline, RunContext, StepInfo, StepOutput};
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// Invocation-level policy controlling whether steps run inline, and how
/// often results flush to the Executor (spec §4.7, GLOSSARY "Mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Async,
    Sync,
    AsyncCheckpointing,
}

/// A single inbound run request, decoded from the Executor's POST body
/// (spec §4.6 step 3, §6 "Function-data payload").
pub struct RunRequest {
    pub event: EventPayload,
    pub events: Vec<EventPayload>,
    pub memoized: MemoizedState,
    pub run_id: String,
    pub attempt: u32,
    pub requested_step: Option<HashedId>,
    pub disable_immediate_execution: bool,
    pub completion_order: Vec<HashedId>,
    pub function: FunctionConfig,
    pub mode: Mode,
    /// How many executed steps `Mode::AsyncCheckpointing` buffers before
    /// flushing via `checkpointStepsAsync` (spec §4.7 "AsyncCheckpointing"
    /// leaves the threshold up to the SDK).
    pub checkpoint_buffer_steps: u32,
}

/// Default `AsyncCheckpointing` flush threshold when the caller doesn't
/// configure one: flush after every executed step.
pub const DEFAULT_CHECKPOINT_BUFFER_STEPS: u32 = 1;

/// How many idle polling ticks without a newly-discovered step before the
/// engine concludes the handler is suspended on frozen/in-flight steps
/// and stops draining (spec §5 "up to ten tick-extensions").
const TICK_EXTENSIONS: u32 = 10;

pub struct Engine<C: Clock> {
    middleware: MiddlewarePipeline,
    clock: C,
    checkpoint_client: Option<Arc<dyn CheckpointClient>>,
}

impl<C: Clock> Engine<C> {
    pub fn new(middleware: MiddlewarePipeline, clock: C) -> Self {
        Self {
            middleware,
            clock,
            checkpoint_client: None,
        }
    }

    /// Attaches a real checkpoint client, making `Mode::Sync`'s
    /// `checkpointNewRun`/`checkpointSteps` RPCs and
    /// `Mode::AsyncCheckpointing`'s buffer flush actually reach the
    /// Executor (spec §4.7 "Checkpoint RPCs"). Without one, `Mode::Sync`
    /// rejects every batch (spec §7 kind 6: a Sync checkpoint failure
    /// propagates as a 500) and `AsyncCheckpointing` silently surrenders
    /// its buffer to the regular in-band Async reporting path.
    pub fn with_checkpoint_client(mut self, client: Arc<dyn CheckpointClient>) -> Self {
        self.checkpoint_client = Some(client);
        self
    }

    /// Runs one invocation to completion. `handler` receives the step
    /// tools and run context and returns the function's settled value.
    pub async fn execute<F, Fut>(&self, req: RunRequest, handler: F) -> ExecutionResult
    where
        F: FnOnce(StepTools, RunContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        let span = tracing::info_span!("run_request", run_id = %req.run_id, attempt = req.attempt);
        self.execute_inner(req, handler).instrument(span).await
    }

    async fn execute_inner<F, Fut>(&self, req: RunRequest, handler: F) -> ExecutionResult
    where
        F: FnOnce(StepTools, RunContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        let mut ctx = RunContext::new(req.event.clone(), req.run_id.clone(), req.attempt);
        if !req.events.is_empty() {
            ctx.events = req.events.clone();
        }

        if let Err(err) = self.middleware.transform_input(&mut ctx).await {
            let error = Value::String(err.to_string());
            let result = ExecutionResult::FunctionRejected {
                error,
                retriable: Retriable::Bool(false),
            };
            self.middleware.before_response(&result).await;
            return result;
        }

        let state = Arc::new(Mutex::new(ExecutionState::new(
            req.memoized.clone(),
            req.completion_order.clone(),
        )));
        self.middleware.before_memoization(&ctx).await;
        self.middleware.after_memoization(&ctx).await;
        self.middleware.before_execution(&ctx).await;

        let tools = StepTools::new(state.clone());
        let handler_ctx = ctx.clone();
        self.middleware.start_run(&ctx).await;
        let join = tokio::spawn(handler(tools, handler_ctx));

        self.drain_until_stable(&join, &state).await;
        self.middleware.after_execution(&ctx).await;

        // A specific requested step takes priority over every other
        // outcome: the Executor asked for it by hashed id, so resolve or
        // report it as missing regardless of whether the handler itself
        // has already settled (spec §4.7 "Loop consumption").
        let result = if let Some(requested) = &req.requested_step {
            let found = state.lock().find(requested);
            match found {
                Some(handle) => {
                    let op = self.execute_step(&state, handle, &req, &ctx).await;
                    ExecutionResult::StepRan { step: op }
                }
                None => ExecutionResult::StepNotFound {
                    step: requested.clone(),
                },
            }
        } else if join.is_finished() {
            self.finish_with_handler_result(join, &req, &state, &ctx).await
        } else {
            self.handle_discovered(&req, &state, &ctx).await
        };

        self.middleware.before_response(&result).await;
        result
    }

    async fn drain_until_stable(
        &self,
        join: &tokio::task::JoinHandle<Result<Value, Value>>,
        state: &Arc<Mutex<ExecutionState>>,
    ) {
        let mut previous = 0usize;
        let mut stable_ticks = 0u32;
        loop {
            tokio::task::yield_now().await;
            if join.is_finished() {
                return;
            }
            let count = state.lock().discovered.len();
            if count == previous {
                stable_ticks += 1;
                if stable_ticks >= TICK_EXTENSIONS {
                    return;
                }
            } else {
                stable_ticks = 0;
                previous = count;
            }
        }
    }

    async fn finish_with_handler_result(
        &self,
        join: tokio::task::JoinHandle<Result<Value, Value>>,
        req: &RunRequest,
        state: &Arc<Mutex<ExecutionState>>,
        ctx: &RunContext,
    ) -> ExecutionResult {
        // Flush any steps discovered but not yet reported (e.g. the losing
        // branches of a race that settled after the winner resolved the
        // handler) before declaring the run complete (spec §4.7).
        let unreported = state.lock().new_step_handles();
        if !unreported.is_empty() {
            return ExecutionResult::StepsFound {
                steps: self.report(state, &unreported),
            };
        }

        if req.mode == Mode::AsyncCheckpointing {
            self.flush_checkpoint_buffer(req, state).await;
        }

        match join.await {
            Ok(Ok(value)) => {
                let data = normalize_undefined(value);
                self.middleware.complete_run(ctx, &data).await;
                ExecutionResult::FunctionResolved { data }
            }
            Ok(Err(err)) => self.function_rejected(err, req, state).await,
            Err(_panic) => {
                let err = crate::retry::non_retriable_error("handler task failed unexpectedly");
                self.function_rejected(err, req, state).await
            }
        }
    }

    async fn function_rejected(
        &self,
        err: Value,
        req: &RunRequest,
        state: &Arc<Mutex<ExecutionState>>,
    ) -> ExecutionResult {
        let is_final = req.attempt + 1 >= req.function.max_attempts();
        let recent = state.lock().recent_step_error.clone();
        let non_retriable = is_non_retriable(&err) || is_rethrown_step_error(&err, recent.as_ref());
        let retry_after = extract_retry_after(&err);

        let retriable = if let Some(ra) = retry_after {
            Retriable::After(ra)
        } else if non_retriable {
            Retriable::Bool(false)
        } else {
            Retriable::Bool(!is_final)
        };

        self.middleware
            .on_run_error(&err, !retriable.is_retriable())
            .await;

        ExecutionResult::FunctionRejected {
            error: normalize_undefined(err),
            retriable,
        }
    }

    async fn handle_discovered(
        &self,
        req: &RunRequest,
        state: &Arc<Mutex<ExecutionState>>,
        ctx: &RunContext,
    ) -> ExecutionResult {
        let new_handles = state.lock().new_step_handles();

        if new_handles.is_empty() {
            return ExecutionResult::StepsFound { steps: vec![] };
        }

        let all_planned = state.lock().all_planned(&new_handles);
        let early_exec_allowed =
            !req.disable_immediate_execution && new_handles.len() == 1 && all_planned;

        match req.mode {
            Mode::Async if early_exec_allowed => {
                let op = self.execute_step(state, new_handles[0], req, ctx).await;
                ExecutionResult::StepRan { step: op }
            }
            Mode::AsyncCheckpointing if early_exec_allowed => {
                let op = self.execute_step(state, new_handles[0], req, ctx).await;
                self.buffer_checkpoint_step(req, state, op.clone()).await;
                ExecutionResult::StepRan { step: op }
            }
            Mode::Sync => self.run_sync_batch(state, &new_handles, req, ctx).await,
            _ => ExecutionResult::StepsFound {
                steps: self.report(state, &new_handles),
            },
        }
    }

    async fn run_sync_batch(
        &self,
        state: &Arc<Mutex<ExecutionState>>,
        handles: &[StepHandle],
        req: &RunRequest,
        ctx: &RunContext,
    ) -> ExecutionResult {
        let mut ran = Vec::new();
        for &handle in handles {
            let op_code = state.lock().step(handle).descriptor.op;
            if op_code != OpCode::StepPlanned {
                if !ran.is_empty() {
                    if let Err(err) = self.checkpoint_partial_batch(req, state, &ran).await {
                        return self.sync_checkpoint_rejected(err);
                    }
                }
                return ExecutionResult::ChangeMode {
                    to: "async".to_string(),
                    token: ctx.run_id.clone(),
                };
            }

            let op = self.execute_step(state, handle, req, ctx).await;
            let failed = op.op == OpCode::StepFailed;
            ran.push(op);
            if failed {
                if let Err(err) = self.checkpoint_partial_batch(req, state, &ran).await {
                    return self.sync_checkpoint_rejected(err);
                }
                return ExecutionResult::ChangeMode {
                    to: "async".to_string(),
                    token: ctx.run_id.clone(),
                };
            }
        }
        if let Err(err) = self.checkpoint_partial_batch(req, state, &ran).await {
            return self.sync_checkpoint_rejected(err);
        }
        ExecutionResult::StepsFound { steps: ran }
    }

    /// A checkpoint RPC failure in Sync mode propagates as a rejected run
    /// (spec §7 kind 6: "In Sync mode this propagates as a 500").
    fn sync_checkpoint_rejected(&self, err: CheckpointError) -> ExecutionResult {
        ExecutionResult::FunctionRejected {
            error: Value::String(err.to_string()),
            retriable: Retriable::Bool(true),
        }
    }

    /// Establishes or extends the Sync checkpoint for this run
    /// (`checkpointNewRun` once, `checkpointSteps` after). A no-op when no
    /// checkpoint client is configured, so `Mode::Sync` remains usable in
    /// tests that never wire one.
    async fn checkpoint_partial_batch(
        &self,
        req: &RunRequest,
        state: &Arc<Mutex<ExecutionState>>,
        ran: &[OutgoingOp],
    ) -> Result<(), CheckpointError> {
        let Some(client) = self.checkpoint_client.as_deref() else {
            return Ok(());
        };
        let session = state.lock().checkpoint_session.clone();
        match session {
            None => {
                let resp = client
                    .checkpoint_new_run(NewRunRequest {
                        run_id: &req.run_id,
                        event: &req.event,
                        steps: ran,
                        execution_version: 2,
                        retries: req.function.clamped_retries(),
                    })
                    .await?;
                state.lock().checkpoint_session = Some(CheckpointSession {
                    app_id: resp.app_id,
                    fn_id: resp.fn_id,
                    token: resp.token,
                });
                Ok(())
            }
            Some(session) => {
                client
                    .checkpoint_steps(&session.app_id, &session.fn_id, &req.run_id, ran)
                    .await
            }
        }
    }

    /// Buffers a step executed under `Mode::AsyncCheckpointing` and
    /// flushes once the buffer reaches `req.checkpoint_buffer_steps`
    /// (spec §4.7 "AsyncCheckpointing").
    async fn buffer_checkpoint_step(
        &self,
        req: &RunRequest,
        state: &Arc<Mutex<ExecutionState>>,
        op: OutgoingOp,
    ) {
        let should_flush = {
            let mut st = state.lock();
            st.checkpoint_buffer.push(op);
            st.checkpoint_buffer.len() as u32 >= req.checkpoint_buffer_steps.max(1)
        };
        if should_flush {
            self.flush_checkpoint_buffer(req, state).await;
        }
    }

    /// Flushes the `AsyncCheckpointing` buffer via `checkpointStepsAsync`.
    /// On failure, the buffered steps are left to ride along in the next
    /// in-band response instead — the degradation spec §7 kind 6 expects
    /// from an unreachable checkpoint endpoint.
    async fn flush_checkpoint_buffer(&self, req: &RunRequest, state: &Arc<Mutex<ExecutionState>>) {
        let Some(client) = self.checkpoint_client.as_deref() else {
            return;
        };
        let buffered = {
            let mut st = state.lock();
            std::mem::take(&mut st.checkpoint_buffer)
        };
        if buffered.is_empty() {
            return;
        }
        if let Err(err) = client
            .checkpoint_steps_async(&req.run_id, req.function.id.as_str(), &req.run_id, &buffered)
            .await
        {
            tracing::warn!(
                run_id = %req.run_id,
                %err,
                "checkpoint buffer flush failed, surrendering to in-band reporting",
            );
            state.lock().checkpoint_buffer = buffered;
        }
    }

    fn report(&self, state: &Arc<Mutex<ExecutionState>>, handles: &[StepHandle]) -> Vec<OutgoingOp> {
        let st = state.lock();
        handles
            .iter()
            .map(|&h| {
                let descriptor = &st.step(h).descriptor;
                OutgoingOp {
                    id: descriptor.hashed_id.clone(),
                    op: descriptor.op,
                    name: descriptor.name.clone(),
                    display_name: Some(descriptor.display_name.clone()),
                    opts: Some(descriptor.opts.clone()),
                    data: Value::Null,
                    error: None,
                    userland: Some(descriptor.id.clone()),
                    timing: None,
                }
            })
            .collect()
    }

    async fn execute_step(
        &self,
        state: &Arc<Mutex<ExecutionState>>,
        handle: StepHandle,
        req: &RunRequest,
        _ctx: &RunContext,
    ) -> OutgoingOp {
        let descriptor = {
            let mut st = state.lock();
            st.executing_step = true;
            st.step(handle).descriptor.clone()
        };
        let (handler, effective_input) = state.lock().take_handler(handle);

        let step_info = StepInfo {
            descriptor: descriptor.clone(),
        };
        self.middleware.start_step(&step_info).await;

        let span = tracing::info_span!("step", step_id = %descriptor.id, op = ?descriptor.op);
        let start_ms = self.clock.epoch_ms();
        let start_iso = self.clock.now_iso8601();
        let outcome: Result<Value, Value> = match handler {
            Some(h) => h(effective_input).instrument(span).await,
            None => Ok(Value::Null),
        };
        let end_ms = self.clock.epoch_ms();
        let end_iso = self.clock.now_iso8601();

        let output = match outcome {
            Ok(v) => StepOutput::Data(v),
            Err(e) => StepOutput::Error(e),
        };
        let settled = self.middleware.transform_step_output(output).await;

        let is_final_attempt = req.attempt + 1 >= req.function.max_attempts();
        let (op_code, data, error, notify_final) = match &settled {
            StepOutput::Data(v) => (OpCode::StepRun, normalize_undefined(v.clone()), None, false),
            StepOutput::Error(e) => {
                let wrapped = crate::retry::step_error(&descriptor.id, e.clone());
                let non_retriable = is_non_retriable(e);
                let terminal = non_retriable || is_final_attempt;
                let op_code = if terminal {
                    OpCode::StepFailed
                } else {
                    OpCode::StepError
                };
                (op_code, Value::Null, Some(wrapped), terminal)
            }
        };
        self.middleware
            .notify_step_settled(&step_info, &settled, notify_final)
            .await;

        {
            let mut st = state.lock();
            st.executing_step = false;
            let settlement = match &error {
                Some(e) => StepSettlement::Error(e.clone()),
                None => StepSettlement::Data(data.clone()),
            };
            if error.is_some() {
                st.recent_step_error = error.clone();
            }
            st.settle(handle, settlement);
        }

        // Give the handler task another chance to progress past this
        // newly-resolved await before the caller decides what's next.
        for _ in 0..TICK_EXTENSIONS {
            tokio::task::yield_now().await;
        }

        OutgoingOp {
            id: descriptor.hashed_id.clone(),
            op: op_code,
            name: descriptor.name.clone(),
            display_name: Some(descriptor.display_name.clone()),
            opts: Some(descriptor.opts.clone()),
            data,
            error,
            userland: Some(descriptor.id.clone()),
            timing: Some(Timing {
                start: start_iso,
                end: end_iso,
                duration_ms: end_ms.saturating_sub(start_ms),
            }),
        }
    }
}

/// Reports a completed Sync checkpoint, establishing the run's first
/// token the way the Executor's `checkpointNewRun` RPC requires (spec
/// §4.7). Split out from `Engine` so it only depends on a
/// `CheckpointClient`, not the engine's internal state types.
pub async fn checkpoint_new_run(
    client: &dyn CheckpointClient,
    run_id: &str,
    event: &EventPayload,
    steps: &[OutgoingOp],
    retries: u32,
) -> Result<String, crate::checkpoint::CheckpointError> {
    let resp = client
        .checkpoint_new_run(NewRunRequest {
            run_id,
            event,
            steps,
            execution_version: 2,
            retries,
        })
        .await?;
    Ok(resp.token)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
