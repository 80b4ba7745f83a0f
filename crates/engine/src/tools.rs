//! Step tools (spec §4.2): the fixed API surface handed to user code.
//! Every call synchronously produces a descriptor and returns a future
//! the engine resolves from memoized state or leaves frozen.

use crate::group::current_parallel_mode;
use crate::state::{ExecutionState, StepFuture, StepHandler};
use futures::future::BoxFuture;
use durable_core::duration::{parse_instant, parse_sleep, SleepInput};
use durable_core::{sleep_name, CoreError, EventPayload, OpCode, StepMode, StepOpts};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct WaitForEventOpts {
    pub event: String,
    pub timeout_ms: u64,
    pub match_expr: Option<String>,
    pub if_expr: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Replace,
    Fail,
}

#[derive(Debug, Clone)]
pub struct WaitForSignalOpts {
    pub signal: String,
    pub timeout_ms: u64,
    pub on_conflict: OnConflict,
}

#[derive(Debug, Clone)]
pub struct InvokeOpts {
    pub function_id: String,
    pub data: Option<Value>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AiInferOpts {
    pub model: String,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct FetchOpts {
    pub url: String,
    pub method: String,
    pub headers: std::collections::BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// The step-tools surface handed to a single run's handler. Cheap to
/// clone — it only carries a shared handle to the execution state.
#[derive(Clone)]
pub struct StepTools {
    state: Arc<Mutex<ExecutionState>>,
}

impl StepTools {
    pub(crate) fn new(state: Arc<Mutex<ExecutionState>>) -> Self {
        Self { state }
    }

    fn discover(
        &self,
        userland_id: &str,
        op: OpCode,
        mode: StepMode,
        mut opts: StepOpts,
        name: Option<String>,
        input: Option<Value>,
        handler: Option<StepHandler>,
    ) -> StepFuture {
        let mut state = self.state.lock();
        if state.executing_step {
            tracing::warn!(id = %userland_id, "nested step tool call (advisory only)");
        }
        if opts.parallel_mode.is_none() {
            opts.parallel_mode = current_parallel_mode();
        }
        let resolved = state.resolve_id(userland_id);
        let mut descriptor = durable_core::StepDescriptor::new(
            resolved.final_id,
            resolved.hashed,
            op,
            mode,
        )
        .with_opts(opts);
        if let Some(name) = name {
            descriptor = descriptor.with_name(name);
        }
        if let Some(input) = input {
            descriptor = descriptor.with_input(input);
        }
        state.push(descriptor, handler)
    }

    /// `step.run(id, fn, ...input)`: handler body runs only when the
    /// engine chooses to execute it inline. The handler receives the
    /// step's effective input — `input` on a fresh discovery, or the
    /// Executor's recorded `memo.input` when replaying an interrupted
    /// attempt (spec §4.2 "Input replay for run").
    pub fn run<F, Fut>(&self, id: &str, input: Option<Value>, handler: F) -> StepFuture
    where
        F: FnOnce(Option<Value>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Value, Value>> + Send + 'static,
    {
        let boxed: StepHandler =
            Box::new(move |effective_input| Box::pin(handler(effective_input)) as BoxFuture<'static, Result<Value, Value>>);
        self.discover(
            id,
            OpCode::StepPlanned,
            StepMode::Sync,
            StepOpts::default(),
            None,
            input,
            Some(boxed),
        )
    }

    /// `step.sleep(id, duration)`.
    pub fn sleep(&self, id: &str, duration: impl Into<SleepInput>) -> Result<StepFuture, CoreError> {
        let duration = parse_sleep(&duration.into())?;
        let name = sleep_name(duration);
        Ok(self.discover(
            id,
            OpCode::Sleep,
            StepMode::Async,
            StepOpts::default(),
            Some(name),
            None,
            None,
        ))
    }

    /// `step.sleepUntil(id, time)`.
    pub fn sleep_until(&self, id: &str, instant: &str) -> Result<StepFuture, CoreError> {
        parse_instant(instant)?;
        Ok(self.discover(
            id,
            OpCode::Sleep,
            StepMode::Async,
            StepOpts::default(),
            Some(instant.to_string()),
            None,
            None,
        ))
    }

    /// `step.waitForEvent(id, {event, timeout, match?|if?})`.
    pub fn wait_for_event(&self, id: &str, opts: WaitForEventOpts) -> Result<StepFuture, CoreError> {
        if opts.match_expr.is_some() && opts.if_expr.is_some() {
            return Err(CoreError::ConflictingMatchAndIf);
        }
        let if_expr = opts.if_expr.clone().or_else(|| {
            opts.match_expr
                .as_ref()
                .map(|field| format!("event.{field} == async.{field}"))
        });
        let step_opts = StepOpts {
            timeout: Some(opts.timeout_ms),
            if_expr,
            ..StepOpts::default()
        };
        Ok(self.discover(
            id,
            OpCode::WaitForEvent,
            StepMode::Async,
            step_opts,
            Some(opts.event),
            None,
            None,
        ))
    }

    /// `step.waitForSignal(id, {signal, timeout, onConflict})`.
    pub fn wait_for_signal(&self, id: &str, opts: WaitForSignalOpts) -> StepFuture {
        let step_opts = StepOpts {
            timeout: Some(opts.timeout_ms),
            kind: Some(match opts.on_conflict {
                OnConflict::Replace => "replace".to_string(),
                OnConflict::Fail => "fail".to_string(),
            }),
            ..StepOpts::default()
        };
        self.discover(
            id,
            OpCode::WaitForSignal,
            StepMode::Async,
            step_opts,
            Some(opts.signal),
            None,
            None,
        )
    }

    /// `step.sendEvent(id, payload)`: one event or a batch.
    pub fn send_event(&self, id: &str, payload: Vec<EventPayload>) -> StepFuture {
        let input = serde_json::to_value(&payload).unwrap_or(Value::Null);
        let boxed: StepHandler = Box::new(move |_input| Box::pin(async move { Ok(Value::Null) }) as BoxFuture<'static, Result<Value, Value>>);
        self.discover(
            id,
            OpCode::StepPlanned,
            StepMode::Sync,
            StepOpts::default(),
            None,
            Some(input),
            Some(boxed),
        )
    }

    /// `step.sendSignal(id, {signal, data?})`.
    pub fn send_signal(&self, id: &str, signal: &str, data: Option<Value>) -> StepFuture {
        let input = json!({ "signal": signal, "data": data });
        let boxed: StepHandler = Box::new(move |_input| Box::pin(async move { Ok(Value::Null) }) as BoxFuture<'static, Result<Value, Value>>);
        self.discover(
            id,
            OpCode::StepPlanned,
            StepMode::Sync,
            StepOpts::default(),
            None,
            Some(input),
            Some(boxed),
        )
    }

    /// `step.invoke(id, {function, data?, timeout?})`.
    pub fn invoke(&self, id: &str, opts: InvokeOpts) -> StepFuture {
        let step_opts = StepOpts {
            timeout: opts.timeout_ms,
            ..StepOpts::default()
        };
        self.discover(
            id,
            OpCode::InvokeFunction,
            StepMode::Async,
            step_opts,
            Some(opts.function_id),
            opts.data,
            None,
        )
    }

    /// `step.ai.infer(id, {model, body})`.
    pub fn ai_infer(&self, id: &str, opts: AiInferOpts) -> StepFuture {
        self.discover(
            id,
            OpCode::AiGateway,
            StepMode::Async,
            StepOpts::default(),
            Some(opts.model),
            Some(opts.body),
            None,
        )
    }

    /// `step.ai.wrap(id, fn, ...input)`.
    pub fn ai_wrap<F, Fut>(&self, id: &str, input: Option<Value>, handler: F) -> StepFuture
    where
        F: FnOnce(Option<Value>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Value, Value>> + Send + 'static,
    {
        let boxed: StepHandler =
            Box::new(move |effective_input| Box::pin(handler(effective_input)) as BoxFuture<'static, Result<Value, Value>>);
        let opts = StepOpts {
            kind: Some("step.ai.wrap".to_string()),
            ..StepOpts::default()
        };
        self.discover(
            id,
            OpCode::StepPlanned,
            StepMode::Sync,
            opts,
            None,
            input,
            Some(boxed),
        )
    }

    /// `step.realtime.publish(id, {channel, topic, data})`.
    pub fn realtime_publish(&self, id: &str, channel: &str, topic: &str, data: Value) -> StepFuture {
        let input = json!({ "channel": channel, "topic": topic, "data": data });
        let boxed: StepHandler = Box::new(move |_input| Box::pin(async move { Ok(Value::Null) }) as BoxFuture<'static, Result<Value, Value>>);
        self.discover(
            id,
            OpCode::StepPlanned,
            StepMode::Sync,
            StepOpts::default(),
            None,
            Some(input),
            Some(boxed),
        )
    }

    /// `step.fetch(input, init?)`: durable HTTP. Falls back to a direct
    /// (non-durable) request when called while another step is already
    /// executing (spec §4.8 "no nested durability").
    pub fn fetch(&self, id: &str, opts: FetchOpts) -> StepFuture {
        if self.state.lock().executing_step {
            let boxed: StepHandler = Box::new(move |_input| {
                Box::pin(direct_fetch(opts)) as BoxFuture<'static, Result<Value, Value>>
            });
            return self.discover(
                id,
                OpCode::StepPlanned,
                StepMode::Sync,
                StepOpts::default(),
                None,
                None,
                Some(boxed),
            );
        }
        let step_opts = StepOpts {
            url: Some(opts.url),
            method: Some(opts.method),
            headers: Some(opts.headers),
            body: opts.body,
            ..StepOpts::default()
        };
        self.discover(
            id,
            OpCode::Gateway,
            StepMode::Async,
            step_opts,
            None,
            None,
            None,
        )
    }
}

/// The non-durable fallback `fetch` delegates to when called from inside
/// an already-executing step (spec §4.8 "no nested durability" — the
/// request is issued directly against the target, not the Executor's
/// AI-gateway endpoint).
async fn direct_fetch(opts: FetchOpts) -> Result<Value, Value> {
    let client = reqwest::Client::new();
    let method = opts
        .method
        .parse::<reqwest::Method>()
        .unwrap_or(reqwest::Method::GET);
    let mut builder = client.request(method, &opts.url);
    for (name, value) in &opts.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = &opts.body {
        builder = builder.json(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| json!({ "name": "FetchError", "message": e.to_string() }))?;

    let status = response.status().as_u16();
    let headers: serde_json::Map<String, Value> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                json!(value.to_str().unwrap_or_default()),
            )
        })
        .collect();
    let text = response
        .text()
        .await
        .map_err(|e| json!({ "name": "FetchError", "message": e.to_string() }))?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    Ok(json!({ "status": status, "headers": Value::Object(headers), "body": body }))
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
