//! Framework-agnostic per-request dispatcher (spec §4.6): GET
//! introspection, PUT registration, POST run-request.

use std::sync::Arc;

use durable_core::{Clock, ExecutionResult, FunctionConfig, HashedId, Retriable, RetryAfter};
use durable_engine::{Engine, RunRequest, StepTools};
use durable_middleware::{MiddlewarePipeline, RunContext};
use futures::future::BoxFuture;
use serde_json::{json, Value};

use crate::adapter::{HostAdapter, HostResponse};
use crate::error::CommError;
use crate::options::{Mode as EnvMode, Options};
use crate::registration::{self, DevServerProbeCache};
use crate::run_request::{resolve_version, FunctionDataPayload};
use crate::signing;

pub type HandlerFn =
    Arc<dyn Fn(StepTools, RunContext) -> BoxFuture<'static, Result<Value, Value>> + Send + Sync>;

/// A function plus the closure that runs its handler body (spec §3
/// "Function definition" + the engine's `handler` callback).
pub struct RegisteredFunction {
    pub config: FunctionConfig,
    pub handler: HandlerFn,
}

/// Ties a [`durable_engine::Engine`] to a function registry and the
/// signing/registration machinery that turns raw HTTP requests into
/// engine invocations (spec §4.6).
pub struct CommHandler<C: Clock> {
    engine: Engine<C>,
    functions: Vec<RegisteredFunction>,
    options: Options,
    http_client: reqwest::Client,
    dev_probe: DevServerProbeCache,
    app_id: String,
    app_name: String,
}

impl<C: Clock> CommHandler<C> {
    pub fn new(
        clock: C,
        middleware: MiddlewarePipeline,
        functions: Vec<RegisteredFunction>,
        options: Options,
        app_id: impl Into<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            engine: Engine::new(middleware, clock),
            functions,
            options,
            http_client: reqwest::Client::new(),
            dev_probe: DevServerProbeCache::new(),
            app_id: app_id.into(),
            app_name: app_name.into(),
        }
    }

    pub async fn handle(&self, adapter: &dyn HostAdapter, now_secs: i64) -> HostResponse {
        let mut options = self.options.clone();
        options.upsert_from_env(&adapter.env());
        let mode = options.resolve_mode(adapter.is_production());

        match adapter.method().to_ascii_uppercase().as_str() {
            "GET" => self.handle_get(adapter, &options, mode, now_secs),
            "PUT" => self.handle_put(adapter, &options).await,
            "POST" => self.handle_post(adapter, &options, mode, now_secs).await,
            other => HostResponse::json(
                405,
                json!({"type": "internal", "name": "MethodNotAllowed", "message": other}),
            ),
        }
    }

    fn handle_get(
        &self,
        adapter: &dyn HostAdapter,
        options: &Options,
        mode: EnvMode,
        now_secs: i64,
    ) -> HostResponse {
        let auth_succeeded = adapter.header("x-inngest-signature").map(|header| {
            options
                .signing_key
                .as_deref()
                .map(|key| {
                    signing::verify(
                        header,
                        adapter.body(),
                        key,
                        options.signing_key_fallback.as_deref(),
                        now_secs,
                        mode == EnvMode::Dev,
                    )
                    .is_ok()
                })
                .unwrap_or(false)
        });

        let mut body = json!({
            "authentication_succeeded": auth_succeeded,
            "mode": if mode == EnvMode::Cloud { "cloud" } else { "dev" },
            "has_event_key": options.event_key.is_some(),
            "has_signing_key": options.signing_key.is_some(),
            "function_count": self.functions.len(),
            "schema_version": "2024-05-24",
        });

        if mode == EnvMode::Cloud && auth_succeeded == Some(true) {
            // `body` is built as a `json!({...})` object literal a few lines
            // above, so it is always `Value::Object`.
            #[allow(clippy::expect_used)]
            let extra = body.as_object_mut().expect("object literal");
            extra.insert("sdk_version".into(), json!(env!("CARGO_PKG_VERSION")));
            extra.insert("framework".into(), json!("durable-comm"));
            extra.insert("app_id".into(), json!(self.app_id));
            extra.insert("api_origin".into(), json!(options.api_base_url));
            extra.insert("event_api_origin".into(), json!(options.event_api_base_url));
            extra.insert(
                "serve_origin".into(),
                json!(options.serve_host.clone().unwrap_or_default()),
            );
            extra.insert(
                "serve_path".into(),
                json!(options.serve_path.clone().unwrap_or_default()),
            );
            extra.insert("capabilities".into(), json!({"trust_probe": "v1"}));
            extra.insert(
                "is_streaming".into(),
                json!(!matches!(options.streaming, crate::options::Streaming::Off)),
            );
        }

        HostResponse::json(200, body)
    }

    async fn handle_put(&self, adapter: &dyn HostAdapter, options: &Options) -> HostResponse {
        let serve_url = adapter.url().to_string();
        let probe = matches!(options.dev_mode_override, None | Some(true));
        let configs: Vec<FunctionConfig> = self.functions.iter().map(|f| f.config.clone()).collect();

        let result = registration::register(
            &self.http_client,
            &options.base_url,
            probe.then_some(&self.dev_probe),
            &serve_url,
            &self.app_name,
            &configs,
            adapter.query_param("deployId").map(str::to_string),
        )
        .await;

        match result {
            Ok(resp) => HostResponse::json(
                resp.status,
                json!({"status": resp.status, "skipped": resp.skipped, "modified": resp.modified, "error": resp.error}),
            ),
            Err(err) => HostResponse::json(500, json!({"message": err.to_string(), "modified": false})),
        }
    }

    async fn handle_post(
        &self,
        adapter: &dyn HostAdapter,
        options: &Options,
        mode: EnvMode,
        now_secs: i64,
    ) -> HostResponse {
        if adapter.query_param("probe").map(str::to_string).as_deref() == Some("trust") {
            match self.validate_signature(adapter, options, mode, now_secs) {
                Ok(_) => return HostResponse::empty(200),
                Err(err) => return unauthorized(err),
            }
        }

        if let Err(err) = self.validate_signature(adapter, options, mode, now_secs) {
            return unauthorized(err);
        }

        let Some(fn_id) = adapter.query_param("fnId") else {
            return HostResponse::json(
                400,
                json!({"type": "internal", "name": "ValidationError", "message": "missing fnId"}),
            );
        };

        let Some(registered) = self.functions.iter().find(|f| f.config.id.as_str() == fn_id) else {
            return HostResponse::json(
                400,
                json!({"type": "internal", "name": "UnknownFunction", "message": fn_id}),
            );
        };

        let payload: FunctionDataPayload = match serde_json::from_slice(adapter.body()) {
            Ok(p) => p,
            Err(e) => {
                return HostResponse::json(
                    400,
                    json!({"type": "internal", "name": "ValidationError", "message": e.to_string()}),
                )
            }
        };

        let requested_step = adapter.query_param("stepId").map(HashedId::new);
        let version = resolve_version(payload.version, registered.config.optimize_parallelism);

        let req = RunRequest {
            event: payload.event,
            events: payload.events,
            memoized: payload.steps,
            run_id: payload.ctx.run_id.clone(),
            attempt: payload.ctx.attempt,
            requested_step,
            disable_immediate_execution: payload.ctx.disable_immediate_execution,
            completion_order: payload.ctx.stack.stack,
            function: registered.config.clone(),
            mode: options.execution_mode,
            checkpoint_buffer_steps: options.checkpoint_buffer_steps,
        };

        let handler = registered.handler.clone();
        let result = self
            .engine
            .execute(req, move |tools, ctx| handler(tools, ctx))
            .await;

        let mut response = execution_result_to_response(&result);
        response
            .headers
            .push(("x-inngest-req-version".to_string(), version.to_string()));
        response
    }

    fn validate_signature(
        &self,
        adapter: &dyn HostAdapter,
        options: &Options,
        mode: EnvMode,
        now_secs: i64,
    ) -> Result<(), CommError> {
        if mode == EnvMode::Dev {
            return Ok(());
        }
        let Some(key) = options.signing_key.as_deref() else {
            return Err(CommError::SignatureMissing);
        };
        let Some(header) = adapter.header("x-inngest-signature") else {
            return Err(CommError::SignatureMissing);
        };
        signing::verify(
            header,
            adapter.body(),
            key,
            options.signing_key_fallback.as_deref(),
            now_secs,
            options.allow_expired_signatures,
        )
        .map(|_| ())
    }
}

fn unauthorized(err: CommError) -> HostResponse {
    HostResponse::json(401, json!({"type": "internal", "name": "SignatureError", "message": err.to_string()}))
}

/// Maps an [`ExecutionResult`] to the status/header table in spec §4.6.
fn execution_result_to_response(result: &ExecutionResult) -> HostResponse {
    let body = serde_json::to_value(result).unwrap_or(Value::Null);
    match result {
        ExecutionResult::FunctionResolved { .. } => HostResponse::json(200, body),
        ExecutionResult::FunctionRejected { retriable, .. } => match retriable {
            Retriable::Bool(true) => {
                HostResponse::json(500, body).with_header("x-inngest-no-retry", "false")
            }
            Retriable::Bool(false) => {
                HostResponse::json(400, body).with_header("x-inngest-no-retry", "true")
            }
            Retriable::After(after) => HostResponse::json(500, body)
                .with_header("x-inngest-no-retry", "false")
                .with_header("retry-after", retry_after_header(after)),
        },
        ExecutionResult::StepRan { step } => {
            let mut resp = HostResponse::json(206, body);
            if step.op == durable_core::OpCode::StepFailed {
                resp = resp.with_header("x-inngest-no-retry", "true");
            }
            resp
        }
        ExecutionResult::StepsFound { .. } => HostResponse::json(206, body),
        ExecutionResult::StepNotFound { .. } => {
            HostResponse::json(206, body).with_header("x-inngest-no-retry", "false")
        }
        ExecutionResult::ChangeMode { .. } => HostResponse::json(200, body),
    }
}

fn retry_after_header(after: &RetryAfter) -> String {
    match after {
        RetryAfter::Seconds(s) => s.to_string(),
        RetryAfter::Instant(iso) => iso.clone(),
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
