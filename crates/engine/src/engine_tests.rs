use super::*;
use crate::checkpoint::NewRunResponse;
use crate::retry::{non_retriable_error, retry_after_error};
use async_trait::async_trait;
use durable_core::{hash_step_id, FakeClock, FunctionConfig, MemoizedOp, MemoizedState, RetryAfter};
use durable_middleware::test_support::RecordingMiddleware;
use durable_middleware::MiddlewarePipeline;

/// Records every checkpoint RPC it receives; `fail` makes every call
/// return an error, to exercise the degradation paths spec §7 kind 6
/// describes.
struct FakeCheckpointClient {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeCheckpointClient {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl CheckpointClient for FakeCheckpointClient {
    async fn checkpoint_new_run(
        &self,
        req: NewRunRequest<'_>,
    ) -> Result<NewRunResponse, CheckpointError> {
        self.calls.lock().push(format!("new_run:{}", req.run_id));
        if self.fail {
            return Err(CheckpointError::Request("unreachable".to_string()));
        }
        Ok(NewRunResponse {
            app_id: "app-1".to_string(),
            fn_id: "fn-1".to_string(),
            token: "token-1".to_string(),
        })
    }

    async fn checkpoint_steps(
        &self,
        app_id: &str,
        fn_id: &str,
        run_id: &str,
        steps: &[OutgoingOp],
    ) -> Result<(), CheckpointError> {
        self.calls
            .lock()
            .push(format!("steps:{app_id}:{fn_id}:{run_id}:{}", steps.len()));
        if self.fail {
            return Err(CheckpointError::Request("unreachable".to_string()));
        }
        Ok(())
    }

    async fn checkpoint_steps_async(
        &self,
        run_id: &str,
        fn_id: &str,
        queue_item_id: &str,
        steps: &[OutgoingOp],
    ) -> Result<(), CheckpointError> {
        self.calls.lock().push(format!(
            "steps_async:{run_id}:{fn_id}:{queue_item_id}:{}",
            steps.len()
        ));
        if self.fail {
            return Err(CheckpointError::Request("unreachable".to_string()));
        }
        Ok(())
    }
}

fn request(memoized: MemoizedState, mode: Mode) -> RunRequest {
    RunRequest {
        event: EventPayload::new("test.event", Value::Null),
        events: Vec::new(),
        memoized,
        run_id: "run-1".to_string(),
        attempt: 0,
        requested_step: None,
        disable_immediate_execution: false,
        completion_order: Vec::new(),
        function: FunctionConfig::new("fn-1", "fn-1", Vec::new()),
        mode,
        checkpoint_buffer_steps: DEFAULT_CHECKPOINT_BUFFER_STEPS,
    }
}

fn engine() -> Engine<FakeClock> {
    Engine::new(MiddlewarePipeline::new(), FakeClock::new())
}

/// S1: empty memoized state, handler calls `step.run("a", ...)` and the
/// future never resolves this invocation — expect `steps-found` with one
/// planned op, never `function-resolved`. `Mode::Async` is the only mode
/// the real HTTP handler ever reaches; `disable_immediate_execution: true`
/// matches the Executor's default on a fresh invocation (spec §4.6 step
/// 3, §8 S1 — see `durable-comm`'s `run_request::default_disable_immediate_execution`).
#[tokio::test]
async fn s1_reports_a_newly_discovered_step() {
    let req = RunRequest {
        disable_immediate_execution: true,
        ..request(MemoizedState::new(), Mode::Async)
    };
    let result = engine()
        .execute(req, |tools, _ctx| async move {
            let _ = tools.run("a", None, |_input| async { Ok(Value::from(1)) });
            std::future::pending::<()>().await;
            Ok(Value::Null)
        })
        .await;

    match result {
        ExecutionResult::StepsFound { steps } => {
            assert_eq!(steps.len(), 1);
            assert_eq!(steps[0].id, hash_step_id("a"));
            assert_eq!(steps[0].op, OpCode::StepPlanned);
        }
        other => panic!("expected steps-found, got {other:?}"),
    }
}

/// S2: memoized state already has `a`'s result — the handler resumes past
/// it and returns, so the run resolves.
#[tokio::test]
async fn s2_resolves_once_all_steps_are_memoized() {
    let mut memoized = MemoizedState::new();
    let hashed = hash_step_id("a");
    memoized.insert(
        hashed.clone(),
        MemoizedOp {
            id: hashed,
            data: Some(Value::from(1)),
            ..Default::default()
        },
    );
    let req = request(memoized, Mode::AsyncCheckpointing);

    let result = engine()
        .execute(req, |tools, _ctx| async move {
            let value = tools
                .run("a", None, |_input| async { Ok(Value::from(1)) })
                .await
                .expect("memoized value");
            assert_eq!(value, Value::from(1));
            Ok(Value::Null)
        })
        .await;

    match result {
        ExecutionResult::FunctionResolved { data } => assert_eq!(data, Value::Null),
        other => panic!("expected function-resolved, got {other:?}"),
    }
}

/// Early execution (Async mode, single planned step, immediate execution
/// allowed): the step runs inline and its result comes back as
/// `step-ran`.
#[tokio::test]
async fn early_execution_runs_the_single_planned_step_inline() {
    let req = request(MemoizedState::new(), Mode::Async);
    let result = engine()
        .execute(req, |tools, _ctx| async move {
            let _ = tools.run("a", None, |_input| async { Ok(Value::from(42)) });
            std::future::pending::<()>().await;
            Ok(Value::Null)
        })
        .await;

    match result {
        ExecutionResult::StepRan { step } => {
            assert_eq!(step.op, OpCode::StepRun);
            assert_eq!(step.data, Value::from(42));
        }
        other => panic!("expected step-ran, got {other:?}"),
    }
}

/// S5 (NonRetriableError branch): a thrown `NonRetriableError` always
/// rejects as non-retriable, regardless of attempt count.
#[tokio::test]
async fn non_retriable_error_rejects_without_retry() {
    let req = request(MemoizedState::new(), Mode::Async);
    let result = engine()
        .execute(req, |_tools, _ctx| async move {
            Err(non_retriable_error("bad input"))
        })
        .await;

    match result {
        ExecutionResult::FunctionRejected { retriable, .. } => {
            assert!(!retriable.is_retriable());
        }
        other => panic!("expected function-rejected, got {other:?}"),
    }
}

/// S5 (RetryAfterError branch): a thrown `RetryAfterError` surfaces the
/// requested delay, rounded up to whole seconds.
#[tokio::test]
async fn retry_after_error_surfaces_the_requested_delay() {
    let req = request(MemoizedState::new(), Mode::Async);
    let result = engine()
        .execute(req, |_tools, _ctx| async move {
            Err(retry_after_error("slow down", 10_000))
        })
        .await;

    match result {
        ExecutionResult::FunctionRejected { retriable, .. } => {
            assert_eq!(retriable, Retriable::After(RetryAfter::Seconds(10)));
        }
        other => panic!("expected function-rejected, got {other:?}"),
    }
}

/// P6: neither sentinel, not the final attempt — retriable.
#[tokio::test]
async fn plain_error_is_retriable_before_the_final_attempt() {
    let mut req = request(MemoizedState::new(), Mode::Async);
    req.function = FunctionConfig::new("fn-1", "fn-1", Vec::new());
    req.attempt = 0; // retries defaults to 3, so attempt 0 is not final
    let result = engine()
        .execute(req, |_tools, _ctx| async move {
            Err(Value::from("boom"))
        })
        .await;

    match result {
        ExecutionResult::FunctionRejected { retriable, .. } => assert!(retriable.is_retriable()),
        other => panic!("expected function-rejected, got {other:?}"),
    }
}

/// P6: neither sentinel, final attempt — non-retriable.
#[tokio::test]
async fn plain_error_is_non_retriable_on_the_final_attempt() {
    let mut req = request(MemoizedState::new(), Mode::Async);
    req.function.retries = 0; // maxAttempts = 1
    req.attempt = 0;
    let result = engine()
        .execute(req, |_tools, _ctx| async move {
            Err(Value::from("boom"))
        })
        .await;

    match result {
        ExecutionResult::FunctionRejected { retriable, .. } => assert!(!retriable.is_retriable()),
        other => panic!("expected function-rejected, got {other:?}"),
    }
}

/// S6-equivalent at the engine level: requesting a step id that never
/// appears yields `step-not-found`.
#[tokio::test]
async fn requested_step_that_never_appears_is_reported_not_found() {
    let mut req = request(MemoizedState::new(), Mode::Async);
    req.requested_step = Some(hash_step_id("missing"));
    let result = engine()
        .execute(req, |_tools, _ctx| async move { Ok(Value::Null) })
        .await;

    match result {
        ExecutionResult::StepNotFound { step } => assert_eq!(step, hash_step_id("missing")),
        other => panic!("expected step-not-found, got {other:?}"),
    }
}

/// Spec §4.2 "Input replay for run": a step with recorded `input` but no
/// `data`/`error` yet (a prior attempt started it but never finished) is
/// invoked with that recorded input, not whatever this attempt passes.
#[tokio::test]
async fn requested_step_replays_its_recorded_input() {
    let mut memoized = MemoizedState::new();
    let hashed = hash_step_id("a");
    memoized.insert(
        hashed.clone(),
        MemoizedOp {
            id: hashed.clone(),
            input: Some(Value::from("recorded")),
            ..Default::default()
        },
    );
    let mut req = request(memoized, Mode::Async);
    req.requested_step = Some(hashed);

    let result = engine()
        .execute(req, |tools, _ctx| async move {
            let _ = tools.run("a", Some(Value::from("fresh")), |input| async move {
                Ok(input.unwrap_or(Value::Null))
            });
            std::future::pending::<()>().await;
            Ok(Value::Null)
        })
        .await;

    match result {
        ExecutionResult::StepRan { step } => assert_eq!(step.data, Value::from("recorded")),
        other => panic!("expected step-ran, got {other:?}"),
    }
}

/// `Mode::Sync` with a wired checkpoint client runs each planned step
/// inline and reports `checkpointNewRun` once for the batch (spec §4.7
/// "Checkpoint RPCs").
#[tokio::test]
async fn sync_mode_checkpoints_the_executed_batch() {
    let client = Arc::new(FakeCheckpointClient::new());
    let req = request(MemoizedState::new(), Mode::Sync);
    let result = Engine::new(MiddlewarePipeline::new(), FakeClock::new())
        .with_checkpoint_client(client.clone())
        .execute(req, |tools, _ctx| async move {
            let _ = tools.run("a", None, |_input| async { Ok(Value::from(1)) });
            std::future::pending::<()>().await;
            Ok(Value::Null)
        })
        .await;

    match result {
        ExecutionResult::StepsFound { steps } => assert_eq!(steps.len(), 1),
        other => panic!("expected steps-found, got {other:?}"),
    }
    assert_eq!(*client.calls.lock(), vec!["new_run:run-1".to_string()]);
}

/// A checkpoint RPC failure in Sync mode propagates as a rejected run,
/// not a silent mode change (spec §7 kind 6).
#[tokio::test]
async fn sync_mode_checkpoint_failure_rejects_the_run() {
    let client = Arc::new(FakeCheckpointClient::failing());
    let req = request(MemoizedState::new(), Mode::Sync);
    let result = Engine::new(MiddlewarePipeline::new(), FakeClock::new())
        .with_checkpoint_client(client)
        .execute(req, |tools, _ctx| async move {
            let _ = tools.run("a", None, |_input| async { Ok(Value::from(1)) });
            std::future::pending::<()>().await;
            Ok(Value::Null)
        })
        .await;

    match result {
        ExecutionResult::FunctionRejected { retriable, .. } => assert!(retriable.is_retriable()),
        other => panic!("expected function-rejected, got {other:?}"),
    }
}

/// `Mode::AsyncCheckpointing` gets the same early-execution eligibility
/// as `Mode::Async` and buffers the executed step instead of leaving it
/// unreported (spec §4.7 "AsyncCheckpointing").
#[tokio::test]
async fn async_checkpointing_runs_the_single_planned_step_inline_and_flushes() {
    let client = Arc::new(FakeCheckpointClient::new());
    let req = request(MemoizedState::new(), Mode::AsyncCheckpointing);
    let result = Engine::new(MiddlewarePipeline::new(), FakeClock::new())
        .with_checkpoint_client(client.clone())
        .execute(req, |tools, _ctx| async move {
            let _ = tools.run("a", None, |_input| async { Ok(Value::from(42)) });
            std::future::pending::<()>().await;
            Ok(Value::Null)
        })
        .await;

    match result {
        ExecutionResult::StepRan { step } => assert_eq!(step.data, Value::from(42)),
        other => panic!("expected step-ran, got {other:?}"),
    }
    assert_eq!(
        *client.calls.lock(),
        vec!["steps_async:run-1:fn-1:run-1:1".to_string()]
    );
}

/// A buffer flush failure under `AsyncCheckpointing` is swallowed: the
/// run still resolves normally through the in-band response, and the
/// unflushed steps are kept for the next flush attempt rather than lost.
#[tokio::test]
async fn async_checkpointing_flush_failure_does_not_fail_the_run() {
    let client = Arc::new(FakeCheckpointClient::failing());
    let req = request(MemoizedState::new(), Mode::AsyncCheckpointing);
    let result = Engine::new(MiddlewarePipeline::new(), FakeClock::new())
        .with_checkpoint_client(client)
        .execute(req, |tools, _ctx| async move {
            let _ = tools.run("a", None, |_input| async { Ok(Value::from(1)) });
            std::future::pending::<()>().await;
            Ok(Value::Null)
        })
        .await;

    match result {
        ExecutionResult::StepRan { step } => assert_eq!(step.data, Value::from(1)),
        other => panic!("expected step-ran, got {other:?}"),
    }
}

/// `wrapRun` (spec §4.4): `on_run_start` fires before the handler body
/// runs and `on_run_complete` fires once it resolves, bracketing the
/// whole invocation the way `on_step_start`/`on_step_complete` bracket
/// a single step.
#[tokio::test]
async fn wrap_run_hooks_bracket_a_resolved_handler() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut middleware = MiddlewarePipeline::new();
    middleware.push(Arc::new(RecordingMiddleware::new("mw", calls.clone())));

    let req = request(MemoizedState::new(), Mode::Async);
    let result = Engine::new(middleware, FakeClock::new())
        .execute(req, |_tools, _ctx| async move { Ok(Value::from("done")) })
        .await;

    match result {
        ExecutionResult::FunctionResolved { data } => assert_eq!(data, Value::from("done")),
        other => panic!("expected function-resolved, got {other:?}"),
    }
    let recorded = calls.lock().clone();
    assert!(recorded.contains(&"mw:on_run_start".to_string()));
    assert!(recorded.contains(&"mw:on_run_complete".to_string()));
    assert!(
        recorded.iter().position(|c| c == "mw:on_run_start")
            < recorded.iter().position(|c| c == "mw:on_run_complete")
    );
}
