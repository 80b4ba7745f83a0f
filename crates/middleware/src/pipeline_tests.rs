use super::*;
use crate::test_support::RecordingMiddleware;
use durable_core::{EventPayload, HashedId, OpCode, StepDescriptor, StepMode};
use parking_lot::Mutex;

fn descriptor() -> StepDescriptor {
    StepDescriptor::new(
        "a".into(),
        HashedId::new("hash"),
        OpCode::StepPlanned,
        StepMode::Sync,
    )
}

#[tokio::test]
async fn transform_input_runs_in_registration_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = MiddlewarePipeline::new();
    pipeline.push(Arc::new(RecordingMiddleware::new("client", calls.clone())));
    pipeline.push(Arc::new(RecordingMiddleware::new("function", calls.clone())));

    let mut ctx = RunContext::new(EventPayload::new("a", Value::Null), "run-1", 1);
    pipeline.transform_input(&mut ctx).await.expect("ok");

    assert_eq!(
        *calls.lock(),
        vec!["client:transform_input", "function:transform_input"]
    );
}

#[tokio::test]
async fn settle_step_runs_completion_hooks_in_reverse_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = MiddlewarePipeline::new();
    pipeline.push(Arc::new(RecordingMiddleware::new("outer", calls.clone())));
    pipeline.push(Arc::new(RecordingMiddleware::new("inner", calls.clone())));

    let step = StepInfo {
        descriptor: descriptor(),
    };
    let output = pipeline
        .transform_step_output(StepOutput::Data(Value::from(1)))
        .await;
    pipeline.notify_step_settled(&step, &output, false).await;

    let recorded = calls.lock().clone();
    assert_eq!(
        recorded,
        vec![
            "outer:transform_output",
            "inner:transform_output",
            "inner:on_step_complete",
            "outer:on_step_complete",
        ]
    );
}

#[tokio::test]
async fn start_step_runs_in_registration_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = MiddlewarePipeline::new();
    pipeline.push(Arc::new(RecordingMiddleware::new("a", calls.clone())));
    pipeline.push(Arc::new(RecordingMiddleware::new("b", calls.clone())));

    let step = StepInfo {
        descriptor: descriptor(),
    };
    pipeline.start_step(&step).await;

    assert_eq!(*calls.lock(), vec!["a:on_step_start", "b:on_step_start"]);
}

#[tokio::test]
async fn wrap_run_fires_start_in_order_and_complete_in_reverse() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = MiddlewarePipeline::new();
    pipeline.push(Arc::new(RecordingMiddleware::new("outer", calls.clone())));
    pipeline.push(Arc::new(RecordingMiddleware::new("inner", calls.clone())));

    let ctx = RunContext::new(EventPayload::new("a", Value::Null), "run-1", 1);
    pipeline.start_run(&ctx).await;
    pipeline.complete_run(&ctx, &Value::from(1)).await;

    assert_eq!(
        *calls.lock(),
        vec![
            "outer:on_run_start",
            "inner:on_run_start",
            "inner:on_run_complete",
            "outer:on_run_complete",
        ]
    );
}

#[tokio::test]
async fn empty_pipeline_is_a_no_op() {
    let pipeline = MiddlewarePipeline::new();
    assert!(pipeline.is_empty());
    let mut ctx = RunContext::new(EventPayload::new("a", Value::Null), "run-1", 1);
    pipeline.transform_input(&mut ctx).await.expect("ok");
}
