use super::*;
use durable_core::{hash_step_id, MemoizedOp, OpCode, StepMode};

fn descriptor(id: &str, op: OpCode) -> StepDescriptor {
    StepDescriptor::new(id.into(), hash_step_id(id), op, StepMode::Sync)
}

#[test]
fn pre_fulfilled_step_settles_immediately() {
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
    let mut state = ExecutionState::new(memoized, Vec::new());
    let fut = state.push(descriptor("a", OpCode::StepPlanned), None);

    let handle = state.find(&hash_step_id("a")).expect("discovered");
    assert!(state.step(handle).handled);
    assert_eq!(state.new_step_handles().len(), 0);

    // A ready oneshot resolves on first poll with a noop waker.
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut fut = Box::pin(fut);
    match fut.as_mut().poll(&mut cx) {
        Poll::Ready(Ok(v)) => assert_eq!(v, Value::from(1)),
        other => panic!("expected immediate resolution, got {other:?}"),
    }
}

#[test]
fn unfulfilled_step_is_new_and_future_freezes() {
    let mut state = ExecutionState::new(MemoizedState::new(), Vec::new());
    let fut = state.push(descriptor("a", OpCode::StepPlanned), None);
    assert_eq!(state.new_step_handles().len(), 1);

    drop(state); // drops the sender half, simulating "not run this invocation"

    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut fut = Box::pin(fut);
    assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Pending));
}

#[test]
fn unfulfilled_step_replays_its_recorded_input_over_a_fresh_one() {
    let mut memoized = MemoizedState::new();
    let hashed = hash_step_id("a");
    memoized.insert(
        hashed.clone(),
        MemoizedOp {
            id: hashed,
            input: Some(Value::from("recorded")),
            ..Default::default()
        },
    );
    let mut state = ExecutionState::new(memoized, Vec::new());
    let descriptor = descriptor("a", OpCode::StepPlanned).with_input(Value::from("fresh"));
    let _fut = state.push(descriptor, None);

    let handle = state.find(&hash_step_id("a")).expect("discovered");
    let (_, effective_input) = state.take_handler(handle);
    assert_eq!(effective_input, Some(Value::from("recorded")));
}

#[test]
fn collision_resolution_survives_repeated_discovery() {
    let mut state = ExecutionState::new(MemoizedState::new(), Vec::new());
    let first = state.resolver.resolve("a", |_| false);
    assert_eq!(first.final_id, "a");
    let second = state.resolver.resolve("a", |_| false);
    assert_eq!(second.final_id, "a:2");
}
