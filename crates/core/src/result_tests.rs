use super::*;
use crate::id::hash_step_id;

#[test]
fn memoized_op_is_fulfilled_with_data() {
    let op = MemoizedOp {
        id: hash_step_id("a"),
        data: Some(Value::from(1)),
        ..Default::default()
    };
    assert!(op.is_fulfilled());
}

#[test]
fn memoized_op_is_fulfilled_with_error() {
    let op = MemoizedOp {
        id: hash_step_id("a"),
        error: Some(serde_json::json!({"message": "boom"})),
        ..Default::default()
    };
    assert!(op.is_fulfilled());
}

#[test]
fn memoized_op_without_data_or_error_is_unfulfilled() {
    let op = MemoizedOp {
        id: hash_step_id("a"),
        ..Default::default()
    };
    assert!(!op.is_fulfilled());
}

#[test]
fn retriable_bool_false_is_not_retriable() {
    assert!(!Retriable::Bool(false).is_retriable());
}

#[test]
fn retriable_after_is_always_retriable() {
    assert!(Retriable::After(RetryAfter::Seconds(5)).is_retriable());
}

#[test]
fn function_resolved_serializes_data_as_null_when_undefined() {
    // P5: a handler returning `undefined` is surfaced as `data: null`.
    let result = ExecutionResult::FunctionResolved {
        data: normalize_undefined(Value::Null),
    };
    let json = serde_json::to_value(&result).expect("serialize");
    assert_eq!(json["data"], Value::Null);
    assert!(!json.to_string().contains("undefined"));
}

#[test]
fn normalize_undefined_recurses_into_nested_structures() {
    let input = serde_json::json!({"a": [1, null, {"b": null}]});
    let output = normalize_undefined(input.clone());
    assert_eq!(output, input);
}

#[test]
fn steps_found_serializes_as_array_body() {
    let op = OutgoingOp {
        id: hash_step_id("a"),
        op: OpCode::StepPlanned,
        name: None,
        display_name: Some("a".into()),
        opts: None,
        data: Value::Null,
        error: None,
        userland: None,
        timing: None,
    };
    let result = ExecutionResult::StepsFound { steps: vec![op] };
    let json = serde_json::to_value(&result).expect("serialize");
    assert_eq!(json["type"], "steps-found");
    assert_eq!(json["steps"].as_array().expect("array").len(), 1);
}
