//! A single sample function so the binary is runnable end-to-end without
//! a real Inngest app wired in (spec SPEC_FULL §2 "runnable thing").
//! Greets the triggering event's `data.name`, durably, via one
//! `step.run`.

use std::sync::Arc;

use durable_core::{EventPayload, FunctionConfig, Trigger};
use durable_comm::RegisteredFunction;
use durable_engine::StepTools;
use durable_middleware::RunContext;
use futures::future::BoxFuture;
use serde_json::{json, Value};

pub fn hello_function() -> RegisteredFunction {
    let config = FunctionConfig::new(
        "hello-world",
        "Hello World",
        vec![Trigger::Event {
            event: "demo/hello".to_string(),
            if_expr: None,
        }],
    );

    RegisteredFunction {
        config,
        handler: Arc::new(|tools: StepTools, ctx: RunContext| -> BoxFuture<'static, Result<Value, Value>> {
            Box::pin(async move { run(tools, ctx.event).await })
        }),
    }
}

async fn run(tools: StepTools, event: EventPayload) -> Result<Value, Value> {
    let name = event
        .data
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("world")
        .to_string();

    let greeting = tools
        .run("build-greeting", None, move |_input| async move { Ok(json!(format!("Hello, {name}!"))) })
        .await?;

    Ok(json!({ "message": greeting }))
}
