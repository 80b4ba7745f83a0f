#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! durable-engine: step tools, group tools, execution state, and the
//! core replay loop.

pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod group;
pub mod retry;
pub mod state;
pub mod tools;

pub use checkpoint::{CheckpointClient, CheckpointError, HttpCheckpointClient, NewRunRequest, NewRunResponse};
pub use engine::{checkpoint_new_run, Engine, Mode, RunRequest, DEFAULT_CHECKPOINT_BUFFER_STEPS};
pub use error::RuntimeError;
pub use group::{current_parallel_mode, parallel};
pub use state::{ExecutionState, StepFuture, StepHandle, StepHandler, StepSettlement};
pub use tools::{AiInferOpts, FetchOpts, InvokeOpts, OnConflict, StepTools, WaitForEventOpts, WaitForSignalOpts};

#[cfg(any(test, feature = "test-support"))]
pub use checkpoint::NoopCheckpointClient;
