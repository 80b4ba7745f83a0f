//! Errors owned by the execution engine (spec §7 kinds 3, 6, 8).

use durable_core::{CoreError, HashedId};
use durable_middleware::MiddlewareError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error("requested step {0} never appeared within the bound")]
    StepNotFound(HashedId),

    #[error("checkpoint request failed after retries: {0}")]
    CheckpointFailed(String),

    #[error("id-collision resolution exceeded capacity for base id {0}")]
    Unreachable(String),
}
