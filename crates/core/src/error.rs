//! Error kinds owned by the core data model (spec §7).

use thiserror::Error;

/// Errors raised while building or validating step/function descriptors.
/// These never reach user code (spec §7 propagation policy) — they are
/// classified by the engine into the appropriate `ExecutionResult`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid instant: {0}")]
    InvalidInstant(String),

    #[error("waitForEvent cannot set both `match` and `if`")]
    ConflictingMatchAndIf,

    #[error("step id collision resolution exceeded capacity for base id {0}")]
    Unreachable(String),

    #[error("unknown function id: {0}")]
    UnknownFunction(String),

    #[error("event payload failed schema validation: {0}")]
    SchemaValidation(String),
}
