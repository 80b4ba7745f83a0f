//! Errors owned by the communication handler (spec §7 kinds 1, 2, 7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommError {
    #[error("signature missing")]
    SignatureMissing,

    #[error("signature expired")]
    SignatureExpired,

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("malformed request: {0}")]
    Validation(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("registration failed: {0}")]
    Registration(String),
}
