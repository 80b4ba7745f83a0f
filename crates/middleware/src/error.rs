use thiserror::Error;

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("middleware rejected run input: {0}")]
    InputRejected(String),
}
