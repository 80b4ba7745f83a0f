#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! durable-middleware: the ordered middleware pipeline (spec §4.4).

pub mod context;
pub mod error;
pub mod middleware_trait;
pub mod pipeline;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use context::{RunContext, StepInfo, StepOutput};
pub use error::MiddlewareError;
pub use middleware_trait::{Middleware, NoopMiddleware};
pub use pipeline::MiddlewarePipeline;
