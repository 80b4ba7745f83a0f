#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! durable-comm: framework-agnostic HTTP protocol layer (spec §4.5, §4.6).
//!
//! Turns raw HTTP requests into [`durable_engine::Engine`] invocations:
//! request signing/verification, environment-driven [`Options`], function
//! registration, and the GET/PUT/POST dispatcher in [`handler`]. Never
//! binds a socket itself — a [`HostAdapter`] implementation (a real
//! framework binding, or the reference `durable-cli` binary) supplies the
//! request and receives the response.

pub mod adapter;
pub mod error;
pub mod handler;
pub mod options;
pub mod registration;
pub mod run_request;
pub mod signing;

pub use adapter::{HostAdapter, HostResponse};
pub use error::CommError;
pub use handler::{CommHandler, HandlerFn, RegisteredFunction};
pub use options::{Mode, Options, Streaming};
pub use registration::{DevServerProbeCache, RegisterResponse};
pub use run_request::{resolve_version, FunctionDataPayload};
