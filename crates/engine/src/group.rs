//! `group.parallel` (spec §4.3): tags every step created inside a
//! callback with an ambient `parallelMode`, isolated per task so
//! concurrent runs never leak into one another.

use durable_core::ParallelMode;
use std::future::Future;

tokio::task_local! {
    static PARALLEL_MODE: ParallelMode;
}

/// The ambient parallel mode for the task currently executing, if any
/// `parallel()` scope is active. Step tools consult this only when a
/// step's own options don't set `parallelMode` explicitly (spec §4.2
/// "explicit `parallelMode` ... takes precedence").
pub fn current_parallel_mode() -> Option<ParallelMode> {
    PARALLEL_MODE.try_with(|m| *m).ok()
}

/// Runs `body` with `parallelMode: "race"` ambient for every step tool
/// call made inside it. Nesting is supported: an inner `parallel()` call
/// overrides the ambient mode only for its own future's lifetime, then
/// the outer scope's value (or none) applies again.
pub async fn parallel<F, Fut, T>(body: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    PARALLEL_MODE.scope(ParallelMode::Race, body()).await
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
