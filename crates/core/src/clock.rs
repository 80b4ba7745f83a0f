//! Time abstraction so engine tests never depend on wall-clock sleeps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of time for the engine. Implementations must be cheap to clone
/// and safe to call from any task.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// Current instant as an ISO-8601 string (UTC), used for `sleepUntil`
    /// validation and timestamping outgoing ops.
    fn now_iso8601(&self) -> String {
        let ms = self.epoch_ms();
        let secs = (ms / 1000) as i64;
        let nanos = ((ms % 1000) * 1_000_000) as u32;
        chrono::DateTime::from_timestamp(secs, nanos)
            .unwrap_or_else(epoch_start)
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}

// The Unix epoch is always a valid `DateTime` constructor input.
#[allow(clippy::expect_used)]
fn epoch_start() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(0, 0).expect("epoch is valid")
}

/// Real wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Deterministic clock for tests: starts at a fixed instant and only
/// advances when told to.
#[derive(Debug, Clone)]
pub struct FakeClock {
    epoch_ms: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::at(0)
    }

    pub fn at(epoch_ms: u64) -> Self {
        Self {
            epoch_ms: Arc::new(AtomicU64::new(epoch_ms)),
        }
    }

    pub fn advance_ms(&self, delta: u64) {
        self.epoch_ms.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_ms(&self, epoch_ms: u64) {
        self.epoch_ms.store(epoch_ms, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.epoch_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
