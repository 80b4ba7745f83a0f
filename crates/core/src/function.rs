//! Function definition (spec §3 "Function definition").

use crate::event::Trigger;
use crate::id::FunctionId;
use serde::{Deserialize, Serialize};

/// Default retry count when a function omits `retries` (spec §3).
pub const DEFAULT_RETRIES: u32 = 3;
/// Maximum allowed `retries` value (spec §3, range 0-20).
pub const MAX_RETRIES: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    pub id: FunctionId,
    pub name: String,
    pub triggers: Vec<Trigger>,
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Engine v2 parallelism optimization (spec §3, default true).
    #[serde(default = "default_true")]
    pub optimize_parallelism: bool,
    #[serde(default)]
    pub concurrency: Option<ConcurrencyConfig>,
    #[serde(default)]
    pub idempotency: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub batch_events: Option<BatchConfig>,
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_true() -> bool {
    true
}

impl FunctionConfig {
    pub fn new(id: impl Into<FunctionId>, name: impl Into<String>, triggers: Vec<Trigger>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            triggers,
            retries: DEFAULT_RETRIES,
            optimize_parallelism: true,
            concurrency: None,
            idempotency: None,
            priority: None,
            batch_events: None,
        }
    }

    /// `maxAttempts = retries + 1` (spec §4.7).
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn clamped_retries(&self) -> u32 {
        self.retries.min(MAX_RETRIES)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyConfig {
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    pub max_size: u32,
    pub timeout: String,
}

#[cfg(test)]
#[path = "function_tests.rs"]
mod tests;
