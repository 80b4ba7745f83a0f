//! Process-env-layered configuration (spec §4.6 step 1-2, §6 env vars).
//!
//! Layering order: built-in defaults → process env → explicit constructor
//! overrides. Every upsert is idempotent — set-if-absent, matching spec
//! §5 "global singletons ... all writes are idempotent upserts."

use std::collections::HashMap;

use durable_engine::{Mode as ExecutionMode, DEFAULT_CHECKPOINT_BUFFER_STEPS};

/// Cloud vs dev, and whether that was inferred or pinned explicitly
/// (spec §4.6 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Cloud,
    Dev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Streaming {
    Off,
    Allow,
    Force,
}

/// Signing/event keys, base URLs, and streaming mode, resolved once per
/// handler and then treated as a read-mostly singleton (spec §5).
#[derive(Debug, Clone)]
pub struct Options {
    pub signing_key: Option<String>,
    pub signing_key_fallback: Option<String>,
    pub event_key: Option<String>,
    pub base_url: String,
    pub api_base_url: String,
    pub event_api_base_url: String,
    pub serve_host: Option<String>,
    pub serve_path: Option<String>,
    pub streaming: Streaming,
    pub dev_mode_override: Option<bool>,
    pub allow_expired_signatures: bool,
    /// Which `durable_engine::Mode` run requests execute under. Orthogonal
    /// to the per-request `ExecutionVersion` negotiated in
    /// `run_request::resolve_version` (spec §4.6 step 3 "Version
    /// selection" vs. §4.7 "Mode") — one is wire-format negotiation, the
    /// other is an invocation-level execution policy, and the spec never
    /// ties one to the other.
    pub execution_mode: ExecutionMode,
    /// `Mode::AsyncCheckpointing`'s flush threshold (spec §4.7).
    pub checkpoint_buffer_steps: u32,
}

const DEFAULT_BASE_URL: &str = "https://api.inngest.com";

impl Default for Options {
    fn default() -> Self {
        Self {
            signing_key: None,
            signing_key_fallback: None,
            event_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            event_api_base_url: DEFAULT_BASE_URL.to_string(),
            serve_host: None,
            serve_path: None,
            streaming: Streaming::Off,
            dev_mode_override: None,
            allow_expired_signatures: false,
            execution_mode: ExecutionMode::Async,
            checkpoint_buffer_steps: DEFAULT_CHECKPOINT_BUFFER_STEPS,
        }
    }
}

impl Options {
    /// Layer `env` (process env merged with adapter-provided env, per
    /// spec §4.6 step 1) onto the current options, upserting only fields
    /// not already set.
    pub fn upsert_from_env(&mut self, env: &HashMap<String, String>) {
        upsert(&mut self.signing_key, env.get("INNGEST_SIGNING_KEY"));
        upsert(
            &mut self.signing_key_fallback,
            env.get("INNGEST_SIGNING_KEY_FALLBACK"),
        );
        upsert(&mut self.event_key, env.get("INNGEST_EVENT_KEY"));
        if let Some(v) = env.get("INNGEST_BASE_URL") {
            self.base_url = v.clone();
        }
        if let Some(v) = env.get("INNGEST_API_BASE_URL") {
            self.api_base_url = v.clone();
        }
        if let Some(v) = env.get("INNGEST_EVENT_API_BASE_URL") {
            self.event_api_base_url = v.clone();
        }
        upsert(&mut self.serve_host, env.get("INNGEST_SERVE_HOST"));
        upsert(&mut self.serve_path, env.get("INNGEST_SERVE_PATH"));
        if let Some(v) = env.get("INNGEST_STREAMING") {
            self.streaming = match v.as_str() {
                "force" => Streaming::Force,
                "allow" => Streaming::Allow,
                _ => Streaming::Off,
            };
        }
        if let Some(v) = env.get("INNGEST_DEV") {
            self.dev_mode_override = Some(v != "0" && !v.eq_ignore_ascii_case("false"));
        }
        if let Some(v) = env.get("INNGEST_EXECUTION_MODE") {
            self.execution_mode = match v.as_str() {
                "sync" => ExecutionMode::Sync,
                "async-checkpointing" => ExecutionMode::AsyncCheckpointing,
                _ => ExecutionMode::Async,
            };
        }
        if let Some(v) = env.get("INNGEST_CHECKPOINT_BUFFER_STEPS") {
            if let Ok(n) = v.parse() {
                self.checkpoint_buffer_steps = n;
            }
        }
    }

    /// Resolve cloud-vs-dev (spec §4.6 step 1): an explicit `INNGEST_DEV`
    /// wins; otherwise infer from `NODE_ENV`-equivalent production
    /// signaling reported by the adapter.
    pub fn resolve_mode(&self, is_production: bool) -> Mode {
        match self.dev_mode_override {
            Some(true) => Mode::Dev,
            Some(false) => Mode::Cloud,
            None if is_production => Mode::Cloud,
            None => Mode::Dev,
        }
    }
}

fn upsert(field: &mut Option<String>, value: Option<&String>) {
    if field.is_none() {
        if let Some(v) = value {
            *field = Some(v.clone());
        }
    }
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
