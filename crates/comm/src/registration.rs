//! `PUT` registration (spec §4.6 step 3, §6 "Function-config payload"):
//! serializes the function list and POSTs it to the Executor's
//! `/fn/register`, with an inferred-dev-mode probe/redirect.

use std::collections::HashMap;
use std::time::Duration;

use durable_core::FunctionConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::CommError;

const DEV_SERVER_URL: &str = "http://127.0.0.1:8288";
const DEV_PROBE_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepRuntime {
    #[serde(rename = "type")]
    kind: &'static str,
    url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepRetries {
    attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredStep {
    runtime: StepRuntime,
    retries: StepRetries,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredFunction {
    id: String,
    name: String,
    triggers: Vec<durable_core::Trigger>,
    steps: HashMap<String, RegisteredStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    concurrency: Option<durable_core::ConcurrencyConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_events: Option<durable_core::BatchConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    idempotency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<String>,
}

/// The registration POST body (spec §6 "Function-config payload").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterPayload {
    url: String,
    deploy_type: &'static str,
    framework: String,
    app_name: String,
    functions: Vec<RegisteredFunction>,
    sdk: String,
    v: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    deploy_id: Option<String>,
    capabilities: Capabilities,
}

#[derive(Debug, Clone, Serialize)]
struct Capabilities {
    trust_probe: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub status: u16,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub modified: bool,
    #[serde(default)]
    pub error: Option<String>,
}

fn build_payload(
    serve_url: &str,
    app_name: &str,
    functions: &[FunctionConfig],
    deploy_id: Option<String>,
) -> RegisterPayload {
    let registered = functions
        .iter()
        .map(|f| {
            let mut steps = HashMap::new();
            steps.insert(
                "step".to_string(),
                RegisteredStep {
                    runtime: StepRuntime {
                        kind: "http",
                        url: format!("{serve_url}?fnId={}", f.id.as_str()),
                    },
                    retries: StepRetries {
                        attempts: f.max_attempts(),
                    },
                },
            );
            RegisteredFunction {
                id: f.id.as_str().to_string(),
                name: f.name.clone(),
                triggers: f.triggers.clone(),
                steps,
                concurrency: f.concurrency.clone(),
                batch_events: f.batch_events.clone(),
                idempotency: f.idempotency.clone(),
                priority: f.priority.clone(),
            }
        })
        .collect();

    RegisterPayload {
        url: serve_url.to_string(),
        deploy_type: "ping",
        framework: "durable-comm".to_string(),
        app_name: app_name.to_string(),
        functions: registered,
        sdk: format!("rust:v{}", env!("CARGO_PKG_VERSION")),
        v: "0.1",
        deploy_id,
        capabilities: Capabilities {
            trust_probe: "v1",
        },
    }
}

/// Caches whether a given dev-server host answered the last probe, so
/// repeated `PUT`s in inferred dev mode don't re-probe every time
/// (spec §5 "dev-server probe is cached per host").
#[derive(Default)]
pub struct DevServerProbeCache {
    reachable: Mutex<HashMap<String, bool>>,
}

impl DevServerProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn probe(&self, client: &reqwest::Client, host: &str) -> bool {
        if let Some(cached) = self.reachable.lock().get(host).copied() {
            return cached;
        }
        let reachable = client
            .get(format!("{host}/dev"))
            .timeout(DEV_PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        self.reachable.lock().insert(host.to_string(), reachable);
        reachable
    }
}

/// POST the function list to `target_base_url/fn/register`, falling back
/// to the local dev server first when `probe_dev` is set (inferred dev
/// mode, spec §4.6 step 3 "PUT").
pub async fn register(
    client: &reqwest::Client,
    target_base_url: &str,
    probe_cache: Option<&DevServerProbeCache>,
    serve_url: &str,
    app_name: &str,
    functions: &[FunctionConfig],
    deploy_id: Option<String>,
) -> Result<RegisterResponse, CommError> {
    let mut base_url = target_base_url.to_string();
    if let Some(cache) = probe_cache {
        if cache.probe(client, DEV_SERVER_URL).await {
            base_url = DEV_SERVER_URL.to_string();
        }
    }

    let payload = build_payload(serve_url, app_name, functions, deploy_id);
    let resp = client
        .put(format!("{base_url}/fn/register"))
        .json(&payload)
        .send()
        .await
        .map_err(|e| CommError::Registration(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(CommError::Registration(format!("{status}: {body}")));
    }

    resp.json::<RegisterResponse>()
        .await
        .map_err(|e| CommError::Registration(e.to_string()))
}
