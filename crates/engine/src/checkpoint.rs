//! Checkpoint RPCs (spec §4.7 "Checkpoint RPCs"): retried with
//! exponential backoff and jitter, same shape as the teacher's outbound
//! HTTP calls in its registration client.

use async_trait::async_trait;
use durable_core::{EventPayload, OutgoingOp};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint request failed: {0}")]
    Request(String),
    #[error("checkpoint endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRunRequest<'a> {
    pub run_id: &'a str,
    pub event: &'a EventPayload,
    pub steps: &'a [OutgoingOp],
    pub execution_version: u32,
    pub retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRunResponse {
    pub app_id: String,
    pub fn_id: String,
    pub token: String,
}

/// The three outbound calls a checkpointing run may make (spec §4.7).
/// Abstracted behind a trait so engine tests never touch the network.
#[async_trait]
pub trait CheckpointClient: Send + Sync {
    async fn checkpoint_new_run(
        &self,
        req: NewRunRequest<'_>,
    ) -> Result<NewRunResponse, CheckpointError>;

    async fn checkpoint_steps(
        &self,
        app_id: &str,
        fn_id: &str,
        run_id: &str,
        steps: &[OutgoingOp],
    ) -> Result<(), CheckpointError>;

    async fn checkpoint_steps_async(
        &self,
        run_id: &str,
        fn_id: &str,
        queue_item_id: &str,
        steps: &[OutgoingOp],
    ) -> Result<(), CheckpointError>;
}

/// Real HTTP implementation, posting JSON to the Executor's checkpoint
/// endpoints under `base_url`.
pub struct HttpCheckpointClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCheckpointClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, CheckpointError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self.client.post(&url).json(body).send().await;
            match outcome {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<T>()
                        .await
                        .map_err(|e| CheckpointError::Request(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    if attempt >= MAX_ATTEMPTS {
                        return Err(CheckpointError::Status { status, body });
                    }
                }
                Err(err) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(CheckpointError::Request(err.to_string()));
                    }
                }
            }
            tokio::time::sleep(backoff_delay(attempt)).await;
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp_ms = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(10));
    let jitter_ms = rand::thread_rng().gen_range(0..=exp_ms / 4 + 1);
    Duration::from_millis(exp_ms + jitter_ms)
}

#[async_trait]
impl CheckpointClient for HttpCheckpointClient {
    async fn checkpoint_new_run(
        &self,
        req: NewRunRequest<'_>,
    ) -> Result<NewRunResponse, CheckpointError> {
        self.post_with_retry("/fn/checkpoint/new-run", &req).await
    }

    async fn checkpoint_steps(
        &self,
        app_id: &str,
        fn_id: &str,
        run_id: &str,
        steps: &[OutgoingOp],
    ) -> Result<(), CheckpointError> {
        #[derive(Serialize)]
        struct Body<'a> {
            app_id: &'a str,
            fn_id: &'a str,
            run_id: &'a str,
            steps: &'a [OutgoingOp],
        }
        self.post_with_retry::<serde_json::Value>(
            "/fn/checkpoint/steps",
            &Body {
                app_id,
                fn_id,
                run_id,
                steps,
            },
        )
        .await?;
        Ok(())
    }

    async fn checkpoint_steps_async(
        &self,
        run_id: &str,
        fn_id: &str,
        queue_item_id: &str,
        steps: &[OutgoingOp],
    ) -> Result<(), CheckpointError> {
        #[derive(Serialize)]
        struct Body<'a> {
            run_id: &'a str,
            fn_id: &'a str,
            queue_item_id: &'a str,
            steps: &'a [OutgoingOp],
        }
        self.post_with_retry::<serde_json::Value>(
            "/fn/checkpoint/steps-async",
            &Body {
                run_id,
                fn_id,
                queue_item_id,
                steps,
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct NoopCheckpointClient;

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl CheckpointClient for NoopCheckpointClient {
    async fn checkpoint_new_run(
        &self,
        _req: NewRunRequest<'_>,
    ) -> Result<NewRunResponse, CheckpointError> {
        Ok(NewRunResponse {
            app_id: "app".into(),
            fn_id: "fn".into(),
            token: "token".into(),
        })
    }

    async fn checkpoint_steps(
        &self,
        _app_id: &str,
        _fn_id: &str,
        _run_id: &str,
        _steps: &[OutgoingOp],
    ) -> Result<(), CheckpointError> {
        Ok(())
    }

    async fn checkpoint_steps_async(
        &self,
        _run_id: &str,
        _fn_id: &str,
        _queue_item_id: &str,
        _steps: &[OutgoingOp],
    ) -> Result<(), CheckpointError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
