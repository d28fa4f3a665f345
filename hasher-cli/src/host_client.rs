//! Typed JSON client for the supervised host service.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::HOST_HEALTH_PATH;

/// Health report from `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub using_asic: bool,
    #[serde(default)]
    pub chip_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub text: String,
    pub target_token: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub epochs: u32,
    pub lr: f64,
    pub batch_size: u32,
    pub samples: Vec<TrainingSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResponse {
    pub epoch: u32,
    pub loss: f64,
    pub accuracy: f64,
    pub latency_ms: f64,
    #[serde(default)]
    pub using_asic: bool,
}

/// Client bound to a resolved host port. Health probes carry a 5 second
/// timeout; inference and training calls are unbounded and the caller
/// decides how long to wait.
#[derive(Debug, Clone)]
pub struct HostClient {
    base_url: String,
    http: reqwest::Client,
}

impl HostClient {
    pub fn new(port: u16) -> Self {
        Self {
            base_url: format!("http://localhost:{port}"),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_health(&self) -> Result<HealthResponse> {
        let url = format!("{}{HOST_HEALTH_PATH}", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("host health probe failed")?;
        let response = response
            .error_for_status()
            .context("host health returned an error status")?;
        Ok(response.json().await?)
    }

    pub async fn crypto_transformer(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let url = format!("{}/api/v1/inference/crypto_transformer", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .context("crypto transformer call failed")?
            .error_for_status()
            .context("crypto transformer returned an error status")?;
        Ok(response.json().await?)
    }

    pub async fn training(&self, request: &TrainingRequest) -> Result<TrainingResponse> {
        let url = format!("{}/api/v1/training", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .context("training call failed")?
            .error_for_status()
            .context("training returned an error status")?;
        Ok(response.json().await?)
    }
}
