//! API client for communicating with a node's JVM agent

use agent_lib::models::{JvmSnapshot, NodePressureReport};
use agent_lib::oom::OomContext;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the agent HTTP API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn list_jvms(&self) -> Result<Vec<JvmSnapshot>> {
        self.get("v1/jvms").await
    }

    pub async fn get_jvm(&self, pid: u32) -> Result<JvmSnapshot> {
        self.get(&format!("v1/jvms/{}", pid)).await
    }

    pub async fn pressure(&self) -> Result<NodePressureReport> {
        self.get("v1/pressure").await
    }

    pub async fn ooms(&self) -> Result<Vec<OomContext>> {
        self.get("v1/ooms").await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
