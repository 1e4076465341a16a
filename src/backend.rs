//! Analysis backend implementations.
//!
//! Concrete [`AnalysisBackend`]s selected by `[backend].provider`:
//! - **[`DisabledBackend`]**: fails every call; every chunk degrades.
//! - **[`OpenAIBackend`]**: OpenAI-compatible chat completions API.
//! - **[`FileBackend`]**: replays a captured response from disk.
//!
//! # Retry Strategy
//!
//! The OpenAI backend does not retry unless `backend.max_retries > 0`.
//! When retries are enabled it uses exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use casecheck_core::analyze::AnalysisBackend;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BackendConfig;

/// Instantiate the backend named by the configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn AnalysisBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "openai" => Ok(Arc::new(OpenAIBackend::new(config)?)),
        "file" => {
            let path = config
                .response_path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("backend.response_path required for file provider"))?;
            Ok(Arc::new(FileBackend::new(path)))
        }
        other => bail!("Unknown backend provider: {}", other),
    }
}

// ============ Disabled Backend ============

/// Backend used when `backend.provider = "disabled"`.
pub struct DisabledBackend;

#[async_trait]
impl AnalysisBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn analyze(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        bail!("Analysis backend is disabled. Set [backend] provider in config.")
    }
}

// ============ File Backend ============

/// Returns the content of a file for every call.
///
/// Lets a captured analysis be replayed without network access. The file
/// is re-read on each call so it can be edited between runs.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl AnalysisBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn analyze(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read response file: {}", self.path.display()))
    }
}

// ============ OpenAI Backend ============

/// Backend using an OpenAI-compatible `POST {base_url}/chat/completions`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAIBackend {
    /// # Errors
    ///
    /// Returns an error if `model` is not set in config, if
    /// `OPENAI_API_KEY` is not in the environment, or if the HTTP client
    /// cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("backend.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AnalysisBackend for OpenAIBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Analysis API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Analysis API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Analysis call failed after retries")))
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}
