//! Ollama-style local model backend (`POST /api/generate`, non-streaming)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{ChatBackend, ChatRequest, ChatResponse};
use crate::error::BackendError;

/// HTTP client for a local Ollama server.
pub struct OllamaBackend {
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

/// Subset of the `/api/generate` response we read.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    /// Nanoseconds.
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    done_reason: Option<String>,
}

impl OllamaBackend {
    /// Create a backend for `base_url` (e.g. `http://localhost:11434`).
    pub fn new(
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
            client,
        })
    }

    /// Build from router config: backend URL plus triage model.
    pub fn from_config(config: &crate::config::RouterConfig) -> Result<Self, BackendError> {
        Self::new(&config.backend_url, config.triage_model())
    }

    fn request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.default_model),
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });
        if let Some(ref system) = request.system {
            body["system"] = serde_json::Value::String(system.clone());
        }
        if let Some(ref schema) = request.format {
            body["format"] = schema.clone();
        }
        body
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
        let start = Instant::now();
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(request.timeout)
                } else {
                    BackendError::from(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;

        let duration_ms = parsed
            .total_duration
            .map(|ns| ns / 1_000_000)
            .unwrap_or_else(|| start.elapsed().as_millis() as u64);

        debug!(
            model = request.model.as_deref().unwrap_or(&self.default_model),
            duration_ms,
            done_reason = ?parsed.done_reason,
            "local completion finished"
        );

        Ok(ChatResponse {
            text: parsed.response,
            prompt_tokens: parsed.prompt_eval_count.unwrap_or(0),
            completion_tokens: parsed.eval_count.unwrap_or(0),
            duration_ms,
            thinking: parsed.thinking.filter(|t| !t.is_empty()),
            done_reason: parsed.done_reason,
        })
    }
}
