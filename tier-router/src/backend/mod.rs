//! Chat-completion backend abstraction
//!
//! Triage and decomposition each make one outbound call to a local model.
//! They talk to it through [`ChatBackend`] so the pipeline can be exercised
//! with in-memory fakes and so the HTTP transport stays replaceable.
//!
//! ```text
//! TriageClassifier ──┐
//!                    ├─► ChatBackend::complete(ChatRequest) ─► ChatResponse
//! TaskDecomposer ────┘         │
//!                              └─ OllamaBackend (reqwest, /api/generate)
//! ```

pub mod ollama;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

pub use ollama::OllamaBackend;

/// A single non-streaming completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User prompt.
    pub prompt: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// Model tag; `None` lets the backend pick its default.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Hard deadline for the whole call.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// JSON schema the output should follow, when the backend supports it.
    pub format: Option<serde_json::Value>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: None,
            temperature: 0.1,
            max_tokens: 256,
            timeout: Duration::from_secs(5),
            format: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_format(mut self, schema: serde_json::Value) -> Self {
        self.format = Some(schema);
        self
    }
}

/// Completion returned by a backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Main response text.
    pub text: String,
    /// Prompt tokens consumed.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
    /// Wall-clock duration of the call.
    pub duration_ms: u64,
    /// Reasoning trace, for models that emit one separately.
    pub thinking: Option<String>,
    /// Why generation stopped ("stop", "length", ...).
    pub done_reason: Option<String>,
}

impl ChatResponse {
    /// Text to decode, falling back to the thinking trace.
    ///
    /// Reasoning models sometimes return an empty `text` and leave the answer
    /// at the end of `thinking`. In that case the last fenced code block is
    /// preferred, then the last non-empty paragraph.
    pub fn usable_text(&self) -> &str {
        if !self.text.trim().is_empty() {
            return &self.text;
        }
        match self.thinking.as_deref() {
            Some(thinking) if !thinking.trim().is_empty() => {
                last_code_block(thinking).unwrap_or_else(|| last_paragraph(thinking))
            }
            _ => "",
        }
    }

    /// Whether generation was cut off by the token limit.
    pub fn truncated(&self) -> bool {
        self.done_reason.as_deref() == Some("length")
    }
}

/// Anything that can answer a [`ChatRequest`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Run one completion. Implementations should honor `request.timeout`;
    /// callers additionally bound the call with `tokio::time::timeout`.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, BackendError>;
}

/// Body of the last ``` fenced block, without the info string.
fn last_code_block(text: &str) -> Option<&str> {
    let close = text.rfind("```")?;
    let open = text[..close].rfind("```")?;
    let inner = &text[open + 3..close];
    // drop the language tag line ("```json")
    let body = match inner.find('\n') {
        Some(nl) if !inner[..nl].trim().contains(' ') => &inner[nl + 1..],
        _ => inner,
    };
    let body = body.trim();
    (!body.is_empty()).then_some(body)
}

fn last_paragraph(text: &str) -> &str {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .last()
        .unwrap_or("")
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
