//! Local Triage — a small local model's second opinion on ambiguous tasks
//!
//! Only consulted when the heuristic score lands in the ambiguous band. The
//! model is asked for one of five ordered categories under a JSON schema; if
//! it ignores the schema the reply is scanned for a category name instead.
//! Nothing here ever fails outward: any problem yields [`TriageResult::fallback`].

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{ChatBackend, ChatRequest};
use crate::config::RouterConfig;

/// Model confidence is never taken at face value.
pub const MIN_CONFIDENCE: f64 = 0.3;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Confidence assigned when the category came from a text scan.
const SCANNED_CONFIDENCE: f64 = 0.5;

const SYSTEM_PROMPT: &str =
    "You route coding tasks by difficulty. Answer with the JSON object only, no explanation.";

/// Ordered difficulty category reported by the triage model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriageCategory {
    Trivial,
    Simple,
    Moderate,
    Complex,
    Expert,
}

impl TriageCategory {
    pub const ALL: [TriageCategory; 5] = [
        Self::Trivial,
        Self::Simple,
        Self::Moderate,
        Self::Complex,
        Self::Expert,
    ];

    /// Complexity level for this category.
    pub fn level(&self) -> u8 {
        match self {
            Self::Trivial => 1,
            Self::Simple => 2,
            Self::Moderate => 3,
            Self::Complex => 5,
            Self::Expert => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::Expert => "expert",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    fn examples(&self) -> &'static str {
        match self {
            Self::Trivial => "rename a variable, fix a typo, add a docstring, format code",
            Self::Simple => "small helper function, unit test for one function, explain a snippet",
            Self::Moderate => "CRUD endpoint, single-file feature, bug fix with a clear repro",
            Self::Complex => "multi-file refactor, concurrency bug, performance work",
            Self::Expert => "system architecture, security-sensitive code, data migrations",
        }
    }
}

impl std::fmt::Display for TriageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a [`TriageResult`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageSource {
    /// Reply parsed as schema-conforming JSON.
    Structured,
    /// Category name found in free text.
    TextScan,
    /// Backend failed or reply was unusable.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub category: TriageCategory,
    pub level: u8,
    /// Clamped to [`MIN_CONFIDENCE`, `MAX_CONFIDENCE`].
    pub confidence: f64,
    pub source: TriageSource,
}

impl TriageResult {
    fn new(category: TriageCategory, confidence: f64, source: TriageSource) -> Self {
        Self {
            category,
            level: category.level(),
            confidence: confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
            source,
        }
    }

    /// Safe default: moderate, level 3, lowest confidence.
    pub fn fallback() -> Self {
        Self::new(TriageCategory::Moderate, MIN_CONFIDENCE, TriageSource::Fallback)
    }

    pub fn is_fallback(&self) -> bool {
        self.source == TriageSource::Fallback
    }
}

/// Output shape requested from the model.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TriageOutput {
    pub category: TriageCategory,
    /// 0-1.
    pub confidence: f64,
}

/// JSON schema for [`TriageOutput`], passed as the request format.
pub fn output_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(TriageOutput)).unwrap_or(serde_json::Value::Null)
}

static CATEGORY_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(trivial|simple|moderate|complex|expert)\b")
        .expect("CATEGORY_WORD regex should compile")
});

/// Decode a model reply in two stages: strict JSON, then a scan for the
/// earliest category name. `None` when neither stage finds a category.
pub fn decode_triage_reply(text: &str) -> Option<TriageResult> {
    decode_structured(text).or_else(|| decode_scanned(text))
}

fn decode_structured(text: &str) -> Option<TriageResult> {
    let body = strip_code_fence(text.trim());
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let category = TriageCategory::from_name(value.get("category")?.as_str()?)?;
    let confidence = match value.get("confidence") {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .unwrap_or(MIN_CONFIDENCE);
    Some(TriageResult::new(category, confidence, TriageSource::Structured))
}

fn decode_scanned(text: &str) -> Option<TriageResult> {
    let word = CATEGORY_WORD.find(text)?;
    let category = TriageCategory::from_name(word.as_str())?;
    Some(TriageResult::new(category, SCANNED_CONFIDENCE, TriageSource::TextScan))
}

/// Drop a surrounding ```` ```json ```` fence if present.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn build_prompt(description: &str) -> String {
    let mut prompt = String::from(
        "Classify how difficult the following coding task is for a small local model.\n\
         Pick exactly one category:\n",
    );
    for category in TriageCategory::ALL {
        prompt.push_str(&format!("- {}: {}\n", category.name(), category.examples()));
    }
    prompt.push_str(
        "\nRespond with JSON: {\"category\": \"<category>\", \"confidence\": <0-1>}\n\nTask:\n",
    );
    prompt.push_str(description);
    prompt
}

/// Classifier bound to one backend and model.
pub struct TriageClassifier {
    backend: Arc<dyn ChatBackend>,
    model: String,
    timeout: Duration,
}

impl TriageClassifier {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Model and timeout taken from config.
    pub fn from_config(backend: Arc<dyn ChatBackend>, config: &RouterConfig) -> Self {
        Self::new(backend, config.triage_model()).with_timeout(config.triage_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the local model. Never fails; degraded cases return the fallback.
    pub async fn triage(&self, description: &str) -> TriageResult {
        let request = ChatRequest::new(build_prompt(description))
            .with_system(SYSTEM_PROMPT)
            .with_model(self.model.clone())
            .with_temperature(0.0)
            .with_max_tokens(64)
            .with_timeout(self.timeout)
            .with_format(output_schema());

        let response = match tokio::time::timeout(self.timeout, self.backend.complete(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(backend = self.backend.name(), error = %e, "triage backend failed, using fallback");
                return TriageResult::fallback();
            }
            Err(_) => {
                warn!(
                    backend = self.backend.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "triage timed out, using fallback"
                );
                return TriageResult::fallback();
            }
        };

        if response.truncated() {
            warn!(
                backend = self.backend.name(),
                completion_tokens = response.completion_tokens,
                "triage reply hit the token limit"
            );
        }

        match decode_triage_reply(response.usable_text()) {
            Some(result) => {
                debug!(
                    category = %result.category,
                    confidence = result.confidence,
                    source = ?result.source,
                    "triage decoded"
                );
                result
            }
            None => {
                warn!(reply_len = response.text.len(), "triage reply had no category, using fallback");
                TriageResult::fallback()
            }
        }
    }
}
