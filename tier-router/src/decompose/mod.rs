//! Task Decomposer — asks the local model to split a task into subtasks
//!
//! Off by default. Every failure mode (backend down, timeout, malformed JSON,
//! nothing usable) collapses to `decomposed: false` with a reason that says
//! which one happened. A single surviving subtask also means "don't split":
//! the task was already atomic.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{ChatBackend, ChatRequest};
use crate::config::RouterConfig;

pub const MIN_SUBTASK_LEVEL: u8 = 1;
pub const MAX_SUBTASK_LEVEL: u8 = 6;
/// Level assumed when the model omits one.
const DEFAULT_SUBTASK_LEVEL: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub description: String,
    /// Clamped to 1-6.
    pub estimated_level: u8,
    /// Ids of sibling subtasks that must finish first.
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompositionResult {
    pub decomposed: bool,
    pub subtasks: Vec<Subtask>,
    pub reason: String,
}

impl DecompositionResult {
    fn not_decomposed(reason: impl Into<String>) -> Self {
        Self {
            decomposed: false,
            subtasks: Vec::new(),
            reason: reason.into(),
        }
    }
}

/// Shape requested from the model.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DecompositionOutput {
    pub subtasks: Vec<SubtaskOutput>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SubtaskOutput {
    pub id: String,
    pub description: String,
    /// 1 (trivial) to 5 (hard).
    pub estimated_level: u8,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

pub fn output_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(DecompositionOutput))
        .unwrap_or(serde_json::Value::Null)
}

/// Lenient view of what models actually send back.
#[derive(Debug, Deserialize)]
struct RawDecomposition {
    subtasks: Option<Vec<RawSubtask>>,
}

#[derive(Debug, Deserialize)]
struct RawSubtask {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "task", alias = "title")]
    description: Option<String>,
    #[serde(default, alias = "level", alias = "complexity")]
    estimated_level: Option<serde_json::Value>,
    #[serde(default, alias = "dependencies", alias = "depends")]
    depends_on: Option<Vec<serde_json::Value>>,
}

fn value_to_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Level from a number or numeric string, clamped to 1-6.
fn value_to_level(value: Option<&serde_json::Value>) -> u8 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => {
            v.round()
                .clamp(f64::from(MIN_SUBTASK_LEVEL), f64::from(MAX_SUBTASK_LEVEL)) as u8
        }
        _ => DEFAULT_SUBTASK_LEVEL,
    }
}

/// Slice of the first balanced top-level `{...}` in `text`, skipping braces
/// inside JSON strings. `None` if no object closes.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// First `t{n}` at or after `start` that is not taken.
fn free_id(start: usize, taken: impl Fn(&str) -> bool) -> String {
    let mut n = start;
    loop {
        let candidate = format!("t{}", n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Turn a model reply into a decomposition result.
pub fn parse_decomposition(text: &str) -> DecompositionResult {
    let Some(object) = extract_first_json_object(text) else {
        return DecompositionResult::not_decomposed("no JSON object in model response");
    };
    let raw: RawDecomposition = match serde_json::from_str(object) {
        Ok(raw) => raw,
        Err(e) => {
            return DecompositionResult::not_decomposed(format!("malformed decomposition JSON: {}", e))
        }
    };
    let Some(raw_subtasks) = raw.subtasks else {
        return DecompositionResult::not_decomposed("malformed decomposition JSON: missing subtasks");
    };
    if raw_subtasks.is_empty() {
        return DecompositionResult::not_decomposed("model returned an empty subtask list");
    }

    // ids the model chose; generated ids must not shadow any of them
    let supplied: HashSet<String> = raw_subtasks
        .iter()
        .filter_map(|r| r.id.as_ref().and_then(value_to_id))
        .collect();
    let mut assigned: HashSet<String> = HashSet::new();

    let mut subtasks: Vec<Subtask> = Vec::new();
    let mut pending_deps: Vec<Vec<String>> = Vec::new();
    for raw in raw_subtasks {
        let Some(description) = raw
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
        else {
            continue;
        };
        // a repeated id is renumbered; dependencies keep pointing at the first holder
        let id = match raw.id.as_ref().and_then(value_to_id) {
            Some(id) if !assigned.contains(&id) => id,
            _ => free_id(subtasks.len() + 1, |candidate| {
                supplied.contains(candidate) || assigned.contains(candidate)
            }),
        };
        assigned.insert(id.clone());
        pending_deps.push(
            raw.depends_on
                .unwrap_or_default()
                .iter()
                .filter_map(value_to_id)
                .collect(),
        );
        subtasks.push(Subtask {
            id,
            description,
            estimated_level: value_to_level(raw.estimated_level.as_ref()),
            depends_on: Vec::new(),
        });
    }

    // dependencies must point at a sibling other than the subtask itself
    let ids: HashSet<String> = subtasks.iter().map(|s| s.id.clone()).collect();
    for (subtask, deps) in subtasks.iter_mut().zip(pending_deps) {
        subtask.depends_on = deps
            .into_iter()
            .filter(|d| ids.contains(d) && *d != subtask.id)
            .collect();
    }

    match subtasks.len() {
        0 => DecompositionResult::not_decomposed("no subtask had a description"),
        1 => DecompositionResult::not_decomposed("task is already atomic (single subtask)"),
        n => DecompositionResult {
            decomposed: true,
            subtasks,
            reason: format!("split into {} subtasks", n),
        },
    }
}

const SYSTEM_PROMPT: &str =
    "You plan coding work. Answer with the JSON object only, no explanation.";

fn build_prompt(description: &str) -> String {
    format!(
        "Break the following coding task into the smallest set of independent subtasks.\n\
         For each subtask give an id, a one-line description, an estimated_level from \
         1 (trivial) to 5 (hard), and depends_on: the ids it must wait for.\n\
         If the task is already small, return a single subtask.\n\
         Respond with JSON: {{\"subtasks\": [{{\"id\": \"t1\", \"description\": \"...\", \
         \"estimated_level\": 2, \"depends_on\": []}}]}}\n\nTask:\n{}",
        description
    )
}

pub struct TaskDecomposer {
    backend: Option<Arc<dyn ChatBackend>>,
    enabled: bool,
    model: String,
    timeout: Duration,
}

impl TaskDecomposer {
    pub fn new(backend: Option<Arc<dyn ChatBackend>>, model: impl Into<String>) -> Self {
        Self {
            backend,
            enabled: false,
            model: model.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(backend: Option<Arc<dyn ChatBackend>>, config: &RouterConfig) -> Self {
        Self::new(backend, config.local_model.clone())
            .with_enabled(config.decomposition_enabled)
            .with_timeout(config.decomposition_timeout())
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Split `description` into subtasks. Never fails.
    pub async fn decompose(&self, description: &str) -> DecompositionResult {
        if !self.enabled {
            return DecompositionResult::not_decomposed("decomposition disabled");
        }
        let Some(backend) = self.backend.as_ref() else {
            return DecompositionResult::not_decomposed("no local backend configured");
        };

        let request = ChatRequest::new(build_prompt(description))
            .with_system(SYSTEM_PROMPT)
            .with_model(self.model.clone())
            .with_temperature(0.1)
            .with_max_tokens(1024)
            .with_timeout(self.timeout)
            .with_format(output_schema());

        let response = match tokio::time::timeout(self.timeout, backend.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(backend = backend.name(), error = %e, "decomposition backend failed");
                return DecompositionResult::not_decomposed(format!("backend unavailable: {}", e));
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "decomposition timed out");
                return DecompositionResult::not_decomposed(format!(
                    "decomposition timed out after {}ms",
                    self.timeout.as_millis()
                ));
            }
        };

        let mut result = parse_decomposition(response.usable_text());
        if response.truncated() {
            warn!(
                backend = backend.name(),
                completion_tokens = response.completion_tokens,
                "decomposition reply hit the token limit"
            );
            if !result.decomposed {
                result.reason = format!("{} (reply truncated at token limit)", result.reason);
            }
        }
        debug!(
            decomposed = result.decomposed,
            subtasks = result.subtasks.len(),
            reason = %result.reason,
            "decomposition parsed"
        );
        result
    }
}
