//! Shared routing types: routes, layers, decisions and the task feature vector.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::levels::EscalationPolicy;

/// Execution tier a task is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Deterministic command, no model needed.
    NoLlm,
    /// Small local model.
    Local,
    /// Large cloud model.
    Cloud,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoLlm => write!(f, "no_llm"),
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Which layer of the cascade produced a decision.
///
/// Serialized as `"level_gate"` or the layer number (1 = pattern table,
/// 2 = heuristic score, 3 = local triage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassificationLayer {
    LevelGate,
    PatternTable,
    Heuristic,
    Triage,
}

impl ClassificationLayer {
    /// Numeric tag, `None` for the level gate.
    pub fn number(&self) -> Option<u8> {
        match self {
            Self::LevelGate => None,
            Self::PatternTable => Some(1),
            Self::Heuristic => Some(2),
            Self::Triage => Some(3),
        }
    }
}

impl std::fmt::Display for ClassificationLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.number() {
            None => write!(f, "level_gate"),
            Some(n) => write!(f, "{}", n),
        }
    }
}

impl Serialize for ClassificationLayer {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.number() {
            None => s.serialize_str("level_gate"),
            Some(n) => s.serialize_u8(n),
        }
    }
}

impl<'de> Deserialize<'de> for ClassificationLayer {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u8),
            Tag(String),
        }
        match Repr::deserialize(d)? {
            Repr::Number(1) => Ok(Self::PatternTable),
            Repr::Number(2) => Ok(Self::Heuristic),
            Repr::Number(3) => Ok(Self::Triage),
            Repr::Tag(t) if t == "level_gate" => Ok(Self::LevelGate),
            Repr::Number(n) => Err(serde::de::Error::custom(format!("unknown layer {}", n))),
            Repr::Tag(t) => Err(serde::de::Error::custom(format!("unknown layer {}", t))),
        }
    }
}

/// Final routing verdict for one task description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub route: Route,
    /// Delegation level in effect for this call.
    pub delegation_level: u8,
    /// Task complexity, 0-6.
    pub complexity: u8,
    /// Confidence in the decision, 0-1.
    pub confidence: f64,
    pub reason: String,
    pub classification_layer: ClassificationLayer,
    pub escalation_policy: EscalationPolicy,
    /// Suggested model tag for the chosen route, if any.
    pub suggested_model: Option<String>,
    /// Category key used for specialist lookup.
    pub specialist: Option<String>,
    /// Heuristic score, when the scorer ran.
    pub score: Option<f64>,
    /// Whether outcome history changed the level or confidence.
    #[serde(default)]
    pub learner_applied: bool,
}

impl RoutingDecision {
    /// Whether the task stays off the cloud tier.
    pub fn is_local(&self) -> bool {
        matches!(self.route, Route::NoLlm | Route::Local)
    }

    /// Compact summary for logging
    pub fn summary(&self) -> String {
        format!(
            "route={} complexity={}/6 confidence={:.2} layer={} level={}",
            self.route,
            self.complexity,
            self.confidence,
            self.classification_layer,
            self.delegation_level
        )
    }
}

/// How much of a codebase a task touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Function,
    File,
    Module,
    System,
}

/// Kind of artifact the task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    CodeGen,
    CodeMod,
    Analysis,
    Text,
    DataTransform,
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CodeGen => write!(f, "code_gen"),
            Self::CodeMod => write!(f, "code_mod"),
            Self::Analysis => write!(f, "analysis"),
            Self::Text => write!(f, "text"),
            Self::DataTransform => write!(f, "data_transform"),
        }
    }
}

/// How far the task is from well-trodden ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Novelty {
    Boilerplate,
    KnownPattern,
    Adaptation,
    Novel,
}

/// Blast radius of a wrong answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostOfWrong {
    Trivial,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for CostOfWrong {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trivial => write!(f, "trivial"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// How easily a bad change can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reversibility {
    EasyUndo,
    NeedsReview,
    HardToReverse,
}

/// Feature vector derived from a task description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSignals {
    /// Distinct file references found in the text.
    pub file_refs: BTreeSet<String>,
    pub estimated_context_tokens: u32,
    pub scope: Scope,
    /// 0-1.
    pub reasoning_depth: f64,
    pub requires_tool_chain: bool,
    pub output_type: OutputType,
    pub novelty: Novelty,
    pub cost_of_wrong: CostOfWrong,
    pub reversibility: Reversibility,
    /// 0-1, 0.5 when unknown.
    pub language_familiarity: f64,
    pub detected_language: Option<String>,
    pub has_examples: bool,
    pub has_tests: bool,
}

impl TaskSignals {
    pub fn file_ref_count(&self) -> usize {
        self.file_refs.len()
    }

    /// Task-type key used to group outcome history.
    pub fn task_type(&self) -> String {
        self.output_type.to_string()
    }
}
