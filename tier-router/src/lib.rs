//! Tier Router Library
//!
//! Decides, per natural-language coding task, which execution tier handles it:
//! a deterministic command (`no_llm`), a small local model, or a large cloud
//! model. Also judges whether a local model's output is good enough or must
//! escalate.
//!
//! # Entry Points
//!
//! - [`Orchestrator::classify_task`]: level gate → pattern table → heuristic
//!   score → local triage (ambiguous band) or historical learner → ceiling
//! - [`detect_failure_signals`] / [`evaluate_escalation`]: local output quality
//! - [`Orchestrator::decompose_task`]: optional split into subtasks
//! - [`Orchestrator::recommendation`]: what outcome history says about a level
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tier_router::{JsonlHistoryStore, OllamaBackend, Orchestrator, RouterConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = RouterConfig::from_env();
//! let backend = OllamaBackend::from_config(&config)?;
//! let orchestrator = Orchestrator::new(config)
//!     .with_backend(Arc::new(backend))
//!     .with_history(Arc::new(JsonlHistoryStore::new(".tier-router-history.jsonl")));
//!
//! let decision = orchestrator.classify_task("add a docstring to parse_args", None).await;
//! println!("{}", decision.summary());
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod backend;
pub mod config;
pub mod decompose;
pub mod error;
pub mod escalation;
pub mod learner;
pub mod router;
pub mod triage;

// Re-export backend types
pub use backend::{ChatBackend, ChatRequest, ChatResponse, OllamaBackend};

// Re-export configuration and errors
pub use config::{ConfigOverrides, RouterConfig, MAX_DELEGATION_LEVEL};
pub use error::{BackendError, ConfigError, HistoryError, HistoryResult};

// Re-export routing types
pub use router::{
    extract_signals, in_ambiguous_zone, match_patterns, score, score_to_level, ClassificationLayer,
    EscalationPolicy, LevelConfig, Orchestrator, Route, RoutingDecision, ScoreBreakdown,
    TaskSignals,
};

// Re-export triage types
pub use triage::{decode_triage_reply, TriageCategory, TriageClassifier, TriageResult};

// Re-export learner types
pub use learner::{
    fingerprint, HistoricalLearner, HistoricalRecord, HistoryStore, HistorySummary,
    InMemoryHistoryStore, JsonlHistoryStore, LearnerRecommendation, Outcome,
};

// Re-export decomposition types
pub use decompose::{DecompositionResult, Subtask, TaskDecomposer};

// Re-export escalation types
pub use escalation::{
    detect_failure_signals, evaluate_escalation, evaluate_with_policy, EscalationResult,
    FailureDetector, FailureSignal, Severity,
};
