//! Tier Router — decides which execution tier handles a task
//!
//! Cascade, cheapest layer first:
//!
//! ```text
//! level gate (0 → cloud, 5 → local)
//!   │
//!   ▼
//! static pattern table ──match──────────────────────────────┐
//!   │ no match                                              │
//!   ▼                                                       │
//! signal extraction → complexity score                      │
//!   │                                                       │
//!   ├─ score in [0.50, 0.65] + triage on ─→ local triage ───┤
//!   │                                                       │
//!   └─ otherwise ─→ heuristic level ± historical learner ───┤
//!                                                           ▼
//!                                          ceiling gate (levels 1-4)
//! ```

pub mod levels;
pub mod orchestrator;
pub mod patterns;
pub mod scorer;
pub mod signals;
pub mod types;

pub use levels::{EscalationPolicy, LevelConfig};
pub use orchestrator::Orchestrator;
pub use patterns::{match_patterns, validate_table, PatternMatch, PatternRule, PATTERN_RULES};
pub use scorer::{in_ambiguous_zone, score, score_to_level, ScoreBreakdown};
pub use signals::extract_signals;
pub use types::{
    ClassificationLayer, CostOfWrong, Novelty, OutputType, Reversibility, Route, RoutingDecision,
    Scope, TaskSignals,
};
