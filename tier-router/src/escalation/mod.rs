//! Escalation — judges whether a local model's output is good enough
//!
//! Detection ([`detect_failure_signals`]) is pure text inspection; the verdict
//! ([`evaluate_escalation`]) only looks at which signals fired.

pub mod detector;
pub mod evaluator;

pub use detector::{detect_failure_signals, unknown_imports, FailureDetector, FailureSignal};
pub use evaluator::{evaluate_escalation, evaluate_with_policy, EscalationResult, Severity};
