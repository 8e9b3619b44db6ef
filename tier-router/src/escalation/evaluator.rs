//! Escalation verdict — accept the local result or send the task to the cloud
//!
//! ```text
//! no signals                          → accept, severity none
//! one non-critical signal             → accept, severity minor (warning)
//! any critical signal, or two or more → reject, severity major
//! ```

use serde::{Deserialize, Serialize};

use super::detector::FailureSignal;
use crate::router::EscalationPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Minor,
    Major,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationResult {
    pub accept: bool,
    pub signals: Vec<FailureSignal>,
    pub severity: Severity,
    /// Handed to the cloud tier on rejection.
    pub escalation_context: Option<String>,
}

impl EscalationResult {
    fn accept(signals: &[FailureSignal], severity: Severity) -> Self {
        Self {
            accept: true,
            signals: signals.to_vec(),
            severity,
            escalation_context: None,
        }
    }

    fn reject(signals: &[FailureSignal]) -> Self {
        let joined = signals
            .iter()
            .map(FailureSignal::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            accept: false,
            signals: signals.to_vec(),
            severity: Severity::Major,
            escalation_context: Some(format!("local output rejected: {}", joined)),
        }
    }
}

/// Verdict for a set of detected signals.
pub fn evaluate_escalation(signals: &[FailureSignal]) -> EscalationResult {
    if signals.is_empty() {
        EscalationResult::accept(signals, Severity::None)
    } else if signals.len() >= 2 || signals.iter().any(FailureSignal::is_critical) {
        EscalationResult::reject(signals)
    } else {
        EscalationResult::accept(signals, Severity::Minor)
    }
}

/// Verdict under a delegation level's escalation policy.
///
/// `Strict` rejects on any signal, `Relaxed` only on critical ones, `Never`
/// always accepts. `Standard` and `None` use [`evaluate_escalation`].
pub fn evaluate_with_policy(signals: &[FailureSignal], policy: EscalationPolicy) -> EscalationResult {
    if signals.is_empty() {
        return EscalationResult::accept(signals, Severity::None);
    }
    match policy {
        EscalationPolicy::Standard | EscalationPolicy::None => evaluate_escalation(signals),
        EscalationPolicy::Strict => EscalationResult::reject(signals),
        EscalationPolicy::Relaxed => {
            if signals.iter().any(FailureSignal::is_critical) {
                EscalationResult::reject(signals)
            } else {
                EscalationResult::accept(signals, Severity::Minor)
            }
        }
        EscalationPolicy::Never => EscalationResult::accept(signals, Severity::Minor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::detector::FailureSignal::*;

    #[test]
    fn test_no_signals_accepts() {
        let r = evaluate_escalation(&[]);
        assert!(r.accept);
        assert_eq!(r.severity, Severity::None);
        assert_eq!(r.escalation_context, None);
    }

    #[test]
    fn test_critical_rejects() {
        for signal in [EmptyOutput, Refusal, RepetitionLoop] {
            let r = evaluate_escalation(&[signal]);
            assert!(!r.accept, "{} should reject", signal);
            assert_eq!(r.severity, Severity::Major);
        }
    }

    #[test]
    fn test_single_minor_accepts_with_warning() {
        let r = evaluate_escalation(&[ConfidenceCaveat]);
        assert!(r.accept);
        assert_eq!(r.severity, Severity::Minor);
    }

    #[test]
    fn test_two_minor_reject_with_joined_context() {
        let r = evaluate_escalation(&[ConfidenceCaveat, Incomplete]);
        assert!(!r.accept);
        assert_eq!(r.severity, Severity::Major);
        assert_eq!(
            r.escalation_context.as_deref(),
            Some("local output rejected: confidence_caveat, incomplete")
        );
    }

    #[test]
    fn test_policies() {
        let minor = [PlaceholderMarkers];
        let critical = [Refusal];
        let pair = [PlaceholderMarkers, WrongLanguage];

        assert!(!evaluate_with_policy(&minor, EscalationPolicy::Strict).accept);
        assert!(evaluate_with_policy(&minor, EscalationPolicy::Standard).accept);

        assert!(evaluate_with_policy(&pair, EscalationPolicy::Relaxed).accept);
        assert!(!evaluate_with_policy(&critical, EscalationPolicy::Relaxed).accept);
        assert!(!evaluate_with_policy(&pair, EscalationPolicy::Standard).accept);

        let never = evaluate_with_policy(&critical, EscalationPolicy::Never);
        assert!(never.accept);
        assert_eq!(never.severity, Severity::Minor);

        assert_eq!(
            evaluate_with_policy(&[], EscalationPolicy::Strict).severity,
            Severity::None
        );
    }
}
