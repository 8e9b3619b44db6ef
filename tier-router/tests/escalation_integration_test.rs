//! Integration tests for local output evaluation
//!
//! Feeds realistic model outputs through detection and the verdict, both
//! directly and through the orchestrator's per-level policy.

use tier_router::{
    detect_failure_signals, evaluate_escalation, evaluate_with_policy, EscalationPolicy,
    FailureDetector, FailureSignal, Orchestrator, RouterConfig, Severity,
};

const GOOD_RUST: &str = r#"
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
"#;

/// Test: verdict table for the documented signal sets
#[test]
fn test_verdict_table() {
    let none = evaluate_escalation(&[]);
    assert!(none.accept);
    assert_eq!(none.severity, Severity::None);

    let empty = evaluate_escalation(&[FailureSignal::EmptyOutput]);
    assert!(!empty.accept);
    assert_eq!(empty.severity, Severity::Major);

    let caveat = evaluate_escalation(&[FailureSignal::ConfidenceCaveat]);
    assert!(caveat.accept);
    assert_eq!(caveat.severity, Severity::Minor);

    let two = evaluate_escalation(&[FailureSignal::ConfidenceCaveat, FailureSignal::Incomplete]);
    assert!(!two.accept);
    assert_eq!(two.severity, Severity::Major);
    assert!(two.escalation_context.unwrap().contains("incomplete"));
}

/// Test: empty output yields exactly one signal
#[test]
fn test_empty_output_only_signal() {
    assert_eq!(detect_failure_signals("", None), vec![FailureSignal::EmptyOutput]);
    assert_eq!(
        detect_failure_signals("  ok  \n", Some("rust")),
        vec![FailureSignal::EmptyOutput]
    );
}

/// Test: well-formed code in the expected language passes
#[test]
fn test_good_output_accepted() {
    let signals = detect_failure_signals(GOOD_RUST, Some("rust"));
    assert!(signals.is_empty(), "{signals:?}");
    assert!(evaluate_escalation(&signals).accept);
}

/// Test: a refusal is rejected outright
#[test]
fn test_refusal_rejected() {
    let output = "As an AI language model, I cannot write code that accesses the filesystem.";
    let result = evaluate_escalation(&detect_failure_signals(output, Some("python")));
    assert!(!result.accept);
    assert!(result.signals.contains(&FailureSignal::Refusal));
}

/// Test: a looping generation is rejected
#[test]
fn test_repetition_loop_rejected() {
    let line = "    result.append(compute_value(index, offset, scale))\n";
    let output = format!("def build():\n    result = []\n{}", line.repeat(4));
    let result = evaluate_escalation(&detect_failure_signals(&output, Some("python")));
    assert!(!result.accept);
    assert!(result.signals.contains(&FailureSignal::RepetitionLoop));
}

/// Test: python answer to a rust request is flagged
#[test]
fn test_wrong_language_flagged() {
    let output = "import os\n\ndef median(values):\n    values = sorted(values)\n    return values[len(values) // 2]\n";
    let signals = detect_failure_signals(output, Some("rust"));
    assert!(signals.contains(&FailureSignal::WrongLanguage), "{signals:?}");
}

/// Test: truncated JSON is both incomplete and a syntax error
#[test]
fn test_truncated_json() {
    let output = r#"{"users": [{"name": "ada", "roles": ["admin", {"scope": "#;
    let signals = detect_failure_signals(output, Some("json"));
    assert!(signals.contains(&FailureSignal::Incomplete));
    assert!(signals.contains(&FailureSignal::SyntaxError));
    assert!(!evaluate_escalation(&signals).accept);
}

/// Test: policies per delegation level
#[test]
fn test_policy_by_level() {
    let placeholder = "fn parse(input: &str) -> u32 {\n    // TODO: real parsing\n    0\n}\n";
    let orch = Orchestrator::new(RouterConfig::default());

    assert!(!orch.evaluate_output(placeholder, Some("rust"), Some(1)).accept, "strict");
    assert!(orch.evaluate_output(placeholder, Some("rust"), Some(2)).accept, "standard");
    assert!(orch.evaluate_output(placeholder, Some("rust"), Some(4)).accept, "relaxed");
    assert!(orch.evaluate_output("", None, Some(5)).accept, "never");
    assert!(!orch.evaluate_output("", None, Some(4)).accept, "relaxed rejects critical");

    let signals = [FailureSignal::PlaceholderMarkers, FailureSignal::ConfidenceCaveat];
    assert!(evaluate_with_policy(&signals, EscalationPolicy::Relaxed).accept);
    assert!(!evaluate_with_policy(&signals, EscalationPolicy::Standard).accept);
}

/// Test: import allow-list catches invented packages
#[test]
fn test_hallucinated_imports() {
    let output = "use serde::Serialize;\nuse quantum_json::Magic;\n\nfn main() { println!(\"hi\"); }\n";
    let detector = FailureDetector::new().with_known_imports(["serde"]);
    let signals = detector.detect(output, Some("rust"));
    assert_eq!(signals, vec![FailureSignal::HallucinatedImports]);

    let orch = Orchestrator::new(RouterConfig::default()).with_detector(detector);
    let result = orch.evaluate_output(output, Some("rust"), Some(1));
    assert!(!result.accept);
}

/// Test: signals serialize with their snake_case names
#[test]
fn test_signal_wire_names() {
    let json = serde_json::to_string(&evaluate_escalation(&[FailureSignal::ConfidenceCaveat])).unwrap();
    assert!(json.contains("\"confidence_caveat\""));
    assert!(json.contains("\"severity\":\"minor\""));
}
