//! Complexity scorer — weighted sum over [`TaskSignals`] mapped to a level
//!
//! ```text
//!   score   0.00 ─ 0.15 ─ 0.30 ─ 0.50 ─ 0.65 ─ 0.80 ─ 1.00
//!   level      1      2      3      4      5      6
//!                                 └ ambiguous ┘
//! ```
//!
//! The ambiguous band is where the local triage model gets a second opinion.

use serde::{Deserialize, Serialize};

use super::types::{CostOfWrong, Novelty, Scope, TaskSignals};

/// Inclusive score band handed to triage.
pub const AMBIGUOUS_ZONE: (f64, f64) = (0.50, 0.65);

/// Level cut-offs: a score below `LEVEL_THRESHOLDS[i]` maps to level `i + 1`.
const LEVEL_THRESHOLDS: [f64; 5] = [0.15, 0.30, 0.50, 0.65, 0.80];

const TOOL_CHAIN_WEIGHT: f64 = 0.3;
const CONTEXT_TOKENS_SCALE: f64 = 32_000.0;
const CONTEXT_PENALTY_CAP: f64 = 0.4;
const FAMILIARITY_WEIGHT: f64 = 0.1;
const EXAMPLES_BONUS: f64 = 0.1;
const TESTS_BONUS: f64 = 0.1;

/// Every term of the weighted sum, before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub scope: f64,
    pub reasoning_depth: f64,
    pub tool_chain: f64,
    pub novelty: f64,
    pub cost_of_wrong: f64,
    pub context_penalty: f64,
    /// Subtracted.
    pub familiarity_bonus: f64,
    /// Subtracted.
    pub examples_bonus: f64,
    /// Subtracted.
    pub tests_bonus: f64,
}

impl ScoreBreakdown {
    pub fn from_signals(signals: &TaskSignals) -> Self {
        Self {
            scope: scope_weight(signals.scope),
            reasoning_depth: signals.reasoning_depth.clamp(0.0, 1.0),
            tool_chain: if signals.requires_tool_chain { TOOL_CHAIN_WEIGHT } else { 0.0 },
            novelty: novelty_weight(signals.novelty),
            cost_of_wrong: cost_weight(signals.cost_of_wrong),
            context_penalty: (f64::from(signals.estimated_context_tokens) / CONTEXT_TOKENS_SCALE
                * 0.5)
                .min(CONTEXT_PENALTY_CAP),
            familiarity_bonus: signals.language_familiarity.clamp(0.0, 1.0) * FAMILIARITY_WEIGHT,
            examples_bonus: if signals.has_examples { EXAMPLES_BONUS } else { 0.0 },
            tests_bonus: if signals.has_tests { TESTS_BONUS } else { 0.0 },
        }
    }

    /// Unclamped sum.
    pub fn raw(&self) -> f64 {
        self.scope + self.reasoning_depth + self.tool_chain + self.novelty + self.cost_of_wrong
            + self.context_penalty
            - self.familiarity_bonus
            - self.examples_bonus
            - self.tests_bonus
    }

    /// Final score in [0, 1].
    pub fn total(&self) -> f64 {
        self.raw().clamp(0.0, 1.0)
    }
}

/// Complexity score in [0, 1].
pub fn score(signals: &TaskSignals) -> f64 {
    ScoreBreakdown::from_signals(signals).total()
}

/// Map a score to a complexity level 1-6. Monotonic non-decreasing.
pub fn score_to_level(score: f64) -> u8 {
    LEVEL_THRESHOLDS
        .iter()
        .position(|&t| score < t)
        .map(|i| i as u8 + 1)
        .unwrap_or(6)
}

/// Whether a score falls in the triage band (inclusive on both ends).
pub fn in_ambiguous_zone(score: f64) -> bool {
    (AMBIGUOUS_ZONE.0..=AMBIGUOUS_ZONE.1).contains(&score)
}

fn scope_weight(scope: Scope) -> f64 {
    match scope {
        Scope::Function => 0.1,
        Scope::File => 0.3,
        Scope::Module => 0.6,
        Scope::System => 0.9,
    }
}

fn novelty_weight(novelty: Novelty) -> f64 {
    match novelty {
        Novelty::Boilerplate => 0.0,
        Novelty::KnownPattern => 0.1,
        Novelty::Adaptation => 0.4,
        Novelty::Novel => 0.8,
    }
}

fn cost_weight(cost: CostOfWrong) -> f64 {
    match cost {
        CostOfWrong::Trivial => 0.0,
        CostOfWrong::Low => 0.1,
        CostOfWrong::Medium => 0.3,
        CostOfWrong::High => 0.6,
        CostOfWrong::Critical => 0.9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::signals::extract_signals;
    use crate::router::types::{OutputType, Reversibility};
    use std::collections::BTreeSet;

    fn bare_signals() -> TaskSignals {
        TaskSignals {
            file_refs: BTreeSet::new(),
            estimated_context_tokens: 0,
            scope: Scope::Function,
            reasoning_depth: 0.0,
            requires_tool_chain: false,
            output_type: OutputType::CodeGen,
            novelty: Novelty::Boilerplate,
            cost_of_wrong: CostOfWrong::Trivial,
            reversibility: Reversibility::EasyUndo,
            language_familiarity: 0.5,
            detected_language: None,
            has_examples: false,
            has_tests: false,
        }
    }

    #[test]
    fn test_score_to_level_reference_points() {
        assert_eq!(score_to_level(0.0), 1);
        assert_eq!(score_to_level(0.20), 2);
        assert_eq!(score_to_level(0.35), 3);
        assert_eq!(score_to_level(0.55), 4);
        assert_eq!(score_to_level(0.70), 5);
        assert_eq!(score_to_level(0.85), 6);
        assert_eq!(score_to_level(1.0), 6);
    }

    #[test]
    fn test_score_to_level_boundaries_are_lower_inclusive() {
        assert_eq!(score_to_level(0.15), 2);
        assert_eq!(score_to_level(0.50), 4);
        assert_eq!(score_to_level(0.65), 5);
        assert_eq!(score_to_level(0.80), 6);
    }

    #[test]
    fn test_score_to_level_monotonic() {
        let mut last = 0;
        for i in 0..=1000 {
            let level = score_to_level(i as f64 / 1000.0);
            assert!(level >= last, "level dropped at {}", i);
            last = level;
        }
    }

    #[test]
    fn test_ambiguous_zone_inclusive() {
        assert!(in_ambiguous_zone(0.50));
        assert!(in_ambiguous_zone(0.58));
        assert!(in_ambiguous_zone(0.65));
        assert!(!in_ambiguous_zone(0.49));
        assert!(!in_ambiguous_zone(0.66));
    }

    #[test]
    fn test_breakdown_terms() {
        let mut s = bare_signals();
        s.scope = Scope::Module;
        s.requires_tool_chain = true;
        s.cost_of_wrong = CostOfWrong::Medium;
        s.has_examples = true;
        let b = ScoreBreakdown::from_signals(&s);
        assert_eq!(b.scope, 0.6);
        assert_eq!(b.tool_chain, 0.3);
        assert_eq!(b.cost_of_wrong, 0.3);
        assert_eq!(b.examples_bonus, 0.1);
        // 0.6 + 0.3 + 0.3 - 0.05 - 0.1
        assert!((b.raw() - 1.05).abs() < 1e-9);
        assert_eq!(b.total(), 1.0);
    }

    #[test]
    fn test_context_penalty_capped() {
        let mut s = bare_signals();
        s.estimated_context_tokens = 16_000;
        assert!((ScoreBreakdown::from_signals(&s).context_penalty - 0.25).abs() < 1e-9);
        s.estimated_context_tokens = 1_000_000;
        assert_eq!(ScoreBreakdown::from_signals(&s).context_penalty, 0.4);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let mut s = bare_signals();
        s.language_familiarity = 1.0;
        s.has_examples = true;
        s.has_tests = true;
        // 0.1 - 0.1 - 0.1 - 0.1
        assert!(ScoreBreakdown::from_signals(&s).raw() < 0.0);
        assert_eq!(score(&s), 0.0);
    }

    #[test]
    fn test_score_in_unit_interval_for_real_descriptions() {
        for text in [
            "",
            "add two numbers",
            "fix a typo in README.md",
            "design a new distributed consensus protocol from scratch across services, \
             then keep fixing until all tests pass; if it deadlocks consider the trade-offs",
            "refactor the payment module in billing.rs, ledger.rs and api.rs without breaking callers",
        ] {
            let s = score(&extract_signals(text));
            assert!((0.0..=1.0).contains(&s), "{} -> {}", text, s);
        }
    }

    #[test]
    fn test_harder_description_scores_higher() {
        let easy = score(&extract_signals("add a getter for name"));
        let hard = score(&extract_signals(
            "design a novel sharding scheme for the entire system and migrate production data",
        ));
        assert!(hard > easy, "{} vs {}", hard, easy);
    }
}
