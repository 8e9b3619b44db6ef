//! Historical Learner — nudges a proposed level using past outcomes
//!
//! Four gates must all pass before history is trusted:
//!
//! ```text
//! (a) learning enabled
//! (b) total records              >= min_samples (config, default 50)
//! (c) records for task type      >= 10
//! (d) records for type at level  >= 5
//! ```
//!
//! When any gate fails the recommendation is a zero-adjustment no-op whose
//! `sample_size` is the count seen at the failing gate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::history::{HistoricalRecord, HistoryStore};
use crate::config::RouterConfig;

pub const MIN_TASK_TYPE_SAMPLES: usize = 10;
pub const MIN_LEVEL_SAMPLES: usize = 5;

/// Success rate above which a cheaper tier is recommended.
const DEMOTE_ABOVE: f64 = 0.85;
/// Success rate below which a safer tier is recommended.
const PROMOTE_BELOW: f64 = 0.5;
const ADJUSTMENT_SCALE: f64 = 0.4;
const MAX_ADJUSTMENT: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerRecommendation {
    /// New level, when history argues for one.
    pub adjusted_level: Option<u8>,
    /// In [-0.2, 0.2].
    pub confidence_adjustment: f64,
    pub reason: String,
    pub sample_size: usize,
}

impl LearnerRecommendation {
    fn no_op(reason: impl Into<String>, sample_size: usize) -> Self {
        Self {
            adjusted_level: None,
            confidence_adjustment: 0.0,
            reason: reason.into(),
            sample_size,
        }
    }

    /// Whether this recommendation changes anything.
    pub fn is_active(&self) -> bool {
        self.adjusted_level.is_some() || self.confidence_adjustment != 0.0
    }
}

pub struct HistoricalLearner {
    enabled: bool,
    min_samples: usize,
    store: Arc<dyn HistoryStore>,
}

impl HistoricalLearner {
    pub fn new(store: Arc<dyn HistoryStore>, enabled: bool, min_samples: usize) -> Self {
        Self {
            enabled,
            min_samples,
            store,
        }
    }

    pub fn from_config(store: Arc<dyn HistoryStore>, config: &RouterConfig) -> Self {
        Self::new(
            store,
            config.historical_learning_enabled,
            config.historical_min_samples,
        )
    }

    /// Recommendation for `task_type` at `proposed_level`. Never fails; an
    /// unreadable store degrades to a no-op.
    pub fn recommend(&self, task_type: &str, proposed_level: u8) -> LearnerRecommendation {
        if !self.enabled {
            return LearnerRecommendation::no_op("historical learning disabled", 0);
        }

        let records = match self.store.read_all() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "history unavailable, skipping learner");
                return LearnerRecommendation::no_op(format!("history unavailable: {}", e), 0);
            }
        };

        let recommendation = Self::recommend_from(&records, task_type, proposed_level, self.min_samples);
        debug!(
            task_type,
            proposed_level,
            sample_size = recommendation.sample_size,
            adjustment = recommendation.confidence_adjustment,
            adjusted_level = ?recommendation.adjusted_level,
            "learner recommendation"
        );
        recommendation
    }

    /// Gate and compute over an already-loaded record set.
    pub fn recommend_from(
        records: &[HistoricalRecord],
        task_type: &str,
        proposed_level: u8,
        min_samples: usize,
    ) -> LearnerRecommendation {
        if records.len() < min_samples {
            return LearnerRecommendation::no_op(
                format!("insufficient history: {} < {} records", records.len(), min_samples),
                records.len(),
            );
        }

        let of_type: Vec<&HistoricalRecord> =
            records.iter().filter(|r| r.task_type == task_type).collect();
        if of_type.len() < MIN_TASK_TYPE_SAMPLES {
            return LearnerRecommendation::no_op(
                format!(
                    "insufficient {} history: {} < {} records",
                    task_type,
                    of_type.len(),
                    MIN_TASK_TYPE_SAMPLES
                ),
                of_type.len(),
            );
        }

        let at_level: Vec<&HistoricalRecord> = of_type
            .into_iter()
            .filter(|r| r.level == proposed_level)
            .collect();
        if at_level.len() < MIN_LEVEL_SAMPLES {
            return LearnerRecommendation::no_op(
                format!(
                    "insufficient {} history at level {}: {} < {} records",
                    task_type,
                    proposed_level,
                    at_level.len(),
                    MIN_LEVEL_SAMPLES
                ),
                at_level.len(),
            );
        }

        let successes = at_level.iter().filter(|r| r.is_success()).count();
        let rate = successes as f64 / at_level.len() as f64;
        let confidence_adjustment =
            ((rate - 0.5) * ADJUSTMENT_SCALE).clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);

        let (adjusted_level, verdict) = if rate > DEMOTE_ABOVE && proposed_level > 1 {
            (Some(proposed_level - 1), "demote to cheaper tier")
        } else if rate < PROMOTE_BELOW && proposed_level < 5 {
            (Some(proposed_level + 1), "promote to safer tier")
        } else {
            (None, "keep level")
        };

        LearnerRecommendation {
            adjusted_level,
            confidence_adjustment,
            reason: format!(
                "{}/{} {} tasks succeeded at level {} ({:.0}%): {}",
                successes,
                at_level.len(),
                task_type,
                proposed_level,
                rate * 100.0,
                verdict
            ),
            sample_size: at_level.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HistoryError, HistoryResult};
    use crate::learner::history::{InMemoryHistoryStore, Outcome};

    fn records(task_type: &str, level: u8, successes: usize, failures: usize) -> Vec<HistoricalRecord> {
        let mut out = Vec::new();
        for i in 0..successes {
            out.push(HistoricalRecord::new(&format!("ok task {i}"), task_type, level, Outcome::Success));
        }
        for i in 0..failures {
            out.push(HistoricalRecord::new(&format!("bad task {i}"), task_type, level, Outcome::Escalated));
        }
        out
    }

    fn padded(mut core: Vec<HistoricalRecord>) -> Vec<HistoricalRecord> {
        // unrelated filler to clear the global minimum
        core.extend(records("analysis", 2, 50, 0));
        core
    }

    #[test]
    fn test_disabled_is_noop() {
        let learner = HistoricalLearner::new(Arc::new(InMemoryHistoryStore::new()), false, 50);
        let r = learner.recommend("code_gen", 3);
        assert_eq!(r.confidence_adjustment, 0.0);
        assert_eq!(r.sample_size, 0);
        assert!(r.reason.contains("disabled"));
    }

    #[test]
    fn test_global_minimum_gate() {
        let r = HistoricalLearner::recommend_from(&records("code_gen", 3, 20, 0), "code_gen", 3, 50);
        assert_eq!(r.confidence_adjustment, 0.0);
        assert_eq!(r.adjusted_level, None);
        assert_eq!(r.sample_size, 20);
    }

    #[test]
    fn test_task_type_gate() {
        let history = padded(records("code_gen", 3, 9, 0));
        let r = HistoricalLearner::recommend_from(&history, "code_gen", 3, 50);
        assert_eq!(r.confidence_adjustment, 0.0);
        assert_eq!(r.sample_size, 9);
    }

    #[test]
    fn test_level_gate() {
        let mut core = records("code_gen", 2, 8, 0);
        core.extend(records("code_gen", 3, 4, 0));
        let r = HistoricalLearner::recommend_from(&padded(core), "code_gen", 3, 50);
        assert_eq!(r.confidence_adjustment, 0.0);
        assert_eq!(r.sample_size, 4);
        assert!(r.reason.contains("level 3"));
    }

    #[test]
    fn test_high_success_demotes() {
        let r = HistoricalLearner::recommend_from(&padded(records("code_gen", 3, 10, 0)), "code_gen", 3, 50);
        assert_eq!(r.adjusted_level, Some(2));
        assert!((r.confidence_adjustment - 0.2).abs() < 1e-9);
        assert_eq!(r.sample_size, 10);
    }

    #[test]
    fn test_low_success_promotes() {
        let r = HistoricalLearner::recommend_from(&padded(records("code_gen", 3, 3, 7)), "code_gen", 3, 50);
        assert_eq!(r.adjusted_level, Some(4));
        // (0.3 - 0.5) * 0.4
        assert!((r.confidence_adjustment + 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_middling_success_adjusts_only() {
        let r = HistoricalLearner::recommend_from(&padded(records("code_gen", 3, 7, 3)), "code_gen", 3, 50);
        assert_eq!(r.adjusted_level, None);
        assert!((r.confidence_adjustment - 0.08).abs() < 1e-9);
        assert!(r.is_active());
    }

    #[test]
    fn test_level_bounds_respected() {
        let r = HistoricalLearner::recommend_from(&padded(records("text", 1, 10, 0)), "text", 1, 50);
        assert_eq!(r.adjusted_level, None, "level 1 cannot demote");
        let r = HistoricalLearner::recommend_from(&padded(records("text", 5, 0, 10)), "text", 5, 50);
        assert_eq!(r.adjusted_level, None, "level 5 cannot promote");
        assert!((r.confidence_adjustment + 0.2).abs() < 1e-9);
    }

    struct Broken;

    impl HistoryStore for Broken {
        fn append(&self, _record: &HistoricalRecord) -> HistoryResult<()> {
            Ok(())
        }
        fn read_all(&self) -> HistoryResult<Vec<HistoricalRecord>> {
            Err(HistoryError::Io(std::io::Error::other("disk on fire")))
        }
    }

    #[test]
    fn test_unreadable_store_degrades() {
        let learner = HistoricalLearner::new(Arc::new(Broken), true, 50);
        let r = learner.recommend("code_gen", 3);
        assert!(!r.is_active());
        assert!(r.reason.contains("history unavailable"));
    }

    #[test]
    fn test_reads_through_store() {
        let store = Arc::new(InMemoryHistoryStore::from_records(padded(records("code_mod", 4, 10, 0))));
        let learner = HistoricalLearner::new(store, true, 50);
        assert_eq!(learner.recommend("code_mod", 4).adjusted_level, Some(3));
    }
}
