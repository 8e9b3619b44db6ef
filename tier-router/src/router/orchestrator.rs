//! Orchestrator — runs the classification cascade and the ceiling gate
//!
//! Holds the config, the optional local backend and the history store. Every
//! public method returns a complete value; degraded operation shows up in the
//! `reason` and `confidence` fields and in `warn!` logs, never as an error.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::levels::{EscalationPolicy, LevelConfig};
use super::patterns::match_patterns;
use super::scorer::{in_ambiguous_zone, score_to_level, ScoreBreakdown};
use super::signals::extract_signals;
use super::types::{ClassificationLayer, Route, RoutingDecision};
use crate::backend::ChatBackend;
use crate::config::{RouterConfig, MAX_DELEGATION_LEVEL};
use crate::decompose::{DecompositionResult, TaskDecomposer};
use crate::error::HistoryResult;
use crate::escalation::{evaluate_with_policy, EscalationResult, FailureDetector};
use crate::learner::{
    HistoricalLearner, HistoryStore, HistorySummary, InMemoryHistoryStore, LearnerRecommendation,
};
use crate::triage::{TriageClassifier, TriageSource};

/// Level used when neither the call nor the config carries a valid one.
pub const FALLBACK_DELEGATION_LEVEL: u8 = 2;

/// Heuristic confidence outside the ambiguous band.
const HEURISTIC_CONFIDENCE: f64 = 0.7;
/// Heuristic confidence inside the band when triage could not run.
const AMBIGUOUS_CONFIDENCE: f64 = 0.5;
const GATE_CONFIDENCE: f64 = 1.0;

pub struct Orchestrator {
    config: RouterConfig,
    backend: Option<Arc<dyn ChatBackend>>,
    history: Arc<dyn HistoryStore>,
    detector: FailureDetector,
}

impl Orchestrator {
    /// No backend, empty in-memory history.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            backend: None,
            history: Arc::new(InMemoryHistoryStore::new()),
            detector: FailureDetector::new(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_detector(mut self, detector: FailureDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Requested level if valid, else the configured one, else the fallback.
    pub fn resolve_level(&self, requested: Option<u8>) -> u8 {
        let configured = if self.config.delegation_level <= MAX_DELEGATION_LEVEL {
            self.config.delegation_level
        } else {
            warn!(
                level = self.config.delegation_level,
                fallback = FALLBACK_DELEGATION_LEVEL,
                "configured delegation level out of range"
            );
            FALLBACK_DELEGATION_LEVEL
        };
        match requested {
            Some(level) if level <= MAX_DELEGATION_LEVEL => level,
            Some(level) => {
                warn!(level, fallback = configured, "delegation level out of range");
                configured
            }
            None => configured,
        }
    }

    /// Decide which tier handles `description`.
    pub async fn classify_task(&self, description: &str, level: Option<u8>) -> RoutingDecision {
        let level = self.resolve_level(level);
        let level_config = LevelConfig::for_level(level)
            .copied()
            .unwrap_or(LevelConfig::all()[FALLBACK_DELEGATION_LEVEL as usize]);

        let decision = if let Some(route) = level_config.gate_route() {
            self.gate_decision(&level_config, route)
        } else {
            let decision = self.cascade(description, &level_config).await;
            apply_ceiling(decision, &level_config)
        };
        let decision = self.attach_model(decision);

        info!(
            route = %decision.route,
            local = decision.is_local(),
            complexity = decision.complexity,
            confidence = decision.confidence,
            layer = %decision.classification_layer,
            level = decision.delegation_level,
            "task classified"
        );
        decision
    }

    fn gate_decision(&self, level_config: &LevelConfig, route: Route) -> RoutingDecision {
        let reason = match route {
            Route::Cloud => format!("delegation level {}: every task goes to cloud", level_config.level),
            _ => format!("delegation level {}: every task runs locally", level_config.level),
        };
        RoutingDecision {
            route,
            delegation_level: level_config.level,
            complexity: 0,
            confidence: GATE_CONFIDENCE,
            reason,
            classification_layer: ClassificationLayer::LevelGate,
            escalation_policy: level_config.escalation_policy,
            suggested_model: None,
            specialist: None,
            score: None,
            learner_applied: false,
        }
    }

    /// Pattern table, then score, then triage or learner.
    async fn cascade(&self, description: &str, level_config: &LevelConfig) -> RoutingDecision {
        if let Some(hit) = match_patterns(description) {
            debug!(category = hit.rule.category, pattern = hit.matched_pattern, "pattern matched");
            return RoutingDecision {
                route: hit.rule.route,
                delegation_level: level_config.level,
                complexity: hit.rule.level,
                confidence: hit.confidence,
                reason: format!("matched {} rule", hit.rule.category),
                classification_layer: ClassificationLayer::PatternTable,
                escalation_policy: level_config.escalation_policy,
                suggested_model: None,
                specialist: Some(hit.rule.category.to_string()),
                score: None,
                learner_applied: false,
            };
        }

        let signals = extract_signals(description);
        let breakdown = ScoreBreakdown::from_signals(&signals);
        let score = breakdown.total();
        let heuristic_level = score_to_level(score);
        let ambiguous = in_ambiguous_zone(score);
        let task_type = signals.task_type();
        debug!(score, heuristic_level, ambiguous, ?breakdown, "heuristic score");

        let mut decision = RoutingDecision {
            route: Route::Local,
            delegation_level: level_config.level,
            complexity: heuristic_level,
            confidence: HEURISTIC_CONFIDENCE,
            reason: String::new(),
            classification_layer: ClassificationLayer::Heuristic,
            escalation_policy: level_config.escalation_policy,
            suggested_model: None,
            specialist: Some(task_type.clone()),
            score: Some(score),
            learner_applied: false,
        };

        if ambiguous && self.config.triage_enabled {
            if let Some(backend) = self.backend.as_ref() {
                let result = TriageClassifier::from_config(Arc::clone(backend), &self.config)
                    .triage(description)
                    .await;
                decision.complexity = result.level;
                decision.confidence = result.confidence;
                decision.classification_layer = ClassificationLayer::Triage;
                decision.reason = match result.source {
                    TriageSource::Fallback => format!(
                        "score {:.2} ambiguous; triage unavailable, assumed {}",
                        score, result.category
                    ),
                    _ => format!("score {:.2} ambiguous; triage says {}", score, result.category),
                };
                return decision;
            }
        }

        if ambiguous {
            decision.confidence = AMBIGUOUS_CONFIDENCE;
        }
        decision.reason = format!("heuristic score {:.2} -> level {}", score, heuristic_level);

        let learner = HistoricalLearner::from_config(Arc::clone(&self.history), &self.config);
        let rec = learner.recommend(&task_type, heuristic_level);
        if rec.is_active() {
            if let Some(adjusted) = rec.adjusted_level {
                decision.complexity = adjusted;
            }
            decision.confidence = (decision.confidence + rec.confidence_adjustment).clamp(0.0, 1.0);
            decision.learner_applied = true;
            decision.reason = format!("{}; learner: {}", decision.reason, rec.reason);
        }
        decision
    }

    /// Specialist override for local routes, else the default local model.
    fn attach_model(&self, mut decision: RoutingDecision) -> RoutingDecision {
        if decision.route == Route::Local {
            let specialist = decision
                .specialist
                .as_deref()
                .and_then(|key| self.config.specialist_for(key));
            decision.suggested_model =
                Some(specialist.unwrap_or(&self.config.local_model).to_string());
        }
        decision
    }

    /// Split a task into subtasks via the local model.
    pub async fn decompose_task(&self, description: &str) -> DecompositionResult {
        TaskDecomposer::from_config(self.backend.clone(), &self.config)
            .decompose(description)
            .await
    }

    /// What outcome history says about `task_type` at `level`.
    pub fn recommendation(&self, task_type: &str, level: u8) -> LearnerRecommendation {
        HistoricalLearner::from_config(Arc::clone(&self.history), &self.config)
            .recommend(task_type, level)
    }

    /// Detect failure signals in a local result and judge it under the
    /// escalation policy of the resolved delegation level.
    pub fn evaluate_output(
        &self,
        output: &str,
        expected_language: Option<&str>,
        level: Option<u8>,
    ) -> EscalationResult {
        let level = self.resolve_level(level);
        let policy = LevelConfig::for_level(level)
            .map(|c| c.escalation_policy)
            .unwrap_or(EscalationPolicy::Standard);
        let signals = self.detector.detect(output, expected_language);
        evaluate_with_policy(&signals, policy)
    }

    pub fn history_summary(&self) -> HistoryResult<HistorySummary> {
        Ok(HistorySummary::from_records(&self.history.read_all()?))
    }
}

/// Force cloud when complexity is above the level's ceiling (levels 1-4).
fn apply_ceiling(mut decision: RoutingDecision, level_config: &LevelConfig) -> RoutingDecision {
    if (1..=4).contains(&level_config.level) && level_config.exceeds_ceiling(decision.complexity) {
        decision.route = Route::Cloud;
        decision.reason = format!(
            "{}; complexity {} exceeds ceiling {} for level {}",
            decision.reason, decision.complexity, level_config.ceiling, level_config.level
        );
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChatRequest, ChatResponse};
    use crate::error::BackendError;
    use crate::learner::{HistoricalRecord, Outcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }
        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                text: self.reply.to_string(),
                ..Default::default()
            })
        }
    }

    // no pattern fires; file 0.3 + "then" 0.1 + known 0.1 + low cost 0.1 - familiarity 0.05
    const AMBIGUOUS_TASK: &str = "tidy this file then sort the entries";

    #[tokio::test]
    async fn test_level_gates() {
        let orch = Orchestrator::new(RouterConfig::default());
        let cloud = orch.classify_task("rename x to y", Some(0)).await;
        assert_eq!(cloud.route, Route::Cloud);
        assert_eq!(cloud.classification_layer, ClassificationLayer::LevelGate);
        assert_eq!(cloud.escalation_policy, EscalationPolicy::None);

        let local = orch.classify_task("design a new distributed database", Some(5)).await;
        assert_eq!(local.route, Route::Local);
        assert_eq!(local.classification_layer, ClassificationLayer::LevelGate);
        assert_eq!(local.suggested_model.as_deref(), Some("qwen2.5-coder:7b"));
    }

    #[tokio::test]
    async fn test_invalid_level_falls_back_to_config() {
        let config = RouterConfig {
            delegation_level: 0,
            ..Default::default()
        };
        let orch = Orchestrator::new(config);
        assert_eq!(orch.resolve_level(Some(9)), 0);
        let d = orch.classify_task("anything", Some(9)).await;
        assert_eq!(d.classification_layer, ClassificationLayer::LevelGate);
        assert_eq!(d.delegation_level, 0);
    }

    #[test]
    fn test_invalid_config_level_uses_fallback() {
        let config = RouterConfig {
            delegation_level: 42,
            ..Default::default()
        };
        assert_eq!(Orchestrator::new(config).resolve_level(None), FALLBACK_DELEGATION_LEVEL);
    }

    #[tokio::test]
    async fn test_pattern_decision_and_ceiling() {
        let orch = Orchestrator::new(RouterConfig::default());
        let d = orch.classify_task("create a crud endpoint", Some(1)).await;
        assert_eq!(d.route, Route::Cloud);
        assert_eq!(d.complexity, 3);
        assert!(d.reason.contains("complexity 3 exceeds ceiling 2 for level 1"), "{}", d.reason);
        assert_eq!(d.suggested_model, None);

        let d = orch.classify_task("create a crud endpoint", Some(2)).await;
        assert_eq!(d.route, Route::Local);
        assert_eq!(d.classification_layer, ClassificationLayer::PatternTable);
    }

    #[tokio::test]
    async fn test_specialist_override() {
        let mut config = RouterConfig::default();
        config
            .specialist_models
            .insert("documentation".into(), "doc-writer:3b".into());
        let orch = Orchestrator::new(config);
        let d = orch.classify_task("write docstring for this function", Some(1)).await;
        assert_eq!(d.specialist.as_deref(), Some("documentation"));
        assert_eq!(d.suggested_model.as_deref(), Some("doc-writer:3b"));
    }

    #[tokio::test]
    async fn test_ambiguous_band_consults_triage() {
        let backend = Arc::new(CountingBackend {
            reply: r#"{"category":"trivial","confidence":0.9}"#,
            calls: AtomicUsize::new(0),
        });
        let orch = Orchestrator::new(RouterConfig::default()).with_backend(backend.clone());
        let d = orch.classify_task(AMBIGUOUS_TASK, Some(3)).await;
        assert!(in_ambiguous_zone(d.score.unwrap()), "{:?}", d.score);
        assert_eq!(d.classification_layer, ClassificationLayer::Triage);
        assert_eq!(d.complexity, 1);
        assert_eq!(d.confidence, 0.9);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_triage_disabled_stays_heuristic() {
        let backend = Arc::new(CountingBackend {
            reply: "trivial",
            calls: AtomicUsize::new(0),
        });
        let config = RouterConfig {
            triage_enabled: false,
            ..Default::default()
        };
        let orch = Orchestrator::new(config).with_backend(backend.clone());
        let d = orch.classify_task(AMBIGUOUS_TASK, Some(3)).await;
        assert_eq!(d.classification_layer, ClassificationLayer::Heuristic);
        assert_eq!(d.confidence, AMBIGUOUS_CONFIDENCE);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_learner_adjusts_heuristic_decision() {
        let plain = Orchestrator::new(RouterConfig::default());
        let baseline = plain.classify_task("implement a trie", Some(4)).await;
        assert_eq!(baseline.classification_layer, ClassificationLayer::Heuristic);
        assert!(!baseline.learner_applied);

        let level = baseline.complexity;
        let mut records: Vec<HistoricalRecord> = (0..60)
            .map(|i| HistoricalRecord::new(&format!("filler {i}"), "analysis", 2, Outcome::Success))
            .collect();
        records.extend((0..10).map(|i| {
            HistoricalRecord::new(&format!("trie {i}"), "code_gen", level, Outcome::Success)
        }));
        let orch = Orchestrator::new(RouterConfig::default())
            .with_history(Arc::new(InMemoryHistoryStore::from_records(records)));
        let d = orch.classify_task("implement a trie", Some(4)).await;
        assert!(d.learner_applied);
        assert_eq!(d.complexity, level - 1);
        assert!((d.confidence - (HEURISTIC_CONFIDENCE + 0.2)).abs() < 1e-9);
        assert!(d.reason.contains("learner"));
    }

    #[test]
    fn test_evaluate_output_uses_level_policy() {
        let orch = Orchestrator::new(RouterConfig::default());
        let hedgy = "def f():\n    return 1  # TODO tidy\n";
        assert!(orch.evaluate_output(hedgy, Some("python"), Some(2)).accept);
        assert!(!orch.evaluate_output(hedgy, Some("python"), Some(1)).accept);
        assert!(orch.evaluate_output("", None, Some(5)).accept);
    }
}
