//! Router configuration
//!
//! One explicit [`RouterConfig`] value is threaded into every component.
//! Nothing in the pipeline re-reads environment or files per call, so a
//! classification is a function of (description, level, config, history).
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TIER_ROUTER_LEVEL` | `2` | Delegation level (0-5) |
//! | `TIER_ROUTER_TRIAGE_ENABLED` | `true` | Consult the local model in the ambiguous band |
//! | `TIER_ROUTER_LEARNING_ENABLED` | `true` | Adjust levels from outcome history |
//! | `TIER_ROUTER_DECOMPOSITION_ENABLED` | `false` | Allow task decomposition |
//! | `TIER_ROUTER_MIN_SAMPLES` | `50` | History size required before learning kicks in |
//! | `TIER_ROUTER_TRIAGE_MODEL` | unset | Model used for triage instead of the default |
//! | `TIER_ROUTER_LOCAL_MODEL` | `qwen2.5-coder:7b` | Default local model |
//! | `TIER_ROUTER_BACKEND_URL` | `http://localhost:11434` | Local model server |
//! | `TIER_ROUTER_SPECIALISTS` | unset | `category=model,category=model` overrides |

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Highest valid delegation level.
pub const MAX_DELEGATION_LEVEL: u8 = 5;

/// Full configuration bundle consumed by every layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Delegation level used when a call does not pass one (0-5).
    pub delegation_level: u8,

    /// Consult the local triage model when the heuristic score is ambiguous.
    pub triage_enabled: bool,

    /// Let the historical learner adjust heuristic levels.
    pub historical_learning_enabled: bool,

    /// Allow [`crate::decompose::TaskDecomposer`] to call the backend.
    /// Off by default: decomposition is an opt-in, slow path.
    pub decomposition_enabled: bool,

    /// Minimum total history size before the learner says anything.
    pub historical_min_samples: usize,

    /// Model used for triage and decomposition. Falls back to `local_model`.
    pub triage_model: Option<String>,

    /// Default local model tag suggested for local routes.
    pub local_model: String,

    /// Per-category model overrides, keyed by pattern category or task type.
    pub specialist_models: BTreeMap<String, String>,

    /// Base URL of the local model server.
    pub backend_url: String,

    /// Timeout for one triage call, in milliseconds.
    pub triage_timeout_ms: u64,

    /// Timeout for one decomposition call, in milliseconds.
    pub decomposition_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            delegation_level: 2,
            triage_enabled: true,
            historical_learning_enabled: true,
            decomposition_enabled: false,
            historical_min_samples: 50,
            triage_model: None,
            local_model: "qwen2.5-coder:7b".to_string(),
            specialist_models: BTreeMap::new(),
            backend_url: "http://localhost:11434".to_string(),
            triage_timeout_ms: 5_000,
            decomposition_timeout_ms: 10_000,
        }
    }
}

impl RouterConfig {
    /// Read configuration from `TIER_ROUTER_*` environment variables.
    ///
    /// Unset or unparseable variables keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` uses the process
    /// environment; tests pass a map so they never race on shared env vars.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(level) = lookup("TIER_ROUTER_LEVEL").and_then(|v| v.trim().parse::<u8>().ok()) {
            if level <= MAX_DELEGATION_LEVEL {
                cfg.delegation_level = level;
            } else {
                warn!(level, "TIER_ROUTER_LEVEL out of range, keeping default");
            }
        }
        if let Some(v) = lookup("TIER_ROUTER_TRIAGE_ENABLED") {
            cfg.triage_enabled = parse_bool_value(&v);
        }
        if let Some(v) = lookup("TIER_ROUTER_LEARNING_ENABLED") {
            cfg.historical_learning_enabled = parse_bool_value(&v);
        }
        if let Some(v) = lookup("TIER_ROUTER_DECOMPOSITION_ENABLED") {
            cfg.decomposition_enabled = parse_bool_value(&v);
        }
        if let Some(n) =
            lookup("TIER_ROUTER_MIN_SAMPLES").and_then(|v| v.trim().parse::<usize>().ok())
        {
            cfg.historical_min_samples = n;
        }
        if let Some(model) = lookup("TIER_ROUTER_TRIAGE_MODEL").filter(|v| !v.trim().is_empty()) {
            cfg.triage_model = Some(model.trim().to_string());
        }
        if let Some(model) = lookup("TIER_ROUTER_LOCAL_MODEL").filter(|v| !v.trim().is_empty()) {
            cfg.local_model = model.trim().to_string();
        }
        if let Some(url) = lookup("TIER_ROUTER_BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            cfg.backend_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(spec) = lookup("TIER_ROUTER_SPECIALISTS") {
            cfg.specialist_models.extend(parse_specialists(&spec));
        }

        cfg
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(source)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delegation_level > MAX_DELEGATION_LEVEL {
            return Err(ConfigError::InvalidLevel(self.delegation_level));
        }
        Ok(())
    }

    /// Apply per-call overrides. Only `Some` fields are applied.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(level) = overrides.delegation_level {
            self.delegation_level = level;
        }
        if let Some(v) = overrides.triage_enabled {
            self.triage_enabled = v;
        }
        if let Some(v) = overrides.historical_learning_enabled {
            self.historical_learning_enabled = v;
        }
        if let Some(v) = overrides.decomposition_enabled {
            self.decomposition_enabled = v;
        }
        if let Some(n) = overrides.historical_min_samples {
            self.historical_min_samples = n;
        }
        if let Some(ref model) = overrides.triage_model {
            self.triage_model = Some(model.clone());
        }
    }

    /// Model used for triage and decomposition calls.
    pub fn triage_model(&self) -> &str {
        self.triage_model.as_deref().unwrap_or(&self.local_model)
    }

    /// Specialist override for a category key, if configured.
    pub fn specialist_for(&self, category: &str) -> Option<&str> {
        self.specialist_models.get(category).map(String::as_str)
    }

    pub fn triage_timeout(&self) -> Duration {
        Duration::from_millis(self.triage_timeout_ms)
    }

    pub fn decomposition_timeout(&self) -> Duration {
        Duration::from_millis(self.decomposition_timeout_ms)
    }
}

/// Per-call overrides for [`RouterConfig`].
///
/// `None` means "don't override", `Some(..)` explicitly sets the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    pub delegation_level: Option<u8>,
    pub triage_enabled: Option<bool>,
    pub historical_learning_enabled: Option<bool>,
    pub decomposition_enabled: Option<bool>,
    pub historical_min_samples: Option<usize>,
    pub triage_model: Option<String>,
}

/// Parse a boolean from a raw string value.
/// Accepts "1", "true", or "yes" (case-insensitive).
fn parse_bool_value(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "1" || v == "true" || v == "yes"
}

/// Parse `category=model,category=model`. Malformed pairs are skipped.
fn parse_specialists(spec: &str) -> BTreeMap<String, String> {
    spec.split(',')
        .filter_map(|pair| {
            let (key, model) = pair.split_once('=')?;
            let (key, model) = (key.trim(), model.trim());
            if key.is_empty() || model.is_empty() {
                return None;
            }
            Some((key.to_string(), model.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_conservative() {
        let cfg = RouterConfig::default();
        assert_eq!(cfg.delegation_level, 2);
        assert!(cfg.triage_enabled);
        assert!(cfg.historical_learning_enabled);
        assert!(!cfg.decomposition_enabled);
        assert_eq!(cfg.historical_min_samples, 50);
        assert_eq!(cfg.triage_model(), "qwen2.5-coder:7b");
    }

    #[test]
    fn test_parse_bool_value() {
        assert!(parse_bool_value("1"));
        assert!(parse_bool_value("TRUE"));
        assert!(parse_bool_value(" yes "));
        assert!(!parse_bool_value("0"));
        assert!(!parse_bool_value("off"));
        assert!(!parse_bool_value(""));
    }

    #[test]
    fn test_from_lookup_reads_all_keys() {
        let cfg = RouterConfig::from_lookup(lookup_from(&[
            ("TIER_ROUTER_LEVEL", "4"),
            ("TIER_ROUTER_TRIAGE_ENABLED", "false"),
            ("TIER_ROUTER_DECOMPOSITION_ENABLED", "yes"),
            ("TIER_ROUTER_MIN_SAMPLES", "120"),
            ("TIER_ROUTER_TRIAGE_MODEL", "llama3.2:3b"),
            ("TIER_ROUTER_BACKEND_URL", "http://gpu-box:11434/"),
            ("TIER_ROUTER_SPECIALISTS", "sql=sqlcoder:7b, docs = phi3:mini,broken"),
        ]));
        assert_eq!(cfg.delegation_level, 4);
        assert!(!cfg.triage_enabled);
        assert!(cfg.decomposition_enabled);
        assert_eq!(cfg.historical_min_samples, 120);
        assert_eq!(cfg.triage_model(), "llama3.2:3b");
        assert_eq!(cfg.backend_url, "http://gpu-box:11434");
        assert_eq!(cfg.specialist_for("sql"), Some("sqlcoder:7b"));
        assert_eq!(cfg.specialist_for("docs"), Some("phi3:mini"));
        assert_eq!(cfg.specialist_models.len(), 2);
    }

    #[test]
    fn test_out_of_range_level_keeps_default() {
        let cfg = RouterConfig::from_lookup(lookup_from(&[("TIER_ROUTER_LEVEL", "9")]));
        assert_eq!(cfg.delegation_level, 2);
    }

    #[test]
    fn test_from_toml_partial_document() {
        let cfg = RouterConfig::from_toml_str(
            r#"
delegation_level = 3
decomposition_enabled = true

[specialist_models]
docs = "phi3:mini"
"#,
        )
        .unwrap();
        assert_eq!(cfg.delegation_level, 3);
        assert!(cfg.decomposition_enabled);
        assert!(cfg.triage_enabled, "unset keys keep defaults");
        assert_eq!(cfg.specialist_for("docs"), Some("phi3:mini"));
    }

    #[test]
    fn test_from_toml_rejects_bad_level() {
        let err = RouterConfig::from_toml_str("delegation_level = 7").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLevel(7)));
    }

    #[test]
    fn test_apply_overrides_only_some_fields() {
        let mut cfg = RouterConfig::default();
        cfg.apply_overrides(&ConfigOverrides {
            triage_enabled: Some(false),
            historical_min_samples: Some(10),
            ..Default::default()
        });
        assert!(!cfg.triage_enabled);
        assert_eq!(cfg.historical_min_samples, 10);
        assert_eq!(cfg.delegation_level, 2);
        assert!(cfg.historical_learning_enabled);
    }
}
