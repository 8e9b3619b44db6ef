//! Delegation levels — the user's risk ceiling
//!
//! ```text
//! level | ceiling | policy   | classify | local first
//! ------|---------|----------|----------|------------
//!   0   |   -1    | none     |   skip   |    no        always cloud
//!   1   |    2    | strict   |   yes    |    no
//!   2   |    3    | standard |   yes    |    yes
//!   3   |    4    | standard |   yes    |    yes
//!   4   |    5    | relaxed  |   yes    |    yes
//!   5   |   max   | never    |   skip   |    yes       always local
//! ```
//!
//! Ceilings are non-decreasing from level 1 to level 4.

use serde::{Deserialize, Serialize};

use super::types::Route;

/// How eagerly a local result is rejected for the cloud tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPolicy {
    /// Nothing runs locally, so nothing escalates.
    None,
    /// Any failure signal rejects the local result.
    Strict,
    /// Critical signals or two-plus signals reject; one minor signal is a warning.
    Standard,
    /// Only critical signals reject.
    Relaxed,
    /// Local results are always accepted.
    Never,
}

impl std::fmt::Display for EscalationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Strict => write!(f, "strict"),
            Self::Standard => write!(f, "standard"),
            Self::Relaxed => write!(f, "relaxed"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// Settings for one delegation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    pub level: u8,
    /// Highest complexity still routed locally. -1 means never local.
    pub ceiling: i8,
    pub escalation_policy: EscalationPolicy,
    pub skip_classification: bool,
    pub local_first: bool,
}

/// Ceiling used by level 5; above any complexity level.
pub const UNBOUNDED_CEILING: i8 = i8::MAX;

const LEVELS: [LevelConfig; 6] = [
    LevelConfig {
        level: 0,
        ceiling: -1,
        escalation_policy: EscalationPolicy::None,
        skip_classification: true,
        local_first: false,
    },
    LevelConfig {
        level: 1,
        ceiling: 2,
        escalation_policy: EscalationPolicy::Strict,
        skip_classification: false,
        local_first: false,
    },
    LevelConfig {
        level: 2,
        ceiling: 3,
        escalation_policy: EscalationPolicy::Standard,
        skip_classification: false,
        local_first: true,
    },
    LevelConfig {
        level: 3,
        ceiling: 4,
        escalation_policy: EscalationPolicy::Standard,
        skip_classification: false,
        local_first: true,
    },
    LevelConfig {
        level: 4,
        ceiling: 5,
        escalation_policy: EscalationPolicy::Relaxed,
        skip_classification: false,
        local_first: true,
    },
    LevelConfig {
        level: 5,
        ceiling: UNBOUNDED_CEILING,
        escalation_policy: EscalationPolicy::Never,
        skip_classification: true,
        local_first: true,
    },
];

impl LevelConfig {
    /// Look up a level; `None` outside 0-5.
    pub fn for_level(level: u8) -> Option<&'static LevelConfig> {
        LEVELS.get(level as usize)
    }

    /// All six levels in order.
    pub fn all() -> &'static [LevelConfig] {
        &LEVELS
    }

    /// Route forced by the level itself, bypassing classification: local
    /// when the level runs local-first, cloud otherwise.
    pub fn gate_route(&self) -> Option<Route> {
        if !self.skip_classification {
            return None;
        }
        Some(if self.local_first {
            Route::Local
        } else {
            Route::Cloud
        })
    }

    /// Whether `complexity` is above what this level allows locally.
    pub fn exceeds_ceiling(&self, complexity: u8) -> bool {
        i16::from(complexity) > i16::from(self.ceiling)
    }
}
