//! Aggregate view over outcome history, grouped by task type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::history::{HistoricalRecord, Outcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTypeStats {
    pub total: usize,
    pub successes: usize,
    pub escalations: usize,
    pub rejections: usize,
    /// Success count per routed level.
    pub by_level: BTreeMap<u8, usize>,
    pub mean_quality: Option<f64>,
}

impl TaskTypeStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total_records: usize,
    pub task_types: BTreeMap<String, TaskTypeStats>,
}

impl HistorySummary {
    pub fn from_records(records: &[HistoricalRecord]) -> Self {
        let mut task_types: BTreeMap<String, TaskTypeStats> = BTreeMap::new();
        let mut quality: BTreeMap<&str, (f64, usize)> = BTreeMap::new();

        for r in records {
            let stats = task_types.entry(r.task_type.clone()).or_default();
            stats.total += 1;
            match r.outcome {
                Outcome::Success => {
                    stats.successes += 1;
                    *stats.by_level.entry(r.level).or_default() += 1;
                }
                Outcome::Escalated => stats.escalations += 1,
                Outcome::UserRejected => stats.rejections += 1,
                Outcome::Unknown => {}
            }
            if let Some(q) = r.quality {
                let acc = quality.entry(r.task_type.as_str()).or_default();
                acc.0 += q;
                acc.1 += 1;
            }
        }

        for (task_type, (sum, n)) in quality {
            if let Some(stats) = task_types.get_mut(task_type) {
                stats.mean_quality = Some(sum / n as f64);
            }
        }

        Self {
            total_records: records.len(),
            task_types,
        }
    }

    pub fn success_rate(&self, task_type: &str) -> Option<f64> {
        self.task_types.get(task_type).map(TaskTypeStats::success_rate)
    }
}
