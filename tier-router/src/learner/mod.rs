//! Outcome history and the learner that reads it.

pub mod history;
pub mod recommend;
pub mod summary;

pub use history::{
    fingerprint, HistoricalRecord, HistoryStore, InMemoryHistoryStore, JsonlHistoryStore, Outcome,
};
pub use recommend::{HistoricalLearner, LearnerRecommendation};
pub use summary::{HistorySummary, TaskTypeStats};
