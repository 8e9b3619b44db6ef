//! Outcome history — append-only records of how routed tasks turned out
//!
//! The router only ever reads history. Callers append one record per finished
//! task; the JSONL store opens the file in append mode and writes one line per
//! record so concurrent appenders do not interleave partial lines.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::HistoryResult;

/// How a routed task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Escalated,
    UserRejected,
    Unknown,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Escalated => write!(f, "escalated"),
            Self::UserRejected => write!(f, "user_rejected"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub fingerprint: String,
    pub task_type: String,
    /// Complexity level the task was routed at.
    pub level: u8,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl HistoricalRecord {
    /// Record for `description`, fingerprinted and stamped now.
    pub fn new(description: &str, task_type: impl Into<String>, level: u8, outcome: Outcome) -> Self {
        Self {
            fingerprint: fingerprint(description),
            task_type: task_type.into(),
            level,
            outcome,
            quality: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality.clamp(0.0, 1.0));
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Similarity key for a task description.
///
/// Lowercase, strip non-alphanumerics, keep words longer than two characters,
/// dedupe, sort, join, then take the first 64 bits of a BLAKE3 hash as hex.
/// Stable under word reordering, case and punctuation. This groups *similar*
/// descriptions; it is not a unique id and distinct tasks can collide.
pub fn fingerprint(description: &str) -> String {
    let lower = description.to_lowercase();
    let cleaned: String = lower
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .collect();
    words.sort_unstable();
    words.dedup();

    let hash = blake3::hash(words.join(" ").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    format!("{:016x}", u64::from_be_bytes(prefix))
}

/// Append-only outcome log.
pub trait HistoryStore: Send + Sync {
    fn append(&self, record: &HistoricalRecord) -> HistoryResult<()>;

    /// All records in append order. Unparseable entries are skipped.
    fn read_all(&self) -> HistoryResult<Vec<HistoricalRecord>>;
}

/// One JSON object per line in a local file.
#[derive(Debug, Clone)]
pub struct JsonlHistoryStore {
    path: PathBuf,
}

impl JsonlHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn append(&self, record: &HistoricalRecord) -> HistoryResult<()> {
        let json = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        debug!(path = %self.path.display(), task_type = %record.task_type, "appended history record");
        Ok(())
    }

    fn read_all(&self) -> HistoryResult<Vec<HistoricalRecord>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoricalRecord>(&line) {
                Ok(record) => records.push(record),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %self.path.display(), skipped, "skipped unparseable history lines");
        }
        Ok(records)
    }
}

/// Process-local store for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    records: Mutex<Vec<HistoricalRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<HistoricalRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append(&self, record: &HistoricalRecord) -> HistoryResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }

    fn read_all(&self) -> HistoryResult<Vec<HistoricalRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_stable_under_order_case_punctuation() {
        let a = fingerprint("Add a retry loop to the HTTP client!");
        let b = fingerprint("http client: the retry LOOP add");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_fingerprint_ignores_short_words_and_duplicates() {
        assert_eq!(
            fingerprint("fix parser parser in a go file"),
            fingerprint("fix parser file")
        );
        assert_ne!(fingerprint("fix the parser"), fingerprint("fix the lexer"));
    }

    #[test]
    fn test_record_serde_shape() {
        let record = HistoricalRecord::new("rename foo", "code_mod", 1, Outcome::UserRejected);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "user_rejected");
        assert!(json.get("quality").is_none());
        let back: HistoricalRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_jsonl_roundtrip_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path().join("history.jsonl"));
        store
            .append(&HistoricalRecord::new("a task", "code_gen", 2, Outcome::Success))
            .unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(store.path())
            .and_then(|mut f| writeln!(f, "{{not json\n"))
            .unwrap();
        store
            .append(&HistoricalRecord::new("b task", "code_gen", 3, Outcome::Escalated).with_quality(2.0))
            .unwrap();

        let records = store.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, 2);
        assert_eq!(records[1].outcome, Outcome::Escalated);
        assert_eq!(records[1].quality, Some(1.0));
    }

    #[test]
    fn test_jsonl_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlHistoryStore::new(dir.path().join("absent.jsonl"));
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryHistoryStore::new();
        store
            .append(&HistoricalRecord::new("x task", "text", 1, Outcome::Success))
            .unwrap();
        assert_eq!(store.read_all().unwrap().len(), 1);
    }
}
