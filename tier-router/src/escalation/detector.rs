//! Failure Signals — cheap checks that a local model's output is unusable
//!
//! Checks run in a fixed order; the empty-output check short-circuits all
//! others. Each check is independent, so several signals can fire at once
//! (an unclosed output is typically both `incomplete` and `syntax_error`).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Outputs shorter than this (after trimming) are treated as empty.
pub const MIN_OUTPUT_CHARS: usize = 10;
/// Shortest unit that counts as a repetition loop.
pub const MIN_REPEAT_UNIT: usize = 50;
/// Contiguous copies needed for a repetition loop.
pub const MIN_REPEATS: usize = 3;
/// Only the tail is scanned for loops; that's where generation gets stuck.
const REPETITION_WINDOW: usize = 8 * 1024;
/// Net unclosed brackets above this mean the output was cut off.
const MAX_UNCLOSED_DEPTH: i64 = 2;
/// Per-pair bracket imbalance above this is a syntax problem.
const MAX_BRACKET_DEVIATION: i64 = 2;
const MIN_HEDGES: usize = 3;
const MIN_FOREIGN_HITS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSignal {
    EmptyOutput,
    Refusal,
    SyntaxError,
    HallucinatedImports,
    Incomplete,
    RepetitionLoop,
    WrongLanguage,
    ConfidenceCaveat,
    PlaceholderMarkers,
}

impl FailureSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyOutput => "empty_output",
            Self::Refusal => "refusal",
            Self::SyntaxError => "syntax_error",
            Self::HallucinatedImports => "hallucinated_imports",
            Self::Incomplete => "incomplete",
            Self::RepetitionLoop => "repetition_loop",
            Self::WrongLanguage => "wrong_language",
            Self::ConfidenceCaveat => "confidence_caveat",
            Self::PlaceholderMarkers => "placeholder_markers",
        }
    }

    /// Signals that reject a local result on their own.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::EmptyOutput | Self::Refusal | Self::RepetitionLoop)
    }
}

impl std::fmt::Display for FailureSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static REFUSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(as an ai(\s+language)?\s+model|i('m|\s+am)\s+(sorry|unable|not able)|i\s+(cannot|can't|can not|won't|will not)\s+(help|assist|do|provide|write|comply|complete|fulfill)|i\s+must\s+decline)\b",
    )
    .expect("REFUSAL regex should compile")
});

static HEDGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(i think|i believe|not sure|not certain|possibly|probably|perhaps|it seems|might|should work|untested|you may need to|double[- ]check)\b",
    )
    .expect("HEDGE regex should compile")
});

/// Upper-case markers only, so prose like "a todo list" is left alone.
static PLACEHOLDER_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(TODO|FIXME|XXX|HACK)\b|\b(todo|unimplemented)!\(|raise NotImplementedError|(//|#)\s*\.\.\.",
    )
    .expect("PLACEHOLDER_CODE regex should compile")
});

static PLACEHOLDER_PROSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(implementation goes here|insert (your )?code here|rest of (the )?(code|implementation)|<your[_ -]\w+>|\.\.\.\s*(rest|remaining))",
    )
    .expect("PLACEHOLDER_PROSE regex should compile")
});

/// Indicator patterns per language. Counting is by match, not by pattern.
static LANGUAGE_INDICATORS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    let table: [(&str, &[&str]); 6] = [
        (
            "python",
            &[
                r"(?m)^\s*def \w+\(.*\)\s*(->.*)?:",
                r"(?m)^\s*import [\w.]+(\s+as\s+\w+)?\s*$",
                r"(?m)^\s*from [\w.]+ import ",
                r"\bself\.",
                r"(?m)^\s*elif\b",
                r"__init__",
            ],
        ),
        (
            "javascript",
            &[
                r"\bconst \w+ =",
                r"\bfunction\s*\w*\s*\(",
                r"console\.log\(",
                r"\brequire\(",
                r"===",
                r"\bmodule\.exports\b",
            ],
        ),
        (
            "typescript",
            &[
                r"\binterface \w+\s*\{",
                r":\s*(string|number|boolean)\b",
                r"\bexport (type|interface)\b",
                r"\bas const\b",
            ],
        ),
        (
            "rust",
            &[
                r"\bfn \w+",
                r"\blet mut\b",
                r"\bimpl\b",
                r"println!\(",
                r"&mut\b",
                r"(?m)^\s*use \w+::",
            ],
        ),
        (
            "go",
            &[
                r"\bfunc \w*\s*\(",
                r":=",
                r"(?m)^package \w+",
                r"\bfmt\.\w+\(",
                r"\berr != nil\b",
            ],
        ),
        (
            "java",
            &[
                r"\bpublic (static )?(class|void|final)\b",
                r"System\.out\.print",
                r"@Override",
                r"(?m)^\s*private \w+(<[\w, ]+>)? \w+;",
            ],
        ),
    ];
    table
        .into_iter()
        .map(|(lang, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(p).expect("language indicator regex should compile"))
                .collect();
            (lang, compiled)
        })
        .collect()
});

static PYTHON_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:from\s+([\w.]+)\s+import\b|import\s+([\w.]+)(?:\s+as\s+\w+)?\s*[,;]?\s*$)")
        .expect("PYTHON_IMPORT regex should compile")
});

static JS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:\bfrom\s+|\brequire\(\s*)['"]([^'"]+)['"]"#).expect("JS_IMPORT regex should compile")
});

static RUST_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub\s+)?use\s+(\w+)::").expect("RUST_USE regex should compile")
});

/// Module roots that never need to be on an allow-list.
const BUILTIN_IMPORT_ROOTS: &[&str] = &[
    // rust path roots
    "std", "core", "alloc", "crate", "self", "super",
    // python stdlib
    "os", "sys", "re", "json", "typing", "collections", "itertools", "functools", "math", "time",
    "datetime", "pathlib", "subprocess", "logging", "dataclasses", "enum", "abc", "asyncio",
    "unittest", "io", "random", "string",
    // node builtins
    "fs", "path", "http", "https", "crypto", "util", "events", "child_process", "url", "stream",
];

/// Failure-signal detector. The plain [`detect_failure_signals`] uses the
/// default detector; an import allow-list enables `hallucinated_imports`.
#[derive(Debug, Clone, Default)]
pub struct FailureDetector {
    known_imports: Option<HashSet<String>>,
}

impl FailureDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag imports whose root module is not in `known` (builtins always pass).
    pub fn with_known_imports<I, S>(mut self, known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_imports = Some(known.into_iter().map(Into::into).collect());
        self
    }

    pub fn detect(&self, output: &str, expected_language: Option<&str>) -> Vec<FailureSignal> {
        let trimmed = output.trim();
        if trimmed.chars().count() < MIN_OUTPUT_CHARS {
            return vec![FailureSignal::EmptyOutput];
        }

        let mut signals = Vec::new();
        let expected = expected_language.map(normalize_language);

        if REFUSAL.is_match(trimmed) {
            signals.push(FailureSignal::Refusal);
        }
        if has_repetition_loop(trimmed) {
            signals.push(FailureSignal::RepetitionLoop);
        }
        if is_incomplete(trimmed) {
            signals.push(FailureSignal::Incomplete);
        }
        if let Some(ref lang) = expected {
            if is_wrong_language(trimmed, lang) {
                signals.push(FailureSignal::WrongLanguage);
            }
        }
        if HEDGE.find_iter(trimmed).count() >= MIN_HEDGES {
            signals.push(FailureSignal::ConfidenceCaveat);
        }
        if PLACEHOLDER_CODE.is_match(trimmed) || PLACEHOLDER_PROSE.is_match(trimmed) {
            signals.push(FailureSignal::PlaceholderMarkers);
        }
        if let Some(ref known) = self.known_imports {
            if !unknown_imports(trimmed, known).is_empty() {
                signals.push(FailureSignal::HallucinatedImports);
            }
        }
        if has_syntax_problem(trimmed, expected.as_deref()) {
            signals.push(FailureSignal::SyntaxError);
        }
        signals
    }
}

/// Run every check against `output` in order.
pub fn detect_failure_signals(output: &str, expected_language: Option<&str>) -> Vec<FailureSignal> {
    FailureDetector::new().detect(output, expected_language)
}

fn normalize_language(language: &str) -> String {
    let lower = language.trim().to_lowercase();
    match lower.as_str() {
        "py" | "python3" => "python".to_string(),
        "js" | "node" | "nodejs" | "jsx" => "javascript".to_string(),
        "ts" | "tsx" => "typescript".to_string(),
        "rs" => "rust".to_string(),
        "golang" => "go".to_string(),
        _ => lower,
    }
}

/// TypeScript is a superset of JavaScript; they never count against each other.
fn same_family(a: &str, b: &str) -> bool {
    fn family(l: &str) -> &str {
        if l == "typescript" {
            "javascript"
        } else {
            l
        }
    }
    family(a) == family(b)
}

/// Any `MIN_REPEAT_UNIT`+ byte unit repeated `MIN_REPEATS` times back to back.
///
/// Only the last `REPETITION_WINDOW` bytes are scanned. A loop that ends
/// earlier and is followed by that much non-repeating text is not reported.
/// The scan is quadratic in the window size, so long outputs are bounded.
///
/// For each period `p`, a run of `2p` positions where `b[i] == b[i + p]` is
/// exactly three contiguous copies of a `p`-byte unit.
fn has_repetition_loop(text: &str) -> bool {
    let bytes = text.as_bytes();
    let bytes = &bytes[bytes.len().saturating_sub(REPETITION_WINDOW)..];
    let n = bytes.len();

    for period in MIN_REPEAT_UNIT..=n / MIN_REPEATS {
        let needed = period * (MIN_REPEATS - 1);
        let mut run = 0usize;
        for i in 0..n - period {
            if bytes[i] == bytes[i + period] {
                run += 1;
                if run >= needed {
                    return true;
                }
            } else {
                run = 0;
            }
        }
    }
    false
}

fn is_incomplete(text: &str) -> bool {
    if text.ends_with("...") || text.ends_with('…') {
        return true;
    }
    let (mut opens, mut closes) = (0i64, 0i64);
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => opens += 1,
            ')' | ']' | '}' => closes += 1,
            _ => {}
        }
    }
    opens - closes > MAX_UNCLOSED_DEPTH
}

fn indicator_hits(text: &str, language: &str) -> Option<usize> {
    LANGUAGE_INDICATORS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, patterns)| patterns.iter().map(|re| re.find_iter(text).count()).sum())
}

fn is_wrong_language(text: &str, expected: &str) -> bool {
    // a language without indicators (e.g. json) counts as zero hits
    let expected_hits = indicator_hits(text, expected).unwrap_or(0);
    LANGUAGE_INDICATORS
        .iter()
        .filter(|(lang, _)| !same_family(lang, expected))
        .any(|(lang, _)| {
            let hits = indicator_hits(text, lang).unwrap_or(0);
            hits > expected_hits && hits >= MIN_FOREIGN_HITS
        })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn has_syntax_problem(text: &str, expected: Option<&str>) -> bool {
    if expected == Some("json") {
        return serde_json::from_str::<serde_json::Value>(strip_code_fence(text)).is_err();
    }
    let mut deviation = [0i64; 3];
    for c in text.chars() {
        match c {
            '(' => deviation[0] += 1,
            ')' => deviation[0] -= 1,
            '[' => deviation[1] += 1,
            ']' => deviation[1] -= 1,
            '{' => deviation[2] += 1,
            '}' => deviation[2] -= 1,
            _ => {}
        }
    }
    deviation.iter().any(|d| d.abs() > MAX_BRACKET_DEVIATION)
}

/// Root module of an import path: `numpy.linalg` → `numpy`,
/// `@scope/pkg/sub` → `@scope/pkg`, `node:fs` → `fs`.
fn import_root(path: &str) -> Option<String> {
    let path = path.strip_prefix("node:").unwrap_or(path);
    if path.starts_with('.') || path.starts_with('/') {
        return None;
    }
    if path.starts_with('@') {
        let mut parts = path.splitn(3, '/');
        let scope = parts.next()?;
        let name = parts.next()?;
        return Some(format!("{}/{}", scope, name));
    }
    path.split(['.', '/']).next().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Imported roots not in `known` and not builtin.
pub fn unknown_imports(text: &str, known: &HashSet<String>) -> Vec<String> {
    let mut roots = Vec::new();
    for caps in PYTHON_IMPORT.captures_iter(text) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            roots.extend(import_root(m.as_str()));
        }
    }
    for caps in JS_IMPORT.captures_iter(text) {
        roots.extend(import_root(&caps[1]));
    }
    for caps in RUST_USE.captures_iter(text) {
        roots.push(caps[1].to_string());
    }

    let mut unknown: Vec<String> = roots
        .into_iter()
        .filter(|r| !BUILTIN_IMPORT_ROOTS.contains(&r.as_str()) && !known.contains(r))
        .collect();
    unknown.sort();
    unknown.dedup();
    unknown
}
