//! Signal extractor — turns free text into a [`TaskSignals`] feature vector
//!
//! Runs when no static rule matched. Every field comes from an independent
//! heuristic; none of them can fail, so neither can [`extract_signals`].

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{CostOfWrong, Novelty, OutputType, Reversibility, Scope, TaskSignals};

// ── File references ───────────────────────────────────────────────────────────

/// `"src/app.py"` or `'lib/util.ts'`
static QUOTED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']([\w./-]+\.[A-Za-z0-9]{1,6})["']"#).expect("QUOTED_PATH regex should compile")
});

/// `src/app.py`, `./lib/util.ts`, `main.rs`
static BARE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[\s(,])((?:\.{1,2}/)?(?:[\w-]+/)*[\w-]+\.(?:rs|py|ts|tsx|js|jsx|go|java|kt|rb|php|c|cc|cpp|h|hpp|cs|swift|scala|sql|sh|toml|json|ya?ml|md|html|css|vue))\b",
    )
    .expect("BARE_PATH regex should compile")
});

/// `` `config.yaml` ``
static BACKTICK_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`([\w./-]+\.[A-Za-z0-9]{1,6})`").expect("BACKTICK_NAME regex should compile")
});

// ── Reasoning depth ───────────────────────────────────────────────────────────

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z][a-z'-]*").expect("WORD regex should compile"));

const STEP_WORDS: &[&str] = &[
    "then", "after", "afterwards", "before", "first", "second", "next", "finally", "step",
    "steps", "once",
];
const CONDITIONAL_WORDS: &[&str] = &[
    "if", "unless", "when", "whenever", "otherwise", "depending", "except", "but", "whether",
];
const STEP_WEIGHT: f64 = 0.1;
const CONDITIONAL_WEIGHT: f64 = 0.08;
const PHRASE_WEIGHT: f64 = 0.2;

static MULTI_CLAUSE_PHRASES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\btrade-?offs?\b",
        r"\broot\s+cause\b",
        r"\bwhy\s+(does|is|do|are)\b",
        r"\bwhile\s+(keeping|preserving|maintaining|still)\b",
        r"\bwithout\s+(breaking|changing|losing|affecting)\b",
        r"\bedge\s+cases?\b",
        r"\bin\s+a\s+way\s+that\b",
        r"\bbackward(s)?[-\s]compatib",
        r"\bmake\s+sure\s+(that\s+)?\w+\s+(still|also)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("phrase regex should compile"))
    .collect()
});

// ── Tool chain ────────────────────────────────────────────────────────────────

/// Iterative fix loops only. A one-shot "fix X" deliberately does not match.
static TOOL_CHAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(until\s+(it|they|the\s+\w+|all\s+tests|everything)\s+(passes|pass|works|compiles|succeeds|is\s+green)|keep\s+(fixing|trying|iterating|running)|iterate\s+(on|until)|run\s+the\s+(tests|build|linter)\s+and\s+fix|fix\s+(all|every)\s+(the\s+)?(failing|broken|remaining)|make\s+(all\s+)?(the\s+)?tests\s+(pass|green))",
    )
    .expect("TOOL_CHAIN regex should compile")
});

// ── Keyword tiers ─────────────────────────────────────────────────────────────

const SYSTEM_SCOPE: &[&str] = &[
    "architecture", "entire codebase", "whole codebase", "entire system", "whole system",
    "across services", "distributed", "infrastructure", "microservice", "end-to-end",
    "monorepo", "every service",
];
const MODULE_SCOPE: &[&str] = &[
    "module", "package", "crate", "subsystem", "library", "multiple files", "several files",
    "across files", "component", "layer",
];
const FILE_SCOPE: &[&str] = &["file", "class", "script", "page", "struct", "this code"];

/// Output-type tiers, checked in order.
const OUTPUT_TIERS: &[(OutputType, &[&str])] = &[
    (
        OutputType::Analysis,
        &[
            "explain", "analyze", "analyse", "review", "why ", "what does", "compare", "audit",
            "assess", "evaluate", "investigate",
        ],
    ),
    (
        OutputType::DataTransform,
        &[
            "convert", "parse", "transform", "csv", "json to", "to json", "serialize",
            "deserialize", "extract data", "map the data",
        ],
    ),
    (
        OutputType::Text,
        &[
            "docstring", "documentation", "readme", "comment", "changelog", "commit message",
            "release notes", "summary of",
        ],
    ),
    (
        OutputType::CodeMod,
        &[
            "refactor", "fix", "update", "modify", "change", "rename", "optimize", "migrate",
            "clean up", "remove", "replace", "upgrade",
        ],
    ),
];

/// Novelty tiers, highest first; `KnownPattern` when nothing hits.
const NOVELTY_TIERS: &[(Novelty, &[&str])] = &[
    (
        Novelty::Novel,
        &[
            "novel", "from scratch", "new algorithm", "research", "invent", "prototype",
            "never been done", "custom protocol", "design a new",
        ],
    ),
    (
        Novelty::Adaptation,
        &[
            "adapt", "port ", "migrate", "integrate", "convert", "extend", "translate",
            "make it work with",
        ],
    ),
    (
        Novelty::Boilerplate,
        &[
            "boilerplate", "scaffold", "crud", "getter", "setter", "template", "stub",
            "docstring", "skeleton", "hello world",
        ],
    ),
];

/// Cost tiers, checked in order: security/compliance outrank
/// refactor/API terms, which outrank doc/style terms. `Low` when nothing hits.
const COST_TIERS: &[(CostOfWrong, &[&str])] = &[
    (
        CostOfWrong::Critical,
        &[
            "security", "auth", "password", "encryption", "crypto", "payment", "compliance",
            "gdpr", "hipaa", "credential", "secret", "vulnerability", "permission",
        ],
    ),
    (
        CostOfWrong::High,
        &[
            "production", "database migration", "deploy", "delete", "drop table", "data loss",
            "billing", "race condition", "concurrency", "financial", "backup",
        ],
    ),
    (
        CostOfWrong::Medium,
        &[
            "refactor", "api", "schema", "migration", "performance", "interface", "public",
            "breaking",
        ],
    ),
    (
        CostOfWrong::Trivial,
        &[
            "docstring", "comment", "typo", "format", "style", "lint", "readme", "rename",
            "whitespace", "indentation",
        ],
    ),
];

const HARD_TO_REVERSE: &[&str] = &[
    "delete", "drop", "migrate", "migration", "deploy", "production", "publish", "release",
    "force push", "rm -rf", "irreversible", "truncate", "send email",
];
const NEEDS_REVIEW: &[&str] = &[
    "refactor", "api", "schema", "security", "auth", "concurrency", "public interface",
    "breaking", "dependency", "config",
];

// ── Language familiarity ──────────────────────────────────────────────────────

/// How well small local models handle each language, 0-1.
const LANGUAGE_FAMILIARITY: &[(&str, f64)] = &[
    ("python", 0.9),
    ("javascript", 0.9),
    ("typescript", 0.85),
    ("sql", 0.85),
    ("java", 0.8),
    ("bash", 0.8),
    ("html", 0.85),
    ("css", 0.8),
    ("go", 0.75),
    ("c#", 0.75),
    ("rust", 0.7),
    ("c", 0.7),
    ("php", 0.7),
    ("ruby", 0.7),
    ("c++", 0.65),
    ("kotlin", 0.65),
    ("swift", 0.6),
    ("scala", 0.5),
    ("elixir", 0.45),
    ("haskell", 0.4),
    ("ocaml", 0.35),
    ("zig", 0.3),
];

/// Name mentions that identify a language. "go" and "c" are too ambiguous as
/// bare words and are only picked up via aliases or file extensions.
static LANGUAGE_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[^\w#+])(python|javascript|typescript|sql|java|bash|html|css|golang|c#|csharp|rust|php|ruby|c\+\+|cpp|kotlin|swift|scala|elixir|haskell|ocaml|zig|node\.?js|shell)(?:$|[^\w#+])",
    )
    .expect("LANGUAGE_MENTION regex should compile")
});

const EXTENSION_LANGUAGE: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("sql", "sql"),
    ("java", "java"),
    ("sh", "bash"),
    ("html", "html"),
    ("css", "css"),
    ("go", "go"),
    ("cs", "c#"),
    ("rs", "rust"),
    ("c", "c"),
    ("h", "c"),
    ("php", "php"),
    ("rb", "ruby"),
    ("cpp", "c++"),
    ("cc", "c++"),
    ("hpp", "c++"),
    ("kt", "kotlin"),
    ("swift", "swift"),
    ("scala", "scala"),
];

const DEFAULT_FAMILIARITY: f64 = 0.5;

/// Rough tokens of context pulled in per referenced file.
const TOKENS_PER_FILE: u32 = 2_000;

// ── Examples / tests ──────────────────────────────────────────────────────────

const EXAMPLE_MARKERS: &[&str] = &[
    "for example", "e.g.", "such as", "like this", "example:", "sample input", "expected output",
    "```",
];

static HAS_TESTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(existing\s+tests?|test\s+suite|tests?\s+(already\s+)?(exist|pass|cover)|covered\s+by\s+tests|with\s+(the\s+)?tests|failing\s+tests?)\b",
    )
    .expect("HAS_TESTS regex should compile")
});

/// Derive the feature vector for a task description.
pub fn extract_signals(description: &str) -> TaskSignals {
    let lower = description.to_lowercase();
    let file_refs = extract_file_refs(description);
    let detected_language = detect_language(&lower, &file_refs);

    TaskSignals {
        estimated_context_tokens: estimate_context_tokens(description, file_refs.len()),
        scope: infer_scope(&lower, file_refs.len()),
        reasoning_depth: reasoning_depth(&lower),
        requires_tool_chain: TOOL_CHAIN.is_match(&lower),
        output_type: first_tier(&lower, OUTPUT_TIERS).unwrap_or(OutputType::CodeGen),
        novelty: first_tier(&lower, NOVELTY_TIERS).unwrap_or(Novelty::KnownPattern),
        cost_of_wrong: first_tier(&lower, COST_TIERS).unwrap_or(CostOfWrong::Low),
        reversibility: infer_reversibility(&lower),
        language_familiarity: detected_language
            .as_deref()
            .map(familiarity_for)
            .unwrap_or(DEFAULT_FAMILIARITY),
        detected_language,
        has_examples: EXAMPLE_MARKERS.iter().any(|m| lower.contains(m)),
        has_tests: HAS_TESTS.is_match(&lower),
        file_refs,
    }
}

/// Collect file references from all three regex families into one set.
pub fn extract_file_refs(description: &str) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    for re in [&*QUOTED_PATH, &*BARE_PATH, &*BACKTICK_NAME] {
        for caps in re.captures_iter(description) {
            if let Some(m) = caps.get(1) {
                let path = m.as_str().trim_start_matches("./");
                // "e.g." and version numbers look like "x.y" but have no path-ish stem
                if path.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '.' || c == '_')
                    && !path.chars().all(|c| c.is_ascii_digit() || c == '.')
                {
                    refs.insert(path.to_string());
                }
            }
        }
    }
    refs
}

fn estimate_context_tokens(description: &str, file_count: usize) -> u32 {
    let text_tokens = (description.chars().count() / 4) as u32;
    text_tokens.saturating_add(TOKENS_PER_FILE.saturating_mul(file_count as u32))
}

fn infer_scope(lower: &str, file_count: usize) -> Scope {
    if SYSTEM_SCOPE.iter().any(|k| lower.contains(k)) {
        Scope::System
    } else if file_count >= 3 || MODULE_SCOPE.iter().any(|k| lower.contains(k)) {
        Scope::Module
    } else if file_count >= 1 || FILE_SCOPE.iter().any(|k| lower.contains(k)) {
        Scope::File
    } else {
        Scope::Function
    }
}

fn reasoning_depth(lower: &str) -> f64 {
    let (mut steps, mut conditionals) = (0usize, 0usize);
    for word in WORD.find_iter(lower).map(|m| m.as_str()) {
        if STEP_WORDS.contains(&word) {
            steps += 1;
        } else if CONDITIONAL_WORDS.contains(&word) {
            conditionals += 1;
        }
    }
    let phrases: usize = MULTI_CLAUSE_PHRASES
        .iter()
        .map(|re| re.find_iter(lower).count())
        .sum();

    let depth = steps as f64 * STEP_WEIGHT
        + conditionals as f64 * CONDITIONAL_WEIGHT
        + phrases as f64 * PHRASE_WEIGHT;
    depth.clamp(0.0, 1.0)
}

fn first_tier<T: Copy>(lower: &str, tiers: &[(T, &[&str])]) -> Option<T> {
    tiers
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(value, _)| *value)
}

fn infer_reversibility(lower: &str) -> Reversibility {
    if HARD_TO_REVERSE.iter().any(|k| lower.contains(k)) {
        Reversibility::HardToReverse
    } else if NEEDS_REVIEW.iter().any(|k| lower.contains(k)) {
        Reversibility::NeedsReview
    } else {
        Reversibility::EasyUndo
    }
}

fn detect_language(lower: &str, file_refs: &BTreeSet<String>) -> Option<String> {
    if let Some(caps) = LANGUAGE_MENTION.captures(lower) {
        let name = match &caps[1] {
            "golang" => "go",
            "csharp" => "c#",
            "cpp" => "c++",
            "shell" => "bash",
            n if n.starts_with("node") => "javascript",
            n => n,
        };
        return Some(name.to_string());
    }
    file_refs.iter().find_map(|path| {
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        EXTENSION_LANGUAGE
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, lang)| lang.to_string())
    })
}

/// Familiarity score for a language name, 0.5 when unknown.
pub fn familiarity_for(language: &str) -> f64 {
    LANGUAGE_FAMILIARITY
        .iter()
        .find(|(name, _)| *name == language)
        .map(|(_, score)| *score)
        .unwrap_or(DEFAULT_FAMILIARITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_refs_from_all_families_deduplicated() {
        let refs = extract_file_refs(
            r#"Update "src/app.py" and src/app.py, then touch `config.yaml` and ./lib/util.ts"#,
        );
        let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
        assert_eq!(refs, vec!["config.yaml", "lib/util.ts", "src/app.py"]);
    }

    #[test]
    fn test_file_refs_ignore_abbreviations_and_versions() {
        let refs = extract_file_refs("e.g. bump to version 1.2 or `3.10`");
        assert!(refs.is_empty(), "{:?}", refs);
    }

    #[test]
    fn test_scope_tiers() {
        assert_eq!(extract_signals("add two numbers").scope, Scope::Function);
        assert_eq!(extract_signals("tidy up this file").scope, Scope::File);
        assert_eq!(extract_signals("touch main.rs").scope, Scope::File);
        assert_eq!(extract_signals("split the auth module").scope, Scope::Module);
        assert_eq!(extract_signals("edit a.rs, b.rs and c.rs").scope, Scope::Module);
        assert_eq!(
            extract_signals("rework the module layout across the entire codebase").scope,
            Scope::System,
            "system keywords outrank module keywords"
        );
    }

    #[test]
    fn test_reasoning_depth_accumulates_and_clamps() {
        assert_eq!(extract_signals("add two numbers").reasoning_depth, 0.0);
        let moderate = extract_signals("first parse the input, then validate it").reasoning_depth;
        assert!((moderate - 0.2).abs() < 1e-9, "{}", moderate);
        let heavy = extract_signals(
            "first find the root cause, then fix it without breaking callers; if it fails \
             when retried, then consider the trade-offs and edge cases, finally document it",
        )
        .reasoning_depth;
        assert_eq!(heavy, 1.0);
    }

    #[test]
    fn test_tool_chain_only_for_iterative_language() {
        assert!(!extract_signals("fix the null check in parse_args").requires_tool_chain);
        assert!(!extract_signals("fix the bug").requires_tool_chain);
        assert!(extract_signals("run the tests and fix whatever breaks").requires_tool_chain);
        assert!(extract_signals("keep fixing until it compiles").requires_tool_chain);
        assert!(extract_signals("make the tests pass").requires_tool_chain);
    }

    #[test]
    fn test_output_type_tiers() {
        assert_eq!(extract_signals("explain the retry loop").output_type, OutputType::Analysis);
        assert_eq!(extract_signals("convert the csv export").output_type, OutputType::DataTransform);
        assert_eq!(extract_signals("update the readme").output_type, OutputType::Text);
        assert_eq!(extract_signals("fix the off-by-one").output_type, OutputType::CodeMod);
        assert_eq!(extract_signals("implement a trie").output_type, OutputType::CodeGen);
    }

    #[test]
    fn test_cost_priority_security_over_refactor_over_style() {
        assert_eq!(
            extract_signals("refactor the password reset flow and fix the lint").cost_of_wrong,
            CostOfWrong::Critical
        );
        assert_eq!(
            extract_signals("refactor the parser and fix the formatting").cost_of_wrong,
            CostOfWrong::Medium
        );
        assert_eq!(extract_signals("fix a typo").cost_of_wrong, CostOfWrong::Trivial);
        assert_eq!(extract_signals("implement a trie").cost_of_wrong, CostOfWrong::Low);
    }

    #[test]
    fn test_novelty_tiers() {
        assert_eq!(extract_signals("invent a new algorithm").novelty, Novelty::Novel);
        assert_eq!(extract_signals("port the lexer to wasm").novelty, Novelty::Adaptation);
        assert_eq!(extract_signals("scaffold a cli").novelty, Novelty::Boilerplate);
        assert_eq!(extract_signals("implement a trie").novelty, Novelty::KnownPattern);
    }

    #[test]
    fn test_reversibility() {
        assert_eq!(
            extract_signals("deploy the new build").reversibility,
            Reversibility::HardToReverse
        );
        assert_eq!(
            extract_signals("change the api shape").reversibility,
            Reversibility::NeedsReview
        );
        assert_eq!(extract_signals("add a helper").reversibility, Reversibility::EasyUndo);
    }

    #[test]
    fn test_language_familiarity() {
        let py = extract_signals("write a python function to dedupe a list");
        assert_eq!(py.detected_language.as_deref(), Some("python"));
        assert_eq!(py.language_familiarity, 0.9);

        let ext = extract_signals("tidy up lexer.ml and parser.rs");
        assert_eq!(ext.detected_language.as_deref(), Some("rust"));
        assert_eq!(ext.language_familiarity, 0.7);

        let unknown = extract_signals("make it faster");
        assert_eq!(unknown.detected_language, None);
        assert_eq!(unknown.language_familiarity, 0.5);
    }

    #[test]
    fn test_go_needs_alias_or_extension() {
        assert_eq!(extract_signals("go ahead and add a flag").detected_language, None);
        assert_eq!(
            extract_signals("add a golang flag").detected_language.as_deref(),
            Some("go")
        );
        assert_eq!(
            extract_signals("add a flag to cmd/main.go").detected_language.as_deref(),
            Some("go")
        );
    }

    #[test]
    fn test_examples_and_tests() {
        let s = extract_signals("normalize names, e.g. 'Bob ' -> 'bob'; the test suite covers it");
        assert!(s.has_examples);
        assert!(s.has_tests);
        let bare = extract_signals("normalize names");
        assert!(!bare.has_examples);
        assert!(!bare.has_tests);
    }

    #[test]
    fn test_context_tokens_grow_with_files() {
        let none = extract_signals("tidy up");
        let two = extract_signals("tidy up a.py and b.py");
        assert!(two.estimated_context_tokens >= none.estimated_context_tokens + 4_000);
    }
}
