//! Static pattern table — layer 1 of the cascade
//!
//! An ordered list of rules. Each rule's patterns are case-insensitive
//! regexes; the first rule (top to bottom) with any matching pattern wins.
//! There is no backtracking and no union of matches, so order is part of
//! correctness:
//!
//! ```text
//! 1. literal shell / VCS / build commands     → no_llm
//! 2. security, compliance                      → cloud, critical
//! 3. destructive data + architecture           → cloud, high
//! 4. concurrency, deep debugging, wide refactor→ local, high level
//! 5. generic code generation (crud, tests)     → local, mid level
//! 6. doc / style / rename                      → local, level 1
//! ```
//!
//! A doc-comment request on an auth module must hit rule 2 before rule 6.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use super::types::{CostOfWrong, Route};

/// One entry of the static table.
#[derive(Debug, Clone, Serialize)]
pub struct PatternRule {
    /// Category key, also used for specialist model lookup.
    pub category: &'static str,
    /// Regex sources, matched case-insensitively.
    pub patterns: &'static [&'static str],
    pub route: Route,
    /// Complexity level 0-6.
    pub level: u8,
    /// Confidence in (0, 1].
    pub confidence: f64,
    pub cost_of_wrong: CostOfWrong,
}

/// A successful table lookup.
#[derive(Debug, Clone, Serialize)]
pub struct PatternMatch {
    pub rule: &'static PatternRule,
    /// The pattern source that fired.
    pub matched_pattern: &'static str,
    pub confidence: f64,
}

pub static PATTERN_RULES: &[PatternRule] = &[
    PatternRule {
        category: "vcs_readonly",
        patterns: &[
            r"^\s*git\s+(status|log|diff|branch|show|blame|remote\s+-v|stash\s+list)(\s+[-\w./~@^:=]+)*\s*$",
            r"^\s*(show|check)\s+(the\s+)?git\s+(status|log|history)\s*$",
        ],
        route: Route::NoLlm,
        level: 0,
        confidence: 0.95,
        cost_of_wrong: CostOfWrong::Trivial,
    },
    PatternRule {
        category: "shell_inspection",
        patterns: &[
            // arguments must be flags, counts or path-like, so prose such as
            // "tail call optimization" or "head of the list" stays out
            r"^\s*(ls|pwd|cat|head|tail|wc|tree|du|df)(\s+(-[\w-]+|\d+|[\w~*-]*[./~*][\w./~*-]*))*\s*$",
            r"^\s*which\s+[\w.+-]+\s*$",
            r"^\s*list\s+(all\s+)?(the\s+)?files(\s+in\s+[\w./~*-]+)?\s*$",
            r"^\s*(count|how\s+many)\s+lines\s+(are\s+)?in\s+[\w./~*-]+\s*\??\s*$",
        ],
        route: Route::NoLlm,
        level: 0,
        confidence: 0.9,
        cost_of_wrong: CostOfWrong::Trivial,
    },
    PatternRule {
        category: "build_command",
        patterns: &[
            r"^\s*(cargo|npm|yarn|pnpm|make|go|pytest|mvn|gradle)\s+(build|test|run|fmt|install|check|lint)?\s*$",
            r"^\s*run\s+(the\s+)?(tests|test\s+suite|build|linter|formatter)\s*$",
        ],
        route: Route::NoLlm,
        level: 0,
        confidence: 0.9,
        cost_of_wrong: CostOfWrong::Trivial,
    },
    PatternRule {
        category: "security",
        patterns: &[
            r"\bsecurity\s+(audit|review|fix|patch|hardening|vulnerabilit)",
            r"\b(authentication|authorization|oauth2?|jwt|csrf|xss|sql\s+injection|session\s+hijack)",
            r"\b(encrypt|decrypt|cryptograph|hmac|signing\s+key)",
            r"\b(passwords?|credentials?|secrets?|api\s+keys?)\b.*\b(stor|hash|handl|rotat|leak)",
            r"\bcve-\d{4}",
        ],
        route: Route::Cloud,
        level: 6,
        confidence: 0.9,
        cost_of_wrong: CostOfWrong::Critical,
    },
    PatternRule {
        category: "compliance",
        patterns: &[
            r"\b(gdpr|hipaa|pci(-dss)?|soc\s?2|compliance)\b",
            r"\b(payment|billing)\s+(flow|processing|logic|integration)",
        ],
        route: Route::Cloud,
        level: 6,
        confidence: 0.85,
        cost_of_wrong: CostOfWrong::Critical,
    },
    PatternRule {
        category: "data_migration",
        patterns: &[
            r"\bdatabase\s+migration",
            r"\bmigrat\w*\s+(the\s+)?(production\s+)?(database|schema|data)\b",
            r"\bdrop\s+(table|database|column)\b",
            r"\b(production|prod)\s+(data|database|deploy)",
        ],
        route: Route::Cloud,
        level: 5,
        confidence: 0.85,
        cost_of_wrong: CostOfWrong::High,
    },
    PatternRule {
        category: "architecture",
        patterns: &[
            r"\b(system|software|overall)\s+architecture\b",
            r"\barchitect\s+(a|an|the)\b",
            r"\bdesign\s+(a|an|the)\s+(new\s+)?(system|service|architecture|platform|distributed)",
            r"\bmicroservices?\b",
            r"\bdistributed\s+(system|lock|consensus|cache|transaction)",
        ],
        route: Route::Cloud,
        level: 6,
        confidence: 0.85,
        cost_of_wrong: CostOfWrong::High,
    },
    PatternRule {
        category: "concurrency",
        patterns: &[
            r"\b(race\s+conditions?|deadlocks?|lock-free|thread[-\s]safe\w*|data\s+races?)\b",
            r"\bconcurren(t|cy)\s+(bug|issue|access|model)",
        ],
        route: Route::Local,
        level: 5,
        confidence: 0.75,
        cost_of_wrong: CostOfWrong::High,
    },
    PatternRule {
        category: "deep_debugging",
        patterns: &[
            r"\b(debug|investigate|diagnose|track\s+down)\b.*\b(intermittent|flaky|memory\s+leak|segfault|crash|performance\s+regression)",
            r"\bmemory\s+leak\b",
            r"\bflaky\s+tests?\b",
        ],
        route: Route::Local,
        level: 4,
        confidence: 0.7,
        cost_of_wrong: CostOfWrong::Medium,
    },
    PatternRule {
        category: "wide_refactor",
        patterns: &[
            r"\brefactor\w*\b.*\b(across|entire|whole|every|multiple|codebase)\b",
            r"\b(restructure|reorganize|split\s+up)\s+(the\s+)?(module|package|codebase|crate)",
        ],
        route: Route::Local,
        level: 4,
        confidence: 0.7,
        cost_of_wrong: CostOfWrong::Medium,
    },
    PatternRule {
        category: "crud",
        patterns: &[
            r"\bcrud\b",
            r"\b(rest|http|api)\s+endpoints?\b",
            r"\b(create|add)\s+(an?\s+)?(new\s+)?(get|post|put|patch|delete)\s+(route|endpoint|handler)",
        ],
        route: Route::Local,
        level: 3,
        confidence: 0.8,
        cost_of_wrong: CostOfWrong::Low,
    },
    PatternRule {
        category: "unit_tests",
        patterns: &[
            r"\b(write|add|create|generate)\s+(a\s+|some\s+|more\s+)?(unit\s+|integration\s+)?tests?\b",
            r"\btest\s+cases?\s+for\b",
        ],
        route: Route::Local,
        level: 2,
        confidence: 0.8,
        cost_of_wrong: CostOfWrong::Low,
    },
    PatternRule {
        category: "small_utility",
        patterns: &[
            r"\b(write|create|build)\s+(a\s+)?regex\b",
            r"\bregular\s+expression\b",
            r"\b(helper|utility)\s+function\b",
        ],
        route: Route::Local,
        level: 2,
        confidence: 0.75,
        cost_of_wrong: CostOfWrong::Low,
    },
    PatternRule {
        category: "explain_snippet",
        patterns: &[r"^\s*(explain|what\s+does)\s+(this|the\s+following)\s+(code|function|snippet|regex|line|query)"],
        route: Route::Local,
        level: 2,
        confidence: 0.75,
        cost_of_wrong: CostOfWrong::Low,
    },
    PatternRule {
        category: "rename",
        patterns: &[
            r"\brename\s+(the\s+|this\s+)?(variable|function|method|class|field|parameter|file)\b",
            r"\bfix\s+(a\s+|the\s+)?typos?\b",
        ],
        route: Route::Local,
        level: 1,
        confidence: 0.85,
        cost_of_wrong: CostOfWrong::Trivial,
    },
    PatternRule {
        category: "documentation",
        patterns: &[
            r"\bdocstrings?\b",
            r"\bdoc\s?comments?\b",
            r"\b(add|write|update)\s+(the\s+)?(comments|documentation|jsdoc|javadoc|readme)\b",
        ],
        route: Route::Local,
        level: 1,
        confidence: 0.9,
        cost_of_wrong: CostOfWrong::Trivial,
    },
    PatternRule {
        category: "formatting",
        patterns: &[
            r"\b(format|reformat|lint|prettier|rustfmt|black)\b.*\b(code|file|this|project)\b",
            r"\bfix\s+(the\s+)?(indentation|whitespace|lint\s+(errors|warnings))",
            r"\bsort\s+(the\s+)?imports\b",
        ],
        route: Route::Local,
        level: 1,
        confidence: 0.9,
        cost_of_wrong: CostOfWrong::Trivial,
    },
    PatternRule {
        category: "commit_message",
        patterns: &[r"\b(commit\s+message|changelog\s+entry|pr\s+description)\b"],
        route: Route::Local,
        level: 1,
        confidence: 0.9,
        cost_of_wrong: CostOfWrong::Trivial,
    },
];

struct CompiledRule {
    rule: &'static PatternRule,
    regexes: Vec<(&'static str, Regex)>,
}

static COMPILED: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    PATTERN_RULES
        .iter()
        .map(|rule| CompiledRule {
            rule,
            regexes: rule
                .patterns
                .iter()
                .map(|src| {
                    let re = RegexBuilder::new(src)
                        .case_insensitive(true)
                        .build()
                        .expect("pattern table regex should compile");
                    (*src, re)
                })
                .collect(),
        })
        .collect()
});

/// Look up a description in the static table. First matching rule wins.
pub fn match_patterns(description: &str) -> Option<PatternMatch> {
    COMPILED.iter().find_map(|compiled| {
        compiled
            .regexes
            .iter()
            .find(|(_, re)| re.is_match(description))
            .map(|(src, _)| PatternMatch {
                rule: compiled.rule,
                matched_pattern: src,
                confidence: compiled.rule.confidence,
            })
    })
}

/// Check the table invariants. Returns one message per violation.
pub fn validate_table(rules: &[PatternRule]) -> Vec<String> {
    let mut problems = Vec::new();
    for rule in rules {
        if rule.patterns.is_empty() {
            problems.push(format!("{}: empty pattern list", rule.category));
        }
        if rule.level > 6 {
            problems.push(format!("{}: level {} outside 0-6", rule.category, rule.level));
        }
        if !(rule.confidence > 0.0 && rule.confidence <= 1.0) {
            problems.push(format!(
                "{}: confidence {} outside (0, 1]",
                rule.category, rule.confidence
            ));
        }
        for src in rule.patterns {
            if let Err(e) = Regex::new(src) {
                problems.push(format!("{}: bad pattern {:?}: {}", rule.category, src, e));
            }
        }
    }
    problems
}
