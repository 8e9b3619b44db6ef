//! tier-router debug CLI
//!
//! Exposes the library entry points as subcommands and prints JSON.
//!
//! # Usage
//!
//! ```bash
//! tier-router classify "add a docstring to parse_args" --level 2
//! cat output.py | tier-router evaluate --language python
//! tier-router decompose "build a blog with auth and comments" --enable
//! tier-router recommend code_gen 3 --history .tier-router-history.jsonl
//! tier-router record "rename foo" --task-type code_mod --level 1 --outcome success
//! tier-router history-stats
//!
//! # Configuration
//! TIER_ROUTER_LEVEL=3 TIER_ROUTER_BACKEND_URL=http://gpu-box:11434 tier-router classify "..."
//! tier-router --config router.toml classify "..."
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tier_router::{
    ConfigOverrides, FailureDetector, HistoricalRecord, HistoryStore, JsonlHistoryStore,
    OllamaBackend, Orchestrator, Outcome, RouterConfig,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (defaults to TIER_ROUTER_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSONL outcome history file
    #[arg(long, global = true, default_value = ".tier-router-history.jsonl")]
    history: PathBuf,

    /// Skip the local model server entirely
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route a task description
    Classify {
        description: String,
        /// Delegation level 0-5 (overrides config)
        #[arg(long)]
        level: Option<u8>,
        /// Disable local triage for this call
        #[arg(long, default_value_t = false)]
        no_triage: bool,
    },
    /// Judge a local model's output (read from --file or stdin)
    Evaluate {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Expected output language (python, rust, json, ...)
        #[arg(long)]
        language: Option<String>,
        /// Delegation level whose escalation policy applies
        #[arg(long)]
        level: Option<u8>,
        /// Allowed import roots; enables hallucinated-import detection
        #[arg(long = "known-import")]
        known_imports: Vec<String>,
    },
    /// Split a task into subtasks with the local model
    Decompose {
        description: String,
        /// Enable decomposition for this call
        #[arg(long, default_value_t = false)]
        enable: bool,
    },
    /// What outcome history says about a task type at a level
    Recommend { task_type: String, level: u8 },
    /// Append an outcome record to the history file
    Record {
        description: String,
        #[arg(long)]
        task_type: String,
        #[arg(long)]
        level: u8,
        /// success, escalated, user_rejected or unknown
        #[arg(long)]
        outcome: String,
        #[arg(long)]
        quality: Option<f64>,
    },
    /// Aggregate outcome history per task type
    HistoryStats,
}

fn load_config(path: Option<&PathBuf>) -> Result<RouterConfig> {
    match path {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Ok(RouterConfig::from_toml_str(&source)?)
        }
        None => Ok(RouterConfig::from_env()),
    }
}

fn build_orchestrator(config: RouterConfig, history: Arc<dyn HistoryStore>, offline: bool) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(config.clone()).with_history(history);
    if !offline {
        match OllamaBackend::from_config(&config) {
            Ok(backend) => orchestrator = orchestrator.with_backend(Arc::new(backend)),
            Err(e) => warn!(error = %e, "local backend unavailable, continuing without it"),
        }
    }
    orchestrator
}

fn parse_outcome(raw: &str) -> Result<Outcome> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .with_context(|| format!("unknown outcome '{}'", raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_ref())?;
    let history: Arc<dyn HistoryStore> = Arc::new(JsonlHistoryStore::new(&args.history));

    match args.command {
        Command::Classify {
            description,
            level,
            no_triage,
        } => {
            if no_triage {
                config.apply_overrides(&ConfigOverrides {
                    triage_enabled: Some(false),
                    ..Default::default()
                });
            }
            let orchestrator = build_orchestrator(config, history, args.offline);
            print_json(&orchestrator.classify_task(&description, level).await)
        }
        Command::Evaluate {
            file,
            language,
            level,
            known_imports,
        } => {
            let output = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let mut detector = FailureDetector::new();
            if !known_imports.is_empty() {
                detector = detector.with_known_imports(known_imports);
            }
            let orchestrator = Orchestrator::new(config).with_detector(detector);
            print_json(&orchestrator.evaluate_output(&output, language.as_deref(), level))
        }
        Command::Decompose {
            description,
            enable,
        } => {
            if enable {
                config.apply_overrides(&ConfigOverrides {
                    decomposition_enabled: Some(true),
                    ..Default::default()
                });
            }
            let orchestrator = build_orchestrator(config, history, args.offline);
            print_json(&orchestrator.decompose_task(&description).await)
        }
        Command::Recommend { task_type, level } => {
            let orchestrator = Orchestrator::new(config).with_history(history);
            print_json(&orchestrator.recommendation(&task_type, level))
        }
        Command::Record {
            description,
            task_type,
            level,
            outcome,
            quality,
        } => {
            let mut record = HistoricalRecord::new(&description, task_type, level, parse_outcome(&outcome)?);
            if let Some(q) = quality {
                record = record.with_quality(q);
            }
            history.append(&record)?;
            print_json(&record)
        }
        Command::HistoryStats => {
            let orchestrator = Orchestrator::new(config).with_history(history);
            print_json(&orchestrator.history_summary()?)
        }
    }
}
