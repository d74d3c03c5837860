//! `scorecard` - evaluate model documentation against transparency indicators.
//!
//! ## Commands
//!
//! - `run`: evaluate targets on indicators and store one artifact per pair
//! - `prompt`: print the assembled prompt for one pair without calling a backend
//! - `indicators`: list the indicator registry
//! - `summary`: per-model rollup from the SQLite store
//! - `replay`: validate a saved raw response and store the outcome

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scorecard_config::{EvalConfig, IndicatorRegistry};
use scorecard_engine::{sink_from_config, Evaluator, RunError, RunReport, Target};
use scorecard_llm::{build_backend, ScriptedBackend};
use scorecard_store::SqliteSink;
use tracing::info;

#[derive(Parser)]
#[command(name = "scorecard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Score model documentation against transparency rubrics", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate targets on indicators
    Run {
        #[arg(short, long, default_value = "scorecard.json", env = "SCORECARD_CONFIG")]
        config: PathBuf,

        /// Target id to evaluate (repeatable; default: all targets)
        #[arg(short, long)]
        target: Vec<String>,

        /// Indicator id to score (repeatable; default: all indicators)
        #[arg(short, long)]
        indicator: Vec<String>,

        /// Maximum runs in flight
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },

    /// Print the assembled prompt for one target and indicator
    Prompt {
        #[arg(short, long, default_value = "scorecard.json", env = "SCORECARD_CONFIG")]
        config: PathBuf,

        #[arg(short, long)]
        target: String,

        #[arg(short, long)]
        indicator: String,
    },

    /// List available indicators
    Indicators {
        /// Include indicators from this config's `indicators_dir`
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Per-model rollup of stored results
    Summary {
        #[arg(short, long, default_value = "scorecard.json", env = "SCORECARD_CONFIG")]
        config: PathBuf,
    },

    /// Validate a saved raw response and store the outcome
    Replay {
        #[arg(short, long, default_value = "scorecard.json", env = "SCORECARD_CONFIG")]
        config: PathBuf,

        #[arg(short, long)]
        target: String,

        #[arg(short, long)]
        indicator: String,

        /// File holding the raw backend response
        #[arg(short, long)]
        response: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .compact()
        .init();

    match cli.command {
        Commands::Run { config, target, indicator, concurrency } => {
            run(&config, &target, &indicator, concurrency).await
        }
        Commands::Prompt { config, target, indicator } => prompt(&config, &target, &indicator),
        Commands::Indicators { config } => indicators(config.as_deref()),
        Commands::Summary { config } => summary(&config),
        Commands::Replay { config, target, indicator, response } => {
            replay(&config, &target, &indicator, &response)
        }
    }
}

fn load_config(path: &Path) -> Result<EvalConfig> {
    EvalConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn select_targets(config: &EvalConfig, ids: &[String]) -> Result<Vec<Target>> {
    if ids.is_empty() {
        return Ok(Target::all(config));
    }
    ids.iter()
        .map(|id| -> Result<Target> { Ok(Target::from_config(config, config.target(id)?)) })
        .collect()
}

/// An evaluator for commands that never reach a backend.
fn offline_evaluator(config: &EvalConfig) -> Result<Evaluator> {
    let sink = sink_from_config(&config.output)?;
    Ok(Evaluator::from_config(config, Arc::new(ScriptedBackend::new()), sink)?)
}

fn report_line(report: &RunReport) -> String {
    match report.outcome.record() {
        Some(r) => format!(
            "{}: scored {} (normalized {}) -> {}",
            report.key, r.raw_score, r.normalized_score, report.artifact
        ),
        None => format!("{}: parse_failure -> {}", report.key, report.artifact),
    }
}

async fn run(config_path: &Path, target_ids: &[String], indicator_ids: &[String], concurrency: usize) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let targets = select_targets(&config, target_ids)?;
    if targets.is_empty() {
        bail!("no targets configured in {}", config_path.display());
    }

    let credential = config.credential(|key| std::env::var(key).ok())?;
    let backend = build_backend(&config.backend, credential)?;
    let sink = sink_from_config(&config.output)?;
    let evaluator = Evaluator::from_config(&config, backend, sink)?;

    let indicators: Vec<String> = if indicator_ids.is_empty() {
        evaluator.registry().ids().into_iter().map(String::from).collect()
    } else {
        indicator_ids.to_vec()
    };

    info!("╔══════════════════════════════════════════════════════════════");
    info!("║ SCORECARD: {} targets x {} indicators", targets.len(), indicators.len());
    info!("║ Backend: {} ({})", config.backend.model, config.backend.endpoint());
    info!("╚══════════════════════════════════════════════════════════════");

    let results = evaluator.run_batch(&targets, &indicators, concurrency).await;
    let (reports, failures): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());

    for report in reports.into_iter().flatten() {
        println!("{}", report_line(&report));
    }
    let failures: Vec<RunError> = failures.into_iter().filter_map(|r| r.err()).collect();
    for failure in &failures {
        eprintln!("FAILED {}", failure);
    }
    info!("{} runs failed", failures.len());

    if failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn prompt(config_path: &Path, target_id: &str, indicator_id: &str) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let target = Target::from_config(&config, config.target(target_id)?);
    let request = offline_evaluator(&config)?.prepare(&target, indicator_id)?;

    println!("{}", request.system);
    println!("\n----- USER -----\n");
    println!("{}", request.user);
    Ok(ExitCode::SUCCESS)
}

fn indicators(config_path: Option<&Path>) -> Result<ExitCode> {
    let registry = match config_path {
        Some(path) => load_config(path)?.registry()?,
        None => IndicatorRegistry::builtin()?,
    };

    for indicator in registry.list() {
        println!(
            "{:<28} {:<8} [{}] {}",
            indicator.id,
            indicator.code,
            indicator.scale.describe(),
            indicator.title
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn summary(config_path: &Path) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let Some(db) = &config.output.sqlite else {
        bail!("output.sqlite is not set in {}", config_path.display());
    };
    let store = SqliteSink::new(db).with_context(|| format!("opening {}", db.display()))?;

    println!("{:<32} {:>10} {:>7} {:>8} {:>6}", "model", "indicators", "scored", "failures", "mean");
    for row in store.summary()? {
        let mean = row
            .mean_normalized_score
            .map(|m| format!("{m:.3}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<32} {:>10} {:>7} {:>8} {:>6}",
            row.model, row.indicators, row.scored, row.parse_failures, mean
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn replay(config_path: &Path, target_id: &str, indicator_id: &str, response: &Path) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let target = Target::from_config(&config, config.target(target_id)?);
    let raw = std::fs::read_to_string(response).with_context(|| format!("reading {}", response.display()))?;

    let report = offline_evaluator(&config)?.replay(&target, indicator_id, &raw)?;
    println!("{}", report_line(&report));
    if let Some(failure) = report.outcome.failure() {
        println!("  reason: {}", failure.reason);
    }
    Ok(ExitCode::SUCCESS)
}
