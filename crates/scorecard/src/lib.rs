//! # scorecard
//!
//! Score model documentation against transparency rubrics with an LLM.
//!
//! One generic pipeline evaluates any `(model, indicator)` pair: documents are
//! loaded and truncated, a prompt is assembled from the indicator definition,
//! a backend is called under a retry policy, and the response is validated
//! into either an [`EvaluationRecord`](prelude::EvaluationRecord) or a
//! [`ParseFailure`](prelude::ParseFailure). Both are persisted.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use scorecard::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EvalConfig::load("scorecard.json".as_ref())?;
//! let credential = config.credential(|k| std::env::var(k).ok())?;
//! let backend = build_backend(&config.backend, credential)?;
//! let sink = sink_from_config(&config.output)?;
//! let evaluator = Evaluator::from_config(&config, backend, sink)?;
//!
//! let target = Target::from_config(&config, config.target("gpt4o")?);
//! let report = evaluator.run(&target, "known_gaps_limitations").await?;
//! println!("{}: {}", report.key, report.outcome.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! - `scorecard-core` - documents, indicators, scales, records, errors
//! - `scorecard-config` - configuration file and indicator registry
//! - `scorecard-llm` - chat-completions, Anthropic and scripted backends
//! - `scorecard-engine` - loader, prompt assembler, parser, retry, pipeline
//! - `scorecard-store` - JSON file and SQLite result sinks

pub use scorecard_config as config;
pub use scorecard_core as core;
pub use scorecard_engine as engine;
pub use scorecard_llm as llm;
pub use scorecard_store as store;

/// Prelude for convenient imports.
pub mod prelude {
    pub use scorecard_config::{
        ConfigError, Credential, EvalConfig, IndicatorRegistry, Provider, RetryConfig,
    };
    pub use scorecard_core::{
        DocumentRef, DocumentSource, EvalError, EvaluationOutcome, EvaluationRecord,
        EvaluationRequest, Evidence, Indicator, ParseFailure, ParseFailureReason, RunKey, Scale,
    };
    pub use scorecard_engine::{
        sink_from_config, Evaluator, LoaderOptions, PromptOptions, RetryPolicy, RunError,
        RunReport, Stage, Target,
    };
    pub use scorecard_llm::{build_backend, EvaluationBackend, LlmResponse, ScriptedBackend};
    pub use scorecard_store::{Artifact, JsonFileSink, ResultSink, SqliteSink};
}
