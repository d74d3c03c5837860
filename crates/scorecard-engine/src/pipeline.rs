//! Run orchestration: Load → Assemble → Call → Parse → Persist.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use scorecard_config::{ConfigError, EvalConfig, IndicatorRegistry, OutputConfig, TargetConfig};
use scorecard_core::{DocumentRef, EvalError, EvaluationOutcome, EvaluationRequest, RunKey};
use scorecard_llm::{EvaluationBackend, LlmMetrics};
use scorecard_store::{ArtifactRef, FanoutSink, JsonFileSink, ResultSink, SqliteSink};
use thiserror::Error;
use tracing::{error, info, info_span, Instrument};

use crate::loader::LoaderOptions;
use crate::parser::parse_response;
use crate::prompt::{assemble, PromptOptions};
use crate::retry::RetryPolicy;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A model under evaluation and the documents describing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub documents: Vec<DocumentRef>,
}

impl Target {
    pub fn new(id: impl Into<String>, name: impl Into<String>, documents: Vec<DocumentRef>) -> Self {
        Self { id: id.into(), name: name.into(), documents }
    }

    /// The configured target with the shared documents appended.
    pub fn from_config(config: &EvalConfig, target: &TargetConfig) -> Self {
        Self::new(&target.id, &target.name, config.documents_for(target))
    }

    /// Every configured target, in file order.
    pub fn all(config: &EvalConfig) -> Vec<Self> {
        config.targets.iter().map(|t| Self::from_config(config, t)).collect()
    }
}

/// Pipeline stage a run failed in. Parsing has no variant: a response that
/// fails validation is stored as a parse-failure outcome, not raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Assemble,
    Call,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Assemble => "assemble",
            Stage::Call => "call",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// A run that did not produce a stored artifact.
#[derive(Debug, Error)]
#[error("{key}: {stage} failed: {error}")]
pub struct RunError {
    pub key: RunKey,
    pub stage: Stage,
    #[source]
    pub error: EvalError,
    /// The outcome that could not be stored, when the failure was in persistence.
    pub unpersisted: Option<EvaluationOutcome>,
}

impl RunError {
    fn new(key: &RunKey, stage: Stage, error: EvalError) -> Self {
        Self { key: key.clone(), stage, error, unpersisted: None }
    }
}

/// A completed run: the outcome is stored, either as a record or a failure diagnostic.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub key: RunKey,
    pub outcome: EvaluationOutcome,
    pub artifact: ArtifactRef,
    /// Backend calls made, including retries. Zero for replays.
    pub attempts: u32,
    pub metrics: LlmMetrics,
    pub elapsed: Duration,
}

// ─────────────────────────────────────────────────────────────────────────────
// Evaluator
// ─────────────────────────────────────────────────────────────────────────────

pub struct Evaluator {
    backend: Arc<dyn EvaluationBackend>,
    registry: Arc<IndicatorRegistry>,
    sink: Arc<dyn ResultSink>,
    loader: LoaderOptions,
    prompt: PromptOptions,
    retry: RetryPolicy,
}

impl Evaluator {
    pub fn new(
        backend: Arc<dyn EvaluationBackend>,
        registry: Arc<IndicatorRegistry>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            backend,
            registry,
            sink,
            loader: LoaderOptions::default(),
            prompt: PromptOptions::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Wires loader, prompt and retry settings from `config`.
    pub fn from_config(
        config: &EvalConfig,
        backend: Arc<dyn EvaluationBackend>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, ConfigError> {
        let registry = Arc::new(config.registry()?);
        Ok(Self::new(backend, registry, sink)
            .with_loader(LoaderOptions::new(&config.documents.root, config.documents.max_chars))
            .with_prompt(PromptOptions {
                temperature: config.backend.temperature,
                stream: config.backend.stream,
            })
            .with_retry(RetryPolicy::from(&config.retry)))
    }

    pub fn with_loader(mut self, loader: LoaderOptions) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_prompt(mut self, prompt: PromptOptions) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }

    /// Loads documents and assembles the request without calling the backend.
    pub fn prepare(&self, target: &Target, indicator_id: &str) -> Result<EvaluationRequest, RunError> {
        let key = RunKey::new(&target.name, indicator_id);
        let indicator = self
            .registry
            .require(indicator_id)
            .map_err(|e| RunError::new(&key, Stage::Assemble, e))?;
        let documents = self
            .loader
            .load_all(&target.documents)
            .map_err(|e| RunError::new(&key, Stage::Load, e))?;
        Ok(assemble(indicator, &target.name, documents, self.prompt))
    }

    /// Evaluates one target on one indicator and stores the outcome.
    pub async fn run(&self, target: &Target, indicator_id: &str) -> Result<RunReport, RunError> {
        let span = info_span!("run", model = %target.name, indicator = %indicator_id);
        self.run_inner(target, indicator_id).instrument(span).await
    }

    async fn run_inner(&self, target: &Target, indicator_id: &str) -> Result<RunReport, RunError> {
        let start = Instant::now();
        let key = RunKey::new(&target.name, indicator_id);
        info!("Starting run via {}", self.backend.name());

        let request = self.prepare(target, indicator_id).map_err(log_failure)?;
        let chat = request.chat();
        let (response, attempts) = self
            .retry
            .call(|_| self.backend.complete(&chat))
            .await
            .map_err(|e| log_failure(RunError::new(&key, Stage::Call, e)))?;

        let outcome = parse_response(&response.content, &request);
        let artifact = self.persist(&key, outcome.clone()).map_err(log_failure)?;
        info!(
            "Run finished: {} -> {} ({} attempts, {} in / {} out tokens, {}ms)",
            outcome.status(),
            artifact,
            attempts,
            response.metrics.input_tokens,
            response.metrics.output_tokens,
            start.elapsed().as_millis()
        );

        Ok(RunReport {
            key,
            outcome,
            artifact,
            attempts,
            metrics: response.metrics,
            elapsed: start.elapsed(),
        })
    }

    /// Validates and stores a previously captured raw response without any network call.
    pub fn replay(&self, target: &Target, indicator_id: &str, raw: &str) -> Result<RunReport, RunError> {
        let _span = info_span!("replay", model = %target.name, indicator = %indicator_id).entered();
        let start = Instant::now();
        let key = RunKey::new(&target.name, indicator_id);

        let request = self.prepare(target, indicator_id).map_err(log_failure)?;
        let outcome = parse_response(raw, &request);
        let artifact = self.persist(&key, outcome.clone()).map_err(log_failure)?;
        info!("Replay finished: {} -> {}", outcome.status(), artifact);

        Ok(RunReport {
            key,
            outcome,
            artifact,
            attempts: 0,
            metrics: LlmMetrics::default(),
            elapsed: start.elapsed(),
        })
    }

    fn persist(&self, key: &RunKey, outcome: EvaluationOutcome) -> Result<ArtifactRef, RunError> {
        self.sink.persist(key, &outcome).map_err(|error| RunError {
            key: key.clone(),
            stage: Stage::Persist,
            error,
            unpersisted: Some(outcome),
        })
    }

    /// Runs every (target, indicator) pair, at most `concurrency` at a time.
    /// Results arrive in completion order.
    pub async fn run_batch(
        &self,
        targets: &[Target],
        indicator_ids: &[String],
        concurrency: usize,
    ) -> Vec<Result<RunReport, RunError>> {
        let jobs = targets
            .iter()
            .flat_map(|t| indicator_ids.iter().map(move |id| (t, id.as_str())));
        info!(
            "Batch: {} targets x {} indicators, concurrency {}",
            targets.len(),
            indicator_ids.len(),
            concurrency.max(1)
        );

        stream::iter(jobs)
            .map(|(target, id)| self.run(target, id))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}

fn log_failure(e: RunError) -> RunError {
    error!("Run failed: {}", e);
    e
}

/// The JSON directory sink, fanned out to SQLite when configured.
pub fn sink_from_config(output: &OutputConfig) -> Result<Arc<dyn ResultSink>, EvalError> {
    let json: Arc<dyn ResultSink> = Arc::new(JsonFileSink::new(&output.dir));
    let Some(db) = &output.sqlite else {
        return Ok(json);
    };

    if let Some(parent) = db.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EvalError::write(db.display().to_string(), e))?;
    }
    let sqlite = SqliteSink::new(db).map_err(|e| EvalError::write(db.display().to_string(), e))?;
    Ok(Arc::new(FanoutSink::new().with(json).with(Arc::new(sqlite))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_appends_shared_documents() {
        let config = EvalConfig::from_json(
            r#"{
                "documents": { "shared": [{ "name": "FMTI", "path": "fmti.txt" }] },
                "targets": [{ "id": "gpt4o", "name": "GPT-4o",
                              "documents": [{ "name": "System Card", "path": "card.txt" }] }]
            }"#,
        )
        .unwrap();

        let targets = Target::all(&config);
        assert_eq!(targets.len(), 1);
        let names: Vec<_> = targets[0].documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["System Card", "FMTI"]);
    }

    #[test]
    fn test_run_error_display_names_stage_and_key() {
        let err = RunError::new(
            &RunKey::new("GPT-4o", "known_gaps_limitations"),
            Stage::Call,
            EvalError::Transport("connection refused".into()),
        );
        assert_eq!(
            err.to_string(),
            "GPT-4o / known_gaps_limitations: call failed: Transport error: connection refused"
        );
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<_> = [Stage::Load, Stage::Assemble, Stage::Call, Stage::Persist]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, ["load", "assemble", "call", "persist"]);
    }

    #[test]
    fn test_sink_from_config_with_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig { dir: dir.path().join("results"), sqlite: Some(dir.path().join("db/scores.db")) };
        let sink = sink_from_config(&output).unwrap();

        let key = RunKey::new("GPT-4o", "a");
        let outcome = EvaluationOutcome::Failure(scorecard_core::ParseFailure::new(
            "prose",
            scorecard_core::ParseFailureReason::NotAnObject,
        ));
        let artifact = sink.persist(&key, &outcome).unwrap();
        assert!(artifact.location.contains("sqlite:"));
        assert!(dir.path().join("db/scores.db").exists());
    }
}
