//! Result sinks for evaluation artifacts.
//!
//! Every run produces exactly one artifact keyed by `(model, indicator)`:
//! the validated record when parsing succeeded, or a failure diagnostic
//! holding the raw response text otherwise. Sinks overwrite on re-run.

mod json;
mod sqlite;

use std::fmt;
use std::sync::Arc;

use scorecard_core::{EvalError, EvaluationOutcome, EvaluationRecord, ParseFailureReason, RunKey};
use serde::{Deserialize, Serialize};

pub use json::JsonFileSink;
pub use sqlite::{ModelSummary, SqliteSink, StoreError};

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub location: String,
}

impl ArtifactRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self { location: location.into() }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

/// Persisted form of a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDiagnostic {
    pub model: String,
    pub indicator: String,
    /// Always `parse_failure`.
    pub status: String,
    /// Human-readable reason.
    pub reason: String,
    pub detail: ParseFailureReason,
    pub raw_response_text: String,
}

/// What a sink stores for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Artifact {
    Record(EvaluationRecord),
    Failure(FailureDiagnostic),
}

impl Artifact {
    pub fn from_outcome(key: &RunKey, outcome: &EvaluationOutcome) -> Self {
        match outcome {
            EvaluationOutcome::Record(record) => Artifact::Record(record.clone()),
            EvaluationOutcome::Failure(failure) => Artifact::Failure(FailureDiagnostic {
                model: key.model.clone(),
                indicator: key.indicator.clone(),
                status: outcome.status().to_string(),
                reason: failure.reason.to_string(),
                detail: failure.reason.clone(),
                raw_response_text: failure.raw_response_text.clone(),
            }),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Artifact::Record(_) => "scored",
            Artifact::Failure(_) => "parse_failure",
        }
    }

    pub fn record(&self) -> Option<&EvaluationRecord> {
        match self {
            Artifact::Record(r) => Some(r),
            Artifact::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureDiagnostic> {
        match self {
            Artifact::Record(_) => None,
            Artifact::Failure(f) => Some(f),
        }
    }

    /// The (model, indicator) pair this artifact was stored for.
    pub fn key(&self) -> RunKey {
        match self {
            Artifact::Record(r) => RunKey::new(&r.model, &r.indicator),
            Artifact::Failure(f) => RunKey::new(&f.model, &f.indicator),
        }
    }
}

/// Destination for run outcomes.
pub trait ResultSink: Send + Sync {
    /// Stores the artifact for `key`, replacing any previous one.
    fn persist(&self, key: &RunKey, outcome: &EvaluationOutcome) -> Result<ArtifactRef, EvalError>;

    /// Reads back the artifact for `key`, if one was stored.
    fn load(&self, key: &RunKey) -> Result<Option<Artifact>, EvalError>;
}

/// Writes every outcome to all of its sinks, in order.
///
/// Not atomic across sinks: when a later sink fails, earlier ones keep what
/// they wrote, and the returned `Write` error lists them.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ResultSink for FanoutSink {
    fn persist(&self, key: &RunKey, outcome: &EvaluationOutcome) -> Result<ArtifactRef, EvalError> {
        let mut locations = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            match sink.persist(key, outcome) {
                Ok(artifact) => locations.push(artifact.location),
                Err(e) if locations.is_empty() => return Err(e),
                Err(e) => return Err(partial_write(e, &locations)),
            }
        }
        Ok(ArtifactRef::new(locations.join(", ")))
    }

    fn load(&self, key: &RunKey) -> Result<Option<Artifact>, EvalError> {
        for sink in &self.sinks {
            if let Some(artifact) = sink.load(key)? {
                return Ok(Some(artifact));
            }
        }
        Ok(None)
    }
}

fn partial_write(error: EvalError, written: &[String]) -> EvalError {
    let (target, message) = match error {
        EvalError::Write { target, message } => (target, message),
        other => ("fanout".to_string(), other.to_string()),
    };
    EvalError::Write { target, message: format!("{message} (already written: {})", written.join(", ")) }
}
