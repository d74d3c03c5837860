use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A cited, verbatim excerpt from a supplied document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub doc: String,
    pub location: String,
    pub quote: String,
}

/// A validated evaluation of one model on one indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Model under evaluation.
    pub model: String,
    /// Indicator id.
    pub indicator: String,
    pub rubric_summary: String,
    /// Always a member of the indicator's scale.
    pub raw_score: f64,
    /// The raw score mapped onto 0-1; equal to `raw_score` on unit scales.
    pub normalized_score: f64,
    pub justification: String,
    pub evidence: Vec<Evidence>,
}

/// Why a backend response could not be turned into an [`EvaluationRecord`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseFailureReason {
    #[error("not valid JSON: {message}")]
    NotJson { message: String },

    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("missing required field `{field}`")]
    MissingField { field: String },

    #[error("field `{field}` must be {expected}")]
    WrongType { field: String, expected: String },

    #[error("score not in declared scale: {score} is not one of {scale}")]
    ScoreNotInScale { score: f64, scale: String },

    #[error("normalized score {found} does not match expected {expected}")]
    NormalizedMismatch { expected: f64, found: f64 },

    #[error("evidence[{index}] is malformed: {message}")]
    MalformedEvidence { index: usize, message: String },

    #[error("evidence[{index}] has an empty quote")]
    EmptyQuote { index: usize },

    #[error("evidence[{index}] cites unknown document `{doc}`")]
    UnknownDocument { index: usize, doc: String },
}

/// A response that failed validation, kept verbatim for manual inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub raw_response_text: String,
    pub reason: ParseFailureReason,
}

impl ParseFailure {
    pub fn new(raw_response_text: impl Into<String>, reason: ParseFailureReason) -> Self {
        Self { raw_response_text: raw_response_text.into(), reason }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} chars of response)", self.reason, self.raw_response_text.chars().count())
    }
}

/// Result of validating one backend response.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Record(EvaluationRecord),
    Failure(ParseFailure),
}

impl EvaluationOutcome {
    pub fn is_record(&self) -> bool {
        matches!(self, EvaluationOutcome::Record(_))
    }

    pub fn record(&self) -> Option<&EvaluationRecord> {
        match self {
            EvaluationOutcome::Record(r) => Some(r),
            EvaluationOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ParseFailure> {
        match self {
            EvaluationOutcome::Record(_) => None,
            EvaluationOutcome::Failure(f) => Some(f),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            EvaluationOutcome::Record(_) => "scored",
            EvaluationOutcome::Failure(_) => "parse_failure",
        }
    }
}

/// Identifies one (model, indicator) run and its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub model: String,
    pub indicator: String,
}

impl RunKey {
    pub fn new(model: impl Into<String>, indicator: impl Into<String>) -> Self {
        Self { model: model.into(), indicator: indicator.into() }
    }

    /// Filesystem-safe artifact name, e.g. `gpt-4o__known_gaps_limitations__3f9a1c0e`.
    ///
    /// The trailing digest covers the raw model and indicator strings, so keys
    /// whose slugs collide still get distinct names.
    pub fn artifact_name(&self) -> String {
        format!("{}__{}__{}", slug(&self.model), slug(&self.indicator), self.digest())
    }

    fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.indicator.as_bytes());
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(8);
        digest
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.model, self.indicator)
    }
}

/// Lowercase, filesystem-safe form of a model or indicator name.
pub fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        match c {
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c.to_ascii_lowercase()),
            '.' => out.push('.'),
            _ if !out.ends_with('-') => out.push('-'),
            _ => {}
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_is_filesystem_safe() {
        assert_eq!(slug("Gemini 2.0 Pro"), "gemini-2.0-pro");
        assert_eq!(slug("L4/coverage"), "l4-coverage");
        assert_eq!(slug("  "), "unnamed");
    }

    #[test]
    fn test_artifact_name_starts_with_slugs() {
        let name = RunKey::new("Gemini 2.0 Pro", "known_gaps_limitations").artifact_name();
        assert!(name.starts_with("gemini-2.0-pro__known_gaps_limitations__"));
        assert_eq!(name.len(), "gemini-2.0-pro__known_gaps_limitations__".len() + 8);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || "_-.".contains(c)));
    }

    #[test]
    fn test_artifact_name_is_stable() {
        let a = RunKey::new("GPT-4o", "known_gaps_limitations");
        assert_eq!(a.artifact_name(), a.clone().artifact_name());
    }

    #[test]
    fn test_colliding_slugs_get_distinct_artifact_names() {
        let a = RunKey::new("GPT-4o", "known_gaps_limitations");
        let b = RunKey::new("gpt 4o", "known_gaps_limitations");
        assert_eq!(slug(&a.model), slug(&b.model));
        assert_ne!(a.artifact_name(), b.artifact_name());

        let c = RunKey::new("a", "b_c");
        let d = RunKey::new("a_b", "c");
        assert_ne!(c.artifact_name(), d.artifact_name());
    }

    #[test]
    fn test_reason_messages() {
        let r = ParseFailureReason::NotJson { message: "expected value at line 1 column 1".into() };
        assert!(r.to_string().starts_with("not valid JSON"));

        let r = ParseFailureReason::ScoreNotInScale { score: 0.7, scale: "0, 0.5, or 1".into() };
        assert!(r.to_string().starts_with("score not in declared scale"));
    }

    #[test]
    fn test_reason_serializes_with_kind_tag() {
        let r = ParseFailureReason::EmptyQuote { index: 2 };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "empty_quote", "index": 2}));
    }
}
