use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EvalError;

pub const RUBRIC_SUMMARY: &str = "rubric_summary";
pub const RAW_SCORE: &str = "raw_score";
pub const RAW_SCALE: &str = "raw_scale";
pub const NORMALIZED_SCORE: &str = "normalized_score_0_1";
pub const JUSTIFICATION: &str = "justification";
pub const EVIDENCE: &str = "evidence";

/// Reasons a list of values cannot be used as a scale.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScaleError {
    #[error("scale must contain at least one value")]
    Empty,
    #[error("scale values must be finite, got {0}")]
    NonFinite(f64),
    #[error("scale values must be strictly increasing")]
    NotIncreasing,
}

/// Ordered, finite set of permissible scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Scale(Vec<f64>);

impl Scale {
    pub fn new(values: Vec<f64>) -> Result<Self, ScaleError> {
        if values.is_empty() {
            return Err(ScaleError::Empty);
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ScaleError::NonFinite(*bad));
        }
        if values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ScaleError::NotIncreasing);
        }
        Ok(Self(values))
    }

    /// The 0 / 0.5 / 1 scale used by the documentation indicators.
    pub fn ternary() -> Self {
        Self(vec![0.0, 0.5, 1.0])
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn min(&self) -> f64 {
        self.0[0]
    }

    pub fn max(&self) -> f64 {
        self.0[self.0.len() - 1]
    }

    /// Exact membership test.
    pub fn contains(&self, score: f64) -> bool {
        self.0.iter().any(|v| *v == score)
    }

    /// True when every value already lies in [0, 1].
    pub fn is_unit(&self) -> bool {
        self.min() >= 0.0 && self.max() <= 1.0
    }

    /// Maps a raw score onto [0, 1].
    ///
    /// Unit scales map to themselves. Other scales use min-max normalization;
    /// a single-value scale outside [0, 1] maps to 0.
    pub fn normalize(&self, raw: f64) -> f64 {
        if self.is_unit() {
            return raw;
        }
        let span = self.max() - self.min();
        if span == 0.0 {
            return 0.0;
        }
        (raw - self.min()) / span
    }

    /// Human-readable listing, e.g. `0, 0.5, or 1`.
    pub fn describe(&self) -> String {
        let items: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        match items.as_slice() {
            [one] => one.clone(),
            [a, b] => format!("{a} or {b}"),
            [head @ .., last] => format!("{}, or {}", head.join(", "), last),
            [] => String::new(),
        }
    }
}

impl TryFrom<Vec<f64>> for Scale {
    type Error = ScaleError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Scale::new(values)
    }
}

impl From<Scale> for Vec<f64> {
    fn from(scale: Scale) -> Self {
        scale.0
    }
}

/// JSON kind of an output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    /// Array of `{doc, location, quote}` objects.
    EvidenceList,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Number => "a number",
            FieldKind::EvidenceList => "an array of evidence objects",
        }
    }
}

/// One field the backend must return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Placeholder text shown in the prompt's schema template.
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

impl FieldSpec {
    pub fn required(name: &str, kind: FieldKind, description: &str) -> Self {
        Self { name: name.to_string(), kind, required: true, description: description.to_string() }
    }

    pub fn optional(name: &str, kind: FieldKind, description: &str) -> Self {
        Self { required: false, ..Self::required(name, kind, description) }
    }
}

/// Fields of the JSON block the backend nests under an indicator's output key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    /// The record shape every shipped indicator uses.
    pub fn standard() -> Self {
        Self {
            fields: vec![
                FieldSpec::required(
                    RUBRIC_SUMMARY,
                    FieldKind::String,
                    "Short description of the scoring rules for this indicator in your own words.",
                ),
                FieldSpec::required(RAW_SCORE, FieldKind::Number, "One of the declared scale values."),
                FieldSpec::optional(RAW_SCALE, FieldKind::String, "The declared scale, as text."),
                FieldSpec::required(
                    NORMALIZED_SCORE,
                    FieldKind::Number,
                    "The raw score mapped onto 0-1.",
                ),
                FieldSpec::required(
                    JUSTIFICATION,
                    FieldKind::String,
                    "3-6 sentences explaining how the model meets or fails the criteria.",
                ),
                FieldSpec::required(EVIDENCE, FieldKind::EvidenceList, "Verbatim quotes supporting the score."),
            ],
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl Default for OutputSchema {
    fn default() -> Self {
        Self::standard()
    }
}

/// A named evaluation criterion with its scale, rubric, and output shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    /// Registry key (e.g. "known_gaps_limitations").
    pub id: String,
    /// Index label (e.g. "L4-2").
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    pub scale: Scale,
    /// Decision criteria distinguishing the score levels.
    pub rubric: String,
    /// What the evaluator should look for in the documents.
    #[serde(default)]
    pub evidence_focus: Vec<String>,
    /// JSON key the answer block is nested under (e.g. "indicator_L4_gaps").
    pub output_key: String,
    #[serde(default)]
    pub schema: OutputSchema,
}

impl Indicator {
    /// Checks the definition is usable by the prompt assembler and parser.
    pub fn validate(&self) -> Result<(), EvalError> {
        let invalid = |reason: &str| EvalError::InvalidIndicator {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.output_key.trim().is_empty() {
            return Err(invalid("output_key must not be empty"));
        }
        if self.rubric.trim().is_empty() {
            return Err(invalid("rubric must not be empty"));
        }

        let required = [
            (RAW_SCORE, FieldKind::Number),
            (NORMALIZED_SCORE, FieldKind::Number),
            (EVIDENCE, FieldKind::EvidenceList),
        ];
        for (name, kind) in required {
            match self.schema.field(name) {
                Some(f) if f.kind == kind && f.required => {}
                Some(_) => return Err(invalid(&format!("schema field `{name}` must be a required {}", kind.as_str()))),
                None => return Err(invalid(&format!("schema is missing `{name}`"))),
            }
        }

        Ok(())
    }
}
