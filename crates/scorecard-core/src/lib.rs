//! Core domain types and error definitions for scorecard.
//!
//! This crate provides the types shared across the scorecard workspace:
//!
//! - [`EvalError`] - Error type for loading, calling, and persisting
//! - [`DocumentSource`] and [`DocumentRef`] - Reference documents
//! - [`Indicator`], [`Scale`] and [`OutputSchema`] - Rubric definitions
//! - [`EvaluationRequest`] and [`ChatRequest`] - What gets sent to a backend
//! - [`EvaluationOutcome`] - Either a validated [`EvaluationRecord`] or a [`ParseFailure`]
//!
//! # Example
//!
//! ```rust
//! use scorecard_core::Scale;
//!
//! let scale = Scale::new(vec![0.0, 0.5, 1.0]).unwrap();
//! assert!(scale.contains(0.5));
//! assert!(!scale.contains(0.7));
//! assert_eq!(scale.describe(), "0, 0.5, or 1");
//! ```

mod document;
mod error;
mod indicator;
mod record;
mod request;

pub use document::{DocumentRef, DocumentSource, TRUNCATION_SENTINEL};
pub use error::EvalError;
pub use indicator::{
    FieldKind, FieldSpec, Indicator, OutputSchema, Scale, ScaleError, EVIDENCE, JUSTIFICATION,
    NORMALIZED_SCORE, RAW_SCALE, RAW_SCORE, RUBRIC_SUMMARY,
};
pub use record::{
    EvaluationOutcome, EvaluationRecord, Evidence, ParseFailure, ParseFailureReason, RunKey,
    slug,
};
pub use request::{ChatRequest, EvaluationRequest};
