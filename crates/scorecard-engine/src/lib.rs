//! Evaluation pipeline for scorecard.
//!
//! Each run goes through the same stages:
//!
//! 1. [`loader`] reads and truncates the target's documents
//! 2. [`prompt`] assembles system and user text from the indicator
//! 3. the backend is called under a [`RetryPolicy`]
//! 4. [`parser`] validates the response into a record or a parse failure
//! 5. the outcome is handed to a [`ResultSink`](scorecard_store::ResultSink)
//!
//! [`Evaluator`] drives single runs and bounded-concurrency batches.

pub mod loader;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod retry;

pub use loader::{load_document, LoaderOptions};
pub use parser::parse_response;
pub use pipeline::{sink_from_config, Evaluator, RunError, RunReport, Stage, Target};
pub use prompt::{assemble, PromptOptions};
pub use retry::RetryPolicy;
