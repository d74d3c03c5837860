use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while loading inputs, calling a backend, or persisting results.
///
/// Parse failures are not errors: see [`crate::ParseFailure`].
#[derive(Error, Debug)]
pub enum EvalError {
    /// Input document does not exist.
    #[error("Document not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// Input document exists but could not be read or decoded.
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network or connection failure, or an unexpected backend status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend signalled throttling.
    #[error("Rate limited by backend: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// No response arrived within the configured duration.
    #[error("No response within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Retry policy gave up.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<EvalError> },

    /// Result storage failed.
    #[error("Failed to write {target}: {message}")]
    Write { target: String, message: String },

    /// Indicator id is not in the registry.
    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),

    /// Indicator definition is unusable.
    #[error("Invalid indicator {id}: {reason}")]
    InvalidIndicator { id: String, reason: String },

    /// Configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    /// True for faults a caller-level retry policy may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EvalError::RateLimited { .. } | EvalError::Timeout(_))
    }

    /// Creates a Write error from any displayable cause.
    pub fn write(target: impl Into<String>, e: impl std::fmt::Display) -> Self {
        EvalError::Write { target: target.into(), message: e.to_string() }
    }
}
