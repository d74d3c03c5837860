//! Reads reference documents from disk, applying the character limit.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use scorecard_core::{DocumentRef, DocumentSource, EvalError, TRUNCATION_SENTINEL};
use tracing::{debug, info};

/// Where relative document paths resolve from and how much text to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderOptions {
    pub root: Option<PathBuf>,
    /// Characters (not bytes) kept per document; `None` keeps everything.
    pub max_chars: Option<usize>,
}

impl LoaderOptions {
    pub fn new(root: impl Into<PathBuf>, max_chars: Option<usize>) -> Self {
        Self { root: Some(root.into()), max_chars }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn load(&self, doc: &DocumentRef) -> Result<DocumentSource, EvalError> {
        load_document(&doc.name, &self.resolve(&doc.path), self.max_chars)
    }

    /// Loads every document, stopping at the first one that fails.
    pub fn load_all(&self, docs: &[DocumentRef]) -> Result<Vec<DocumentSource>, EvalError> {
        docs.iter().map(|doc| self.load(doc)).collect()
    }
}

/// Reads one UTF-8 text file into a [`DocumentSource`].
pub fn load_document(name: &str, path: &Path, max_chars: Option<usize>) -> Result<DocumentSource, EvalError> {
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => EvalError::NotFound { path: path.to_path_buf() },
        _ => EvalError::Read { path: path.to_path_buf(), source },
    })?;

    let (text, truncated) = match max_chars.and_then(|limit| truncate(&text, limit)) {
        Some(cut) => (cut, true),
        None => (text, false),
    };

    if truncated {
        info!("Truncated {} to {} chars", name, max_chars.unwrap_or_default());
    } else {
        debug!("Loaded {} ({} bytes)", name, text.len());
    }

    Ok(DocumentSource { name: name.to_string(), path: path.to_path_buf(), text, truncated })
}

/// Keeps the first `max_chars` characters and appends the sentinel.
/// Returns `None` when the text already fits.
pub fn truncate(text: &str, max_chars: usize) -> Option<String> {
    let (cut, _) = text.char_indices().nth(max_chars)?;
    let mut out = String::with_capacity(cut + TRUNCATION_SENTINEL.len());
    out.push_str(&text[..cut]);
    out.push_str(TRUNCATION_SENTINEL);
    Some(out)
}
