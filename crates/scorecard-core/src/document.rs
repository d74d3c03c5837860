use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Marker appended to a document that was cut to its character limit.
pub const TRUNCATION_SENTINEL: &str = "\n\n[TRUNCATED BY SCRIPT...]";

/// A named reference to a document on disk, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Label shown to the backend and cited in evidence (e.g. "GPT-4o System Card").
    pub name: String,
    /// Location of the UTF-8 text file.
    pub path: PathBuf,
}

impl DocumentRef {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), path: path.into() }
    }
}

/// A loaded document. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSource {
    /// Label shown to the backend and cited in evidence.
    pub name: String,
    /// Where the text was read from.
    pub path: PathBuf,
    /// Document text, including the truncation sentinel when `truncated` is set.
    pub text: String,
    /// Whether the text was cut to the loader's character limit.
    pub truncated: bool,
}

impl DocumentSource {
    /// Creates an in-memory document that was never truncated.
    pub fn inline(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        Self { path: PathBuf::from(&name), name, text: text.into(), truncated: false }
    }

    /// True when `label` refers to this document (trimmed, case-insensitive).
    pub fn answers_to(&self, label: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(label.trim())
    }
}
