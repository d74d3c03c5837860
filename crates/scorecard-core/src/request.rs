use std::sync::Arc;

use crate::{DocumentSource, Indicator};

/// One evaluation call: the indicator, the documents, and the assembled prompt.
///
/// Built fresh per run by the prompt assembler and not reused.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub indicator: Arc<Indicator>,
    /// Display name of the model under evaluation.
    pub model: String,
    pub documents: Vec<DocumentSource>,
    /// System instructions: rubric, output schema, constraints.
    pub system: String,
    /// User content: the concatenated documents and closing instruction.
    pub user: String,
    pub temperature: f32,
    pub stream: bool,
}

impl EvaluationRequest {
    /// Borrowed view handed to an evaluation backend.
    pub fn chat(&self) -> ChatRequest<'_> {
        ChatRequest {
            system: &self.system,
            user: &self.user,
            temperature: self.temperature,
            stream: self.stream,
        }
    }

    /// The supplied document an evidence label refers to, if any.
    pub fn document(&self, label: &str) -> Option<&DocumentSource> {
        self.documents.iter().find(|d| d.answers_to(label))
    }
}

/// Backend-facing request: system instructions, user content, and sampling settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub stream: bool,
}
