//! Backend that replays canned responses, for tests and offline replays.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use scorecard_core::{ChatRequest, EvalError};

use crate::{EvaluationBackend, LlmResponse};

/// Returns queued responses in order, one per call.
///
/// Once the queue is empty every call fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    queue: Mutex<VecDeque<Result<String, EvalError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that answers exactly once with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::new().then_text(text)
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    pub fn then_error(self, err: EvalError) -> Self {
        self.push(Err(err))
    }

    fn push(self, entry: Result<String, EvalError>) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(entry);
        }
        self
    }

    /// Number of `complete` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// System instructions of every request received, in order.
    pub fn system_prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EvaluationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<LlmResponse, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.system.to_string());
        }

        let next = self
            .queue
            .lock()
            .map_err(|_| EvalError::Transport("scripted backend lock poisoned".into()))?
            .pop_front();

        match next {
            Some(entry) => entry.map(LlmResponse::text),
            None => Err(EvalError::Transport("scripted backend has no responses left".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request() -> ChatRequest<'static> {
        ChatRequest { system: "sys", user: "user", temperature: 0.0, stream: false }
    }

    #[tokio::test]
    async fn test_replays_in_order_then_runs_dry() {
        let backend = ScriptedBackend::new()
            .then_error(EvalError::Timeout(Duration::from_secs(1)))
            .then_text("{}");

        assert!(matches!(backend.complete(&request()).await, Err(EvalError::Timeout(_))));
        assert_eq!(backend.complete(&request()).await.unwrap().content, "{}");
        assert!(matches!(backend.complete(&request()).await, Err(EvalError::Transport(_))));
        assert_eq!(backend.calls(), 3);
        assert_eq!(backend.system_prompts(), ["sys", "sys", "sys"]);
    }
}
