//! Text-generation backends used to score documents.
//!
//! Every backend implements [`EvaluationBackend`]: it takes a [`ChatRequest`]
//! and returns the raw response text. Backends never retry; retry policy
//! belongs to the caller.

mod anthropic;
mod http;
mod openai;
mod scripted;
mod sse;

pub use anthropic::AnthropicClient;
pub use openai::ChatCompletionsClient;
pub use scripted::ScriptedBackend;

use std::sync::Arc;

use async_trait::async_trait;
use scorecard_config::{BackendConfig, Credential, Provider};
use scorecard_core::{ChatRequest, EvalError};

/// Token usage and latency for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmMetrics {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub elapsed_ms: u64,
}

/// Raw text returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
    pub metrics: LlmMetrics,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), metrics: LlmMetrics::default() }
    }
}

#[async_trait]
pub trait EvaluationBackend: Send + Sync {
    /// Short label for logs (e.g. "deepseek-reasoner").
    fn name(&self) -> &str;

    /// Sends one request and returns the raw response text.
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<LlmResponse, EvalError>;
}

/// Builds the backend selected by `config.provider`.
pub fn build_backend(
    config: &BackendConfig,
    credential: Credential,
) -> Result<Arc<dyn EvaluationBackend>, EvalError> {
    let backend: Arc<dyn EvaluationBackend> = match config.provider {
        Provider::OpenaiCompatible => Arc::new(ChatCompletionsClient::new(config, credential)?),
        Provider::Anthropic => Arc::new(AnthropicClient::new(config, credential)?),
    };
    Ok(backend)
}
