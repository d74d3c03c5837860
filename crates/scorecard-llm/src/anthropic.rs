//! Anthropic messages API client with streaming support.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use scorecard_config::{BackendConfig, Credential};
use scorecard_core::{ChatRequest, EvalError};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::http::{check_status, client, map_reqwest, with_deadline};
use crate::sse::SseBuffer;
use crate::{EvaluationBackend, LlmMetrics, LlmResponse};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "Anthropic";

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<ContentBlockDelta>,
    usage: Option<Usage>,
    message: Option<MessageEvent>,
}

#[derive(Deserialize)]
struct MessageEvent {
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct NonStreamResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

/// Client for Anthropic's messages API.
pub struct AnthropicClient {
    client: Client,
    url: String,
    model: String,
    api_key: Credential,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(config: &BackendConfig, api_key: Credential) -> Result<Self, EvalError> {
        let url = format!("{}/v1/messages", config.endpoint().trim_end_matches('/'));
        info!(
            "AnthropicClient: model={}, api_key_len={}",
            config.model,
            api_key.len()
        );
        Ok(Self {
            client: client()?,
            url,
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        })
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<LlmResponse, EvalError> {
        let start = Instant::now();

        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: request.system,
            messages: vec![AnthropicMessage { role: "user", content: request.user }],
            temperature: request.temperature,
            stream: request.stream,
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.timeout))?;
        let response = check_status(response, PROVIDER).await?;

        let (content, usage) = if request.stream {
            self.read_stream(response).await?
        } else {
            let resp: NonStreamResponse = response
                .json()
                .await
                .map_err(|e| map_reqwest(e, self.timeout))?;
            let content = resp.content.into_iter().map(|c| c.text).collect::<Vec<_>>().join("");
            (content, resp.usage)
        };

        Ok(LlmResponse {
            content,
            metrics: LlmMetrics {
                input_tokens: usage.input_tokens.unwrap_or(0),
                output_tokens: usage.output_tokens.unwrap_or(0),
                elapsed_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    async fn read_stream(&self, response: reqwest::Response) -> Result<(String, Usage), EvalError> {
        let mut bytes = response.bytes_stream();
        let mut buffer = SseBuffer::default();
        let mut content = String::new();
        let mut usage = Usage::default();

        while let Some(next) = bytes.next().await {
            let next = next.map_err(|e| map_reqwest(e, self.timeout))?;
            for payload in buffer.push(&next) {
                apply_event(&payload, &mut content, &mut usage);
            }
        }
        if let Some(payload) = buffer.finish() {
            apply_event(&payload, &mut content, &mut usage);
        }

        Ok((content, usage))
    }
}

fn apply_event(payload: &str, content: &mut String, usage: &mut Usage) {
    let event: StreamEvent = match serde_json::from_str(payload) {
        Ok(e) => e,
        Err(e) => {
            error!("Failed to parse Anthropic event: {} - {}", e, payload);
            return;
        }
    };

    match event.event_type.as_str() {
        "content_block_delta" => {
            if let Some(text) = event.delta.and_then(|d| d.text) {
                content.push_str(&text);
            }
        }
        "message_start" => {
            if let Some(u) = event.message.and_then(|m| m.usage) {
                usage.input_tokens = u.input_tokens;
            }
        }
        "message_delta" => {
            if let Some(u) = event.usage {
                if u.input_tokens.is_some() {
                    usage.input_tokens = u.input_tokens;
                }
                usage.output_tokens = u.output_tokens;
            }
        }
        _ => {}
    }
}

#[async_trait]
impl EvaluationBackend for AnthropicClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<LlmResponse, EvalError> {
        with_deadline(self.timeout, self.send(request)).await
    }
}
