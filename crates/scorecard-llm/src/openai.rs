//! OpenAI-compatible chat completions client (DeepSeek, OpenAI, vLLM, Ollama).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use scorecard_config::{BackendConfig, Credential};
use scorecard_core::{ChatRequest, EvalError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::http::{check_status, client, map_reqwest, with_deadline};
use crate::sse::SseBuffer;
use crate::{EvaluationBackend, LlmMetrics, LlmResponse};

const PROVIDER: &str = "Chat completions";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize, Default)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct DeltaChoice {
    delta: MessageContent,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<DeltaChoice>,
    usage: Option<Usage>,
}

/// Client for any server exposing `POST /chat/completions`.
pub struct ChatCompletionsClient {
    client: Client,
    url: String,
    model: String,
    api_key: Credential,
    max_tokens: u32,
    timeout: Duration,
}

impl ChatCompletionsClient {
    pub fn new(config: &BackendConfig, api_key: Credential) -> Result<Self, EvalError> {
        let url = format!("{}/chat/completions", config.endpoint().trim_end_matches('/'));
        info!(
            "ChatCompletionsClient: url={}, model={}, api_key_len={}",
            url,
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

        let body = CompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: request.system },
                ChatMessage { role: "user", content: request.user },
            ],
            temperature: request.temperature,
            max_tokens: self.max_tokens,
            stream: request.stream,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.timeout))?;
        let response = check_status(response, PROVIDER).await?;

        let (content, usage) = if request.stream {
            self.read_stream(response).await?
        } else {
            self.read_body(response).await?
        };

        Ok(LlmResponse {
            content,
            metrics: LlmMetrics {
                input_tokens: usage.prompt_tokens.unwrap_or(0),
                output_tokens: usage.completion_tokens.unwrap_or(0),
                elapsed_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<(String, Usage), EvalError> {
        let resp: CompletionResponse = response
            .json()
            .await
            .map_err(|e| map_reqwest(e, self.timeout))?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EvalError::Transport("response contained no choices".into()))?;

        Ok((content, resp.usage.unwrap_or_default()))
    }

    async fn read_stream(&self, response: reqwest::Response) -> Result<(String, Usage), EvalError> {
        let mut bytes = response.bytes_stream();
        let mut buffer = SseBuffer::default();
        let mut content = String::new();
        let mut usage = Usage::default();

        while let Some(next) = bytes.next().await {
            let next = next.map_err(|e| map_reqwest(e, self.timeout))?;
            for payload in buffer.push(&next) {
                apply_chunk(&payload, &mut content, &mut usage);
            }
        }
        if let Some(payload) = buffer.finish() {
            apply_chunk(&payload, &mut content, &mut usage);
        }

        debug!("Stream complete: {} chars", content.len());
        Ok((content, usage))
    }
}

fn apply_chunk(payload: &str, content: &mut String, usage: &mut Usage) {
    let chunk: CompletionChunk = match serde_json::from_str(payload) {
        Ok(c) => c,
        Err(e) => {
            warn!("Skipping unparseable stream event: {} - {}", e, payload);
            return;
        }
    };
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content {
            content.push_str(&text);
        }
    }
    if let Some(u) = chunk.usage {
        *usage = u;
    }
}

#[async_trait]
impl EvaluationBackend for ChatCompletionsClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<LlmResponse, EvalError> {
        with_deadline(self.timeout, self.send(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> BackendConfig {
        BackendConfig {
            endpoint: Some(server.uri()),
            model: "deepseek-reasoner".into(),
            timeout_secs: 5,
            ..BackendConfig::default()
        }
    }

    fn request(stream: bool) -> ChatRequest<'static> {
        ChatRequest { system: "You are an evaluator.", user: "[DOCUMENT: card]\ntext", temperature: 0.1, stream }
    }

    #[tokio::test]
    async fn test_non_streaming_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "deepseek-reasoner",
                "stream": false,
                "messages": [
                    { "role": "system", "content": "You are an evaluator." },
                    { "role": "user", "content": "[DOCUMENT: card]\ntext" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "{\"raw_score\": 0}" } }],
                "usage": { "prompt_tokens": 120, "completion_tokens": 8 }
            })))
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new(&config(&server), Credential::new("sk-test")).unwrap();
        let response = client.complete(&request(false)).await.unwrap();

        assert_eq!(response.content, "{\"raw_score\": 0}");
        assert_eq!(response.metrics.input_tokens, 120);
        assert_eq!(response.metrics.output_tokens, 8);
    }

    #[tokio::test]
    async fn test_streaming_completion_is_accumulated() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"raw_score\\\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\": 0.5}\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":11,\"completion_tokens\":4}}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new(&config(&server), Credential::new("sk-test")).unwrap();
        let response = client.complete(&request(true)).await.unwrap();

        assert_eq!(response.content, "{\"raw_score\": 0.5}");
        assert_eq!(response.metrics.input_tokens, 11);
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3").set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new(&config(&server), Credential::new("sk-test")).unwrap();
        let err = client.complete(&request(false)).await.unwrap_err();

        match err {
            EvalError::RateLimited { retry_after, message } => {
                assert_eq!(retry_after, Some(Duration::from_secs(3)));
                assert!(message.contains("slow down"));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_maps_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new(&config(&server), Credential::new("sk-test")).unwrap();
        let err = client.complete(&request(false)).await.unwrap_err();
        assert!(matches!(err, EvalError::Transport(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let mut cfg = config(&server);
        cfg.timeout_secs = 1;
        let client = ChatCompletionsClient::new(&cfg, Credential::new("sk-test")).unwrap();
        let err = client.complete(&request(false)).await.unwrap_err();
        assert!(matches!(err, EvalError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let cfg = BackendConfig {
            endpoint: Some("http://127.0.0.1:9".into()),
            timeout_secs: 5,
            ..BackendConfig::default()
        };
        let client = ChatCompletionsClient::new(&cfg, Credential::new("sk-test")).unwrap();
        let err = client.complete(&request(false)).await.unwrap_err();
        assert!(matches!(err, EvalError::Transport(_)));
    }
}
