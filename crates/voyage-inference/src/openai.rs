//! OpenAI-compatible HTTP gateway
//!
//! Talks to any service exposing `/chat/completions` and `/embeddings` in the
//! OpenAI wire format. The defaults target Gemini's compatibility endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use voyage_core::config::InferenceConfig;
use voyage_core::error::VoyageError;
use voyage_vector::EmbeddingService;

use crate::gateway::parse_json_output;
use crate::{CompletionRequest, GatewayError, InferenceGateway, Role, TextStream};

/// HTTP client for an OpenAI-compatible inference service.
pub struct OpenAiCompatGateway {
    base_url: String,
    model: String,
    embedding_model: String,
    embedding_dimensions: usize,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    http: Client,
}

impl std::fmt::Debug for OpenAiCompatGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatGateway")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiCompatGateway {
    /// Create a gateway, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &InferenceConfig) -> Result<Self, GatewayError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            GatewayError::Config(format!(
                "Environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &InferenceConfig, api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::Network)?;

        debug!(base_url = %config.base_url, model = %config.model, "OpenAiCompatGateway::new");
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            embedding_dimensions: config.embedding_dimensions,
            api_key: api_key.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": request.system_prompt}));
        }
        for message in &request.messages {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": message.content}));
        }

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": request.max_tokens.min(self.max_tokens),
        })
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Response, GatewayError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn chat(&self, body: Value) -> Result<String, GatewayError> {
        let url = self.endpoint("chat/completions");
        let response = self.post_json(&url, &body).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::InvalidResponse("Response has no message content".to_string()))
    }
}

#[async_trait]
impl InferenceGateway for OpenAiCompatGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError> {
        debug!(model = %self.model, messages = request.messages.len(), "complete");
        self.chat(self.build_request_body(&request)).await
    }

    async fn generate_structured(
        &self,
        request: CompletionRequest,
        schema: &Value,
    ) -> Result<Value, GatewayError> {
        debug!(model = %self.model, "generate_structured");
        let mut body = self.build_request_body(&request);
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {"name": "output", "schema": schema},
        });

        let raw = self.chat(body).await?;
        parse_json_output(&raw)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, GatewayError> {
        debug!(model = %self.model, "stream");
        let mut body = self.build_request_body(&request);
        body["stream"] = json!(true);

        let builder = self
            .http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body);
        let source = EventSource::new(builder)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let timeout = self.timeout;

        let stream = futures::stream::unfold(Some(source), move |state| async move {
            let mut source = state?;
            loop {
                match source.next().await {
                    None => return None,
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(message))) => {
                        if message.data.trim() == "[DONE]" {
                            source.close();
                            return None;
                        }
                        match parse_stream_delta(&message.data) {
                            Ok(Some(text)) => return Some((Ok(text), Some(source))),
                            Ok(None) => continue,
                            Err(e) => {
                                source.close();
                                return Some((Err(e), None));
                            }
                        }
                    }
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) => {
                        source.close();
                        return None;
                    }
                    Some(Err(e)) => {
                        // The event source reconnects on errors unless closed.
                        source.close();
                        let err = error_from_eventsource(e, timeout).await;
                        return Some((Err(err), None));
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}

impl EmbeddingService for OpenAiCompatGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, VoyageError> {
        if text.trim().is_empty() {
            return Err(VoyageError::Embedding("Cannot embed empty text".to_string()));
        }
        let body = json!({"model": self.embedding_model, "input": text});
        let response = self.post_json(&self.endpoint("embeddings"), &body).await?;
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, self.timeout))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| VoyageError::Embedding("Embedding response has no data".to_string()))?;

        if embedding.len() != self.embedding_dimensions {
            return Err(VoyageError::Embedding(format!(
                "Expected {} dimensions, got {}",
                self.embedding_dimensions,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }
}

/// Extract the text delta of one streamed chunk. Chunks without content
/// (role announcements, finish markers) yield `None`.
fn parse_stream_delta(data: &str) -> Result<Option<String>, GatewayError> {
    let chunk: StreamChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}

async fn error_from_response(response: Response) -> GatewayError {
    let status = response.status().as_u16();
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        warn!(retry_after, "Inference service rate limited the request");
        return GatewayError::RateLimited {
            retry_after: Duration::from_secs(retry_after),
        };
    }
    let message = response.text().await.unwrap_or_default();
    warn!(status, "Inference service returned an error status");
    GatewayError::Api { status, message }
}

async fn error_from_eventsource(err: reqwest_eventsource::Error, timeout: Duration) -> GatewayError {
    match err {
        reqwest_eventsource::Error::Transport(e) => GatewayError::from_reqwest(e, timeout),
        reqwest_eventsource::Error::InvalidStatusCode(_, response) => {
            error_from_response(response).await
        }
        other => GatewayError::InvalidResponse(other.to_string()),
    }
}

// OpenAI wire types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
