//! InferenceGateway trait definition

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::{CompletionRequest, GatewayError};

/// Incremental text chunks of a streamed completion.
pub type TextStream = BoxStream<'static, Result<String, GatewayError>>;

/// Stateless access to a language model.
///
/// Every call is independent; callers resubmit whatever context they need.
/// Implementations do not retry: failures are reported to the caller as-is.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Generate a complete text answer.
    async fn complete(&self, request: CompletionRequest) -> Result<String, GatewayError>;

    /// Generate JSON conforming to `schema`.
    ///
    /// Output that is not valid JSON is reported as
    /// [`GatewayError::MalformedOutput`].
    async fn generate_structured(
        &self,
        request: CompletionRequest,
        schema: &Value,
    ) -> Result<Value, GatewayError>;

    /// Stream a text answer chunk by chunk.
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, GatewayError>;
}

/// Parse model output as JSON, tolerating a surrounding Markdown code fence.
pub fn parse_json_output(raw: &str) -> Result<Value, GatewayError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(120).collect();
        GatewayError::MalformedOutput(format!("{e}: {preview}"))
    })
}
