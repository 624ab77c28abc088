//! Short conversational replies for turns that are not itinerary requests.

use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use voyage_inference::{CompletionRequest, InferenceGateway};

use crate::error::ChatError;
use crate::sink::EventSink;

const ANSWER_PROMPT: &str = "You are a friendly travel assistant. Reply to the traveller in one or \
two sentences of plain text. Do not output JSON, do not write an itinerary, do not mention field \
names such as tripDurationDays or partySize, and do not decide on your own to start planning a \
trip. If they seem interested in a trip, you may mention that you can build an itinerary once \
they share the number of days, the number of people and their preferred transport.";

const ANSWER_MAX_TOKENS: u32 = 256;

/// Streams a brief answer grounded in the conversation summary.
pub struct GeneralAnswerer {
    gateway: Arc<dyn InferenceGateway>,
}

impl GeneralAnswerer {
    pub fn new(gateway: Arc<dyn InferenceGateway>) -> Self {
        Self { gateway }
    }

    /// Forward each generated chunk to `sink` as it arrives. Returns the full
    /// answer text.
    pub async fn answer(
        &self,
        summary: &str,
        latest_message: &str,
        sink: &EventSink,
    ) -> Result<String, ChatError> {
        let request = CompletionRequest::new(ANSWER_PROMPT)
            .with_user(format!(
                "Conversation summary: {summary}\n\nLatest message: {latest_message}"
            ))
            .with_max_tokens(ANSWER_MAX_TOKENS);

        let mut stream = self.gateway.stream(request).await?;
        let mut answer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            answer.push_str(&chunk);
            sink.text(chunk).await?;
        }

        debug!(chars = answer.len(), "General answer streamed");
        Ok(answer)
    }
}
