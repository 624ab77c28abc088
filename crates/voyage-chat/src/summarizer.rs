//! Conversation summarizer: condenses the chat history into one neutral
//! synopsis that the intent evaluator and the general answerer work from.

use std::sync::Arc;

use tracing::debug;

use voyage_core::codec::parse_itinerary_payload;
use voyage_core::types::ConversationTurn;
use voyage_inference::{CompletionRequest, GatewayError, InferenceGateway};

const SUMMARY_PROMPT: &str = "You summarize conversations between a traveller and a trip-planning \
assistant. Write a short, neutral, plain-text summary of what the traveller wants and any trip \
details they gave (number of days, number of people, transport, accessibility needs, preferences, \
whether they want to book tickets, whether they want to finalize the plan). Keep any key=value \
details exactly as written. Do not answer the traveller, do not give advice, do not ask \
questions, and do not use JSON.";

const SUMMARY_MAX_TOKENS: u32 = 512;

/// Produces a synopsis of the conversation so far.
pub struct ConversationSummarizer {
    gateway: Arc<dyn InferenceGateway>,
}

impl ConversationSummarizer {
    pub fn new(gateway: Arc<dyn InferenceGateway>) -> Self {
        Self { gateway }
    }

    /// Summarize the turns. An empty model answer falls back to the raw
    /// transcript so downstream extraction still sees the user's words.
    pub async fn summarize(&self, turns: &[ConversationTurn]) -> Result<String, GatewayError> {
        let transcript = render_transcript(turns);
        let request = CompletionRequest::new(SUMMARY_PROMPT)
            .with_user(format!("Conversation:\n{transcript}"))
            .with_max_tokens(SUMMARY_MAX_TOKENS);

        let summary = self.gateway.complete(request).await?;
        let summary = summary.trim();
        debug!(chars = summary.len(), "Conversation summarized");

        if summary.is_empty() {
            Ok(transcript)
        } else {
            Ok(summary.to_string())
        }
    }
}

/// Render turns as `user: ...` / `assistant: ...` lines. Itineraries shown
/// to the user are reduced to a short marker.
pub fn render_transcript(turns: &[ConversationTurn]) -> String {
    let mut lines = Vec::with_capacity(turns.len());
    for turn in turns {
        let mut line = format!("{}: {}", turn.speaker.as_str(), turn.text.trim());
        if let Some(payload) = &turn.itinerary {
            let stops = parse_itinerary_payload(payload).map(|items| items.len()).unwrap_or(0);
            line.push_str(&format!(" (itinerary with {stops} stops)"));
        }
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voyage_inference::{Reply, ScriptedGateway};

    #[test]
    fn test_render_transcript() {
        let item = json!({
            "date": "2025-01-01", "day": "Wednesday", "hour": "9 AM",
            "location": "Port Louis", "region": "North", "description": "Market",
            "attraction_name": "Central Market", "rating": 4.2, "url": "https://maps.example/cm"
        });
        let turns = vec![
            ConversationTurn::user("Plan 2 days"),
            ConversationTurn::assistant("Here you go").with_itinerary(json!({"itinerary": [item]})),
        ];
        assert_eq!(
            render_transcript(&turns),
            "user: Plan 2 days\nassistant: Here you go (itinerary with 1 stops)"
        );
    }

    #[tokio::test]
    async fn test_summarize_uses_gateway_answer() {
        let gateway = Arc::new(
            ScriptedGateway::new().on_complete(Reply::Text("  User wants beaches.  ".into())),
        );
        let summarizer = ConversationSummarizer::new(gateway.clone());

        let summary = summarizer
            .summarize(&[ConversationTurn::user("I love beaches")])
            .await
            .unwrap();
        assert_eq!(summary, "User wants beaches.");

        let calls = gateway.calls();
        assert!(calls[0]
            .request
            .last_user_message()
            .unwrap()
            .contains("user: I love beaches"));
    }

    #[tokio::test]
    async fn test_empty_summary_falls_back_to_transcript() {
        let gateway = Arc::new(ScriptedGateway::new().on_complete(Reply::Text("   ".into())));
        let summary = ConversationSummarizer::new(gateway)
            .summarize(&[ConversationTurn::user("numberOfPeople=2")])
            .await
            .unwrap();
        assert_eq!(summary, "user: numberOfPeople=2");
    }

    #[tokio::test]
    async fn test_gateway_failure_propagates() {
        let gateway = Arc::new(ScriptedGateway::new().on_complete(Reply::Timeout));
        let result = ConversationSummarizer::new(gateway)
            .summarize(&[ConversationTurn::user("hi")])
            .await;
        assert!(result.unwrap_err().is_timeout());
    }
}
