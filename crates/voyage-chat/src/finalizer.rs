//! Hands the finished itinerary to the document/email service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use voyage_core::codec::parse_itinerary_payload;
use voyage_core::config::FinalizeConfig;
use voyage_core::types::{ConversationTurn, ItineraryItem, RecipientIdentity, Speaker};

use crate::error::{ChatError, DispatchError};
use crate::sink::EventSink;

pub const PREPARING_MESSAGE: &str = "Preparing your calendar and sending via email...";
pub const SENT_MESSAGE: &str = "Email sent! Check your inbox for the itinerary PDF and calendar.";

/// Body posted to the document/email service.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub user_input: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub itinerary: Vec<ItineraryItem>,
    pub recipient_email: String,
    pub recipient_name: String,
}

/// Documents rendered by the service, base64 encoded.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchReceipt {
    pub pdf_base64: Option<String>,
    pub ics_base64: Option<String>,
}

/// Renders and delivers an itinerary.
#[async_trait]
pub trait ItineraryDispatcher: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, DispatchError>;
}

// =============================================================================
// HTTP dispatcher
// =============================================================================

/// Posts the itinerary as JSON to the configured endpoint.
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDispatcher {
    pub fn from_config(config: &FinalizeConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint_url.clone(),
        })
    }
}

#[async_trait]
impl ItineraryDispatcher for HttpDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, DispatchError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| DispatchError::InvalidResponse(e.to_string()))?;

        if let Some(message) = body.get("error").and_then(Value::as_str) {
            return Err(DispatchError::Rejected(message.to_string()));
        }
        if !status.is_success() {
            return Err(DispatchError::Rejected("Failed to send email".to_string()));
        }

        serde_json::from_value(body).map_err(|e| DispatchError::InvalidResponse(e.to_string()))
    }
}

// =============================================================================
// Recording dispatcher
// =============================================================================

/// In-process dispatcher that records requests. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    failure: Option<String>,
    requests: Mutex<Vec<DispatchRequest>>,
}

impl RecordingDispatcher {
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Reject every request with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ItineraryDispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt, DispatchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match &self.failure {
            Some(message) => Err(DispatchError::Rejected(message.clone())),
            None => Ok(DispatchReceipt {
                pdf_base64: Some(String::new()),
                ics_base64: Some(String::new()),
            }),
        }
    }
}

// =============================================================================
// Finalizer
// =============================================================================

/// Result of a finalize step.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    Sent { stops: usize },
    Failed(String),
}

pub struct Finalizer {
    dispatcher: Arc<dyn ItineraryDispatcher>,
}

impl Finalizer {
    pub fn new(dispatcher: Arc<dyn ItineraryDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Dispatch the itinerary and report progress on `sink`.
    ///
    /// Dispatch failures are reported to the user as text and do not fail
    /// the request; only a closed sink does.
    pub async fn finalize(
        &self,
        summary: &str,
        turns: &[ConversationTurn],
        draft: &[ItineraryItem],
        identity: &RecipientIdentity,
        sink: &EventSink,
    ) -> Result<FinalizeOutcome, ChatError> {
        sink.text(PREPARING_MESSAGE).await?;

        let itinerary = if draft.is_empty() {
            itinerary_from_history(turns)
        } else {
            draft.to_vec()
        };
        let stops = itinerary.len();

        match self.send(summary, itinerary, identity).await {
            Ok(_) => {
                info!(stops, "Itinerary dispatched");
                sink.text(SENT_MESSAGE).await?;
                Ok(FinalizeOutcome::Sent { stops })
            }
            Err(e) => {
                warn!(error = %e, "Itinerary dispatch failed");
                let message = e.to_string();
                sink.text(format!("Error: {message}")).await?;
                Ok(FinalizeOutcome::Failed(message))
            }
        }
    }

    async fn send(
        &self,
        summary: &str,
        itinerary: Vec<ItineraryItem>,
        identity: &RecipientIdentity,
    ) -> Result<DispatchReceipt, DispatchError> {
        let recipient_email = identity
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(DispatchError::MissingRecipient)?;

        let request = DispatchRequest {
            user_input: summary.to_string(),
            itinerary,
            recipient_email: recipient_email.to_string(),
            recipient_name: identity.name.clone().unwrap_or_default(),
        };
        self.dispatcher.dispatch(&request).await
    }
}

/// The itinerary of the most recent assistant turn that carries one, either
/// as a structured field or as text holding an itinerary payload.
pub fn itinerary_from_history(turns: &[ConversationTurn]) -> Vec<ItineraryItem> {
    turns
        .iter()
        .rev()
        .filter(|turn| turn.speaker == Speaker::Assistant)
        .find_map(|turn| {
            let from_field = turn
                .itinerary
                .as_ref()
                .and_then(|payload| parse_itinerary_payload(payload).ok());
            let items = from_field.or_else(|| {
                serde_json::from_str::<Value>(turn.text.trim())
                    .ok()
                    .and_then(|payload| parse_itinerary_payload(&payload).ok())
            })?;
            (!items.is_empty()).then_some(items)
        })
        .unwrap_or_default()
}
