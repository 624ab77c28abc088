//! Route handlers for the Voyage API.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use voyage_chat::{ChatError, ConversationRequest, EventSink};
use voyage_core::codec::parse_itinerary_payload;
use voyage_core::events::StreamEvent;
use voyage_core::types::{ConversationTurn, IntentConditions, RecipientIdentity};

use crate::error::ApiError;
use crate::state::AppState;

/// Events buffered between the request task and the response stream.
const EVENT_BUFFER: usize = 64;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

// =============================================================================
// Agent
// =============================================================================

/// Request body for POST /agent.
#[derive(Debug, Default, Deserialize)]
pub struct AgentRequest {
    /// Full conversation so far, oldest first.
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
    /// Conditions returned by the last `request-itinerary` event.
    #[serde(default)]
    pub conditions: Option<IntentConditions>,
    /// Itinerary currently shown to the user.
    #[serde(default)]
    pub itinerary: Option<Value>,
}

/// Convert an engine event into an SSE event.
pub fn sse_event(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.kind().as_str())
        .data(event.payload())
}

/// POST /agent - run one conversation turn and stream its events.
///
/// Validation failures are answered with 400 before the stream opens. The
/// request runs on its own task; if the client disconnects the task stops
/// at its next suspension point.
pub async fn agent(
    State(state): State<AppState>,
    Extension(identity): Extension<RecipientIdentity>,
    Json(body): Json<AgentRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>, ApiError> {
    let draft = match body.itinerary {
        None | Some(Value::Null) => Vec::new(),
        Some(payload) => parse_itinerary_payload(&payload)
            .map_err(|e| ApiError::BadRequest(format!("Invalid itinerary: {e}")))?,
    };

    let request = ConversationRequest {
        turns: body.messages,
        prior: body.conditions.unwrap_or_default(),
        draft,
        identity,
        today: chrono::Local::now().date_naive(),
    };
    state.orchestrator.validate(&request)?;

    let request_id = Uuid::new_v4();
    info!(%request_id, turns = request.turns.len(), "Agent request accepted");

    let (sink, rx) = EventSink::channel(EVENT_BUFFER);
    let orchestrator = state.orchestrator.clone();
    let task = async move {
        tokio::select! {
            _ = sink.closed() => {
                debug!("Client disconnected, dropping agent request");
            }
            result = orchestrator.handle(&request, &sink) => match result {
                Ok(outcome) => debug!(state = outcome.final_state.as_str(), "Agent request finished"),
                Err(ChatError::Cancelled) => debug!("Client disconnected"),
                Err(e) => warn!(error = %e, "Agent request ended with an error"),
            },
        }
    };
    tokio::spawn(task.instrument(info_span!("agent", %request_id)));

    let stream = ReceiverStream::new(rx).map(|event| Ok(sse_event(&event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

// =============================================================================
// Health
// =============================================================================

/// Response for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health - liveness check, no auth.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
