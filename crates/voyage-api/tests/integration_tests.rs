//! Integration tests for the Voyage API.
//!
//! Each test builds its own router over a scripted inference gateway, an
//! in-memory attraction index and a recording dispatcher, then drives it
//! with `tower::ServiceExt::oneshot`. SSE bodies are decoded with the
//! client-side codec.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use voyage_api::create_router;
use voyage_api::handlers::HealthResponse;
use voyage_api::state::AppState;
use voyage_chat::{ChatOrchestrator, RecordingDispatcher};
use voyage_core::codec::{EventDispatcher, StreamTranscript};
use voyage_core::config::VoyageConfig;
use voyage_core::events::{EventKind, StreamEvent};
use voyage_inference::{Reply, ScriptedGateway};
use voyage_vector::{AttractionStore, EmbeddingService, IndexRecord, MockEmbedding, VectorIndex};

// =============================================================================
// Helpers
// =============================================================================

const TEST_TOKEN: &str = "test-token-12345";

async fn make_store() -> Arc<AttractionStore> {
    let embedder = MockEmbedding::with_dimensions(16);
    let index = VectorIndex::new(16);
    for i in 0..15 {
        let doc = json!({"name": format!("Beach {i}"), "region": "East", "rating": 4.2});
        let text = doc.to_string();
        let embedding = embedder.embed(&text).await.unwrap();
        index
            .insert(IndexRecord {
                id: format!("beach:{i}"),
                text,
                metadata: doc,
                embedding,
            })
            .unwrap();
    }
    Arc::new(AttractionStore::with_index(index, Arc::new(embedder)))
}

async fn make_app_with(gateway: ScriptedGateway, dispatcher: Arc<RecordingDispatcher>) -> axum::Router {
    let config = VoyageConfig::default();
    let orchestrator =
        ChatOrchestrator::new(Arc::new(gateway), make_store().await, dispatcher, &config);
    create_router(AppState::new(config, orchestrator, TEST_TOKEN))
}

async fn make_app(gateway: ScriptedGateway) -> axum::Router {
    make_app_with(gateway, Arc::new(RecordingDispatcher::succeeding())).await
}

/// Build an authenticated POST /agent request.
fn agent_request(body: Value) -> Request<Body> {
    Request::post("/agent")
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read full response body as a string.
async fn body_string(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), 4 * 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Decode an SSE body into events.
fn decode(body: &str) -> Vec<StreamEvent> {
    let mut dispatcher = EventDispatcher::new();
    let mut events = dispatcher.feed(body);
    events.extend(dispatcher.finish());
    events
}

fn kinds(events: &[StreamEvent]) -> Vec<EventKind> {
    events.iter().map(StreamEvent::kind).collect()
}

fn schedule(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "date": format!("2025-06-0{}", 1 + i / 3),
                "day": "Sunday", "hour": format!("{} AM", 8 + i % 3),
                "location": "Belle Mare", "region": "East", "description": "Beach",
                "attraction_name": format!("Beach {i}"), "rating": 4.2, "url": ""
            })
        })
        .collect();
    json!({"itinerary": items})
}

// =============================================================================
// Public endpoints
// =============================================================================

#[tokio::test]
async fn test_health_without_auth() {
    let app = make_app(ScriptedGateway::new()).await;
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let health: HealthResponse = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert!(!health.version.is_empty());
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_agent_requires_token() {
    let app = make_app(ScriptedGateway::new()).await;
    let resp = app
        .oneshot(
            Request::post("/agent")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"messages":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_agent_rejects_wrong_token() {
    let app = make_app(ScriptedGateway::new()).await;
    let resp = app
        .oneshot(
            Request::post("/agent")
                .header("authorization", "Bearer wrong")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"messages":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(body["error"], "unauthorized");
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_empty_history_is_bad_request() {
    let app = make_app(ScriptedGateway::new()).await;
    let resp = app
        .oneshot(agent_request(json!({"messages": []})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(body["error"], "bad_request");
    assert_eq!(body["message"], "conversation cannot be empty");
}

#[tokio::test]
async fn test_oversized_message_is_bad_request() {
    let app = make_app(ScriptedGateway::new()).await;
    let resp = app
        .oneshot(agent_request(json!({
            "messages": [{"type": "user", "message": "x".repeat(4001)}]
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_itinerary_is_bad_request() {
    let app = make_app(ScriptedGateway::new()).await;
    let resp = app
        .oneshot(agent_request(json!({
            "messages": [{"type": "user", "message": "send it"}],
            "itinerary": 42
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn test_general_question_streams_text() {
    let gateway = ScriptedGateway::new()
        .on_complete(Reply::Text("The user asks about the weather.".into()))
        .on_structured(Reply::Json(json!({})))
        .on_stream(Reply::Chunks(vec!["Warm ".into(), "and sunny.".into()]));
    let app = make_app(gateway).await;

    let resp = app
        .oneshot(agent_request(json!({
            "messages": [{"type": "user", "message": "What's the weather like?"}]
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let transcript = StreamTranscript::from_wire(&body_string(resp).await);
    assert!(transcript.started);
    assert!(transcript.finished);
    assert_eq!(transcript.text, "Warm and sunny.");
    assert!(transcript.itinerary.is_none());
}

#[tokio::test]
async fn test_itinerary_request_streams_vehicle_then_itinerary() {
    let gateway = ScriptedGateway::new()
        .on_complete(Reply::Text("3 days, 2 people, taxi, beaches.".into()))
        .on_structured(Reply::Json(json!({
            "wantsItinerary": true, "tripDurationDays": 3, "partySize": 2,
            "transportChoice": "Taxi", "preferences": "beaches"
        })))
        .on_structured(Reply::Json(json!({"queries": ["beach"]})))
        .on_structured(Reply::Json(schedule(9)));
    let app = make_app(gateway).await;

    let resp = app
        .oneshot(agent_request(json!({
            "messages": [{"type": "user", "message": "Plan 3 days for 2 people, taxi, beaches"}]
        })))
        .await
        .unwrap();
    let events = decode(&body_string(resp).await);

    assert_eq!(
        kinds(&events),
        vec![EventKind::Start, EventKind::Text, EventKind::JsonItinerary, EventKind::End]
    );
    let StreamEvent::ItineraryResult(items) = &events[2] else {
        panic!("expected itinerary, got {:?}", events[2]);
    };
    assert_eq!(items.len(), 9);
}

#[tokio::test]
async fn test_incomplete_request_returns_conditions() {
    let gateway = ScriptedGateway::new()
        .on_complete(Reply::Text("The user wants an itinerary with beaches.".into()))
        .on_structured(Reply::Json(json!({"wantsItinerary": true, "preferences": "beaches"})));
    let app = make_app(gateway).await;

    let resp = app
        .oneshot(agent_request(json!({
            "messages": [{"type": "user", "message": "Plan me a beach trip"}],
            "conditions": {"partySize": 4}
        })))
        .await
        .unwrap();
    let transcript = StreamTranscript::from_wire(&body_string(resp).await);

    let conditions = transcript.pending_conditions.unwrap();
    assert_eq!(conditions.party_size, 4);
    assert_eq!(conditions.preferences, "beaches");
    assert!(conditions.wants_itinerary);
    assert!(transcript.itinerary.is_none());
    assert!(transcript.finished);
}

#[tokio::test]
async fn test_finalize_uses_forwarded_identity() {
    let gateway = ScriptedGateway::new()
        .on_complete(Reply::Text("The user wants the plan emailed.".into()))
        .on_structured(Reply::Json(json!({"wantsFinalize": true})));
    let dispatcher = Arc::new(RecordingDispatcher::succeeding());
    let app = make_app_with(gateway, dispatcher.clone()).await;

    let request = Request::post("/agent")
        .header("authorization", format!("Bearer {}", TEST_TOKEN))
        .header("content-type", "application/json")
        .header("x-user-email", "ada@example.com")
        .header("x-user-name", "Ada")
        .body(Body::from(
            json!({
                "messages": [{"type": "user", "message": "Email me the plan"}],
                "itinerary": schedule(3)
            })
            .to_string(),
        ))
        .unwrap();
    let resp = app.oneshot(request).await.unwrap();
    let transcript = StreamTranscript::from_wire(&body_string(resp).await);

    assert!(transcript.text.contains("Email sent!"));
    let sent = dispatcher.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient_email, "ada@example.com");
    assert_eq!(sent[0].recipient_name, "Ada");
    assert_eq!(sent[0].itinerary.len(), 3);
}

#[tokio::test]
async fn test_gateway_failure_streams_error_frame() {
    let gateway = ScriptedGateway::new().on_complete(Reply::Status(503, "overloaded".into()));
    let app = make_app(gateway).await;

    let resp = app
        .oneshot(agent_request(json!({
            "messages": [{"type": "user", "message": "hello"}]
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let events = decode(&body_string(resp).await);
    assert_eq!(
        kinds(&events),
        vec![EventKind::Start, EventKind::Error, EventKind::End]
    );
    let StreamEvent::Error(message) = &events[1] else {
        panic!("expected error frame");
    };
    assert!(message.contains("overloaded"));
}
