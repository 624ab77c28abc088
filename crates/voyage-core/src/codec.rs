//! Server-sent event framing for [`StreamEvent`]s.
//!
//! The encoder writes `event: <kind>\ndata: <payload>\n\n` frames. The
//! decoding side is an incremental [`FrameParser`] plus [`decode_frame`],
//! a kind-routed [`EventDispatcher`] and the client-side [`StreamTranscript`].

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{EventKind, StreamEvent};
use crate::types::{IntentConditions, ItineraryItem};

/// Failure to turn a raw frame into a [`StreamEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload { kind: EventKind, reason: String },
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode one event as a complete SSE frame.
///
/// Multi-line payloads are written as consecutive `data:` lines, which the
/// decoder joins back with `\n`.
pub fn encode_frame(event: &StreamEvent) -> String {
    let payload = event.payload();
    let mut out = String::with_capacity(payload.len() + 32);
    out.push_str("event: ");
    out.push_str(event.kind().as_str());
    out.push('\n');
    for line in payload.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

// =============================================================================
// Frame parsing
// =============================================================================

/// An undecoded SSE frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// The `event:` field, or `message` when absent.
    pub event: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

/// Incremental SSE frame parser.
///
/// Bytes may be fed in arbitrary chunks; a frame is emitted once its
/// terminating blank line has arrived. Accepts `\n`, `\r\n` and `\r` line
/// endings and skips `:` comment lines (keep-alives).
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(chunk.as_ref());
        let mut frames = Vec::new();

        loop {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') else {
                break;
            };
            let consumed = if self.buffer[pos] == b'\r' {
                match self.buffer.get(pos + 1) {
                    Some(b'\n') => pos + 2,
                    Some(_) => pos + 1,
                    // A trailing CR may be the first half of CRLF.
                    None => break,
                }
            } else {
                pos + 1
            };

            let line = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
            self.buffer.drain(..consumed);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Flush a final frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<RawFrame> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r').to_string();
            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn process_line(&mut self, line: &str) -> Option<RawFrame> {
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => debug!(field, "Ignoring SSE field"),
        }
        None
    }

    fn take_frame(&mut self) -> Option<RawFrame> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        let data = std::mem::take(&mut self.data).join("\n");
        Some(RawFrame { event, data })
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a raw frame into a typed event.
///
/// Tolerates text wrapped as `{"content": "..."}`, itineraries sent as a
/// bare array, and conditions that were JSON-encoded twice.
pub fn decode_frame(frame: &RawFrame) -> Result<StreamEvent, DecodeError> {
    let kind = EventKind::from_wire(&frame.event)
        .ok_or_else(|| DecodeError::UnknownKind(frame.event.clone()))?;

    let event = match kind {
        EventKind::Start => StreamEvent::Start,
        EventKind::End => StreamEvent::End,
        EventKind::Text => StreamEvent::TextDelta(unwrap_text(&frame.data)),
        EventKind::Error => StreamEvent::Error(unwrap_text(&frame.data)),
        EventKind::JsonItinerary => {
            let value = parse_json(kind, &frame.data)?;
            let items = parse_itinerary_payload(&value).map_err(|reason| {
                DecodeError::MalformedPayload { kind, reason }
            })?;
            StreamEvent::ItineraryResult(items)
        }
        EventKind::RequestItinerary => {
            let value = unwrap_content(parse_json(kind, &frame.data)?);
            let value = match value {
                Value::String(inner) => parse_json(kind, &inner)?,
                other => other,
            };
            let conditions: IntentConditions =
                serde_json::from_value(value).map_err(|e| DecodeError::MalformedPayload {
                    kind,
                    reason: e.to_string(),
                })?;
            StreamEvent::RequestMoreInput(conditions)
        }
    };

    Ok(event)
}

/// Read an itinerary from `{"itinerary": [...]}`, a bare array, or either of
/// those wrapped in `{"content": ...}` or encoded as a JSON string.
pub fn parse_itinerary_payload(value: &Value) -> Result<Vec<ItineraryItem>, String> {
    match value {
        Value::Array(_) => serde_json::from_value(value.clone()).map_err(|e| e.to_string()),
        Value::Object(map) => {
            if let Some(items) = map.get("itinerary") {
                parse_itinerary_payload(items)
            } else if let Some(content) = map.get("content") {
                parse_itinerary_payload(content)
            } else {
                Err("object has no itinerary field".to_string())
            }
        }
        Value::String(text) => {
            let inner: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
            if inner.is_string() {
                return Err("doubly encoded string".to_string());
            }
            parse_itinerary_payload(&inner)
        }
        other => Err(format!("expected array or object, got {other}")),
    }
}

fn parse_json(kind: EventKind, data: &str) -> Result<Value, DecodeError> {
    serde_json::from_str(data).map_err(|e| DecodeError::MalformedPayload {
        kind,
        reason: e.to_string(),
    })
}

fn unwrap_content(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("content") => {
            map.remove("content").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn unwrap_text(data: &str) -> String {
    if data.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(data) {
            if let Some(Value::String(content)) = map.get("content") {
                return content.clone();
            }
        }
    }
    data.to_string()
}

// =============================================================================
// Dispatch
// =============================================================================

type Handler = Box<dyn FnMut(&StreamEvent) + Send>;

/// Routes decoded events to callbacks registered per kind.
///
/// Unknown kinds and malformed payloads are logged and dropped without
/// reaching any handler.
#[derive(Default)]
pub struct EventDispatcher {
    parser: FrameParser,
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event kind. Several callbacks may share
    /// a kind; they run in registration order.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> &mut Self
    where
        F: FnMut(&StreamEvent) + Send + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
        self
    }

    /// Feed raw bytes and return the events that were decoded and handled.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<StreamEvent> {
        let frames = self.parser.feed(chunk);
        frames.iter().filter_map(|f| self.dispatch(f)).collect()
    }

    /// Flush the parser at end of stream.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        match self.parser.finish() {
            Some(frame) => self.dispatch(&frame).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Decode and dispatch a single frame.
    pub fn dispatch(&mut self, frame: &RawFrame) -> Option<StreamEvent> {
        let event = match decode_frame(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(event = %frame.event, error = %e, "Dropping undecodable frame");
                return None;
            }
        };

        if let Some(handlers) = self.handlers.get_mut(&event.kind()) {
            for handler in handlers.iter_mut() {
                handler(&event);
            }
        }
        Some(event)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("parser", &self.parser)
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// Client state
// =============================================================================

/// What a client has learned from one response stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamTranscript {
    pub started: bool,
    /// Concatenation of every text delta.
    pub text: String,
    /// The most recent itinerary received.
    pub itinerary: Option<Vec<ItineraryItem>>,
    /// Conditions handed back when the server asked for more input.
    pub pending_conditions: Option<IntentConditions>,
    pub error: Option<String>,
    pub finished: bool,
}

impl StreamTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one decoded event into the transcript.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Start => self.started = true,
            StreamEvent::TextDelta(chunk) => self.text.push_str(chunk),
            StreamEvent::ItineraryResult(items) => self.itinerary = Some(items.clone()),
            StreamEvent::RequestMoreInput(conditions) => {
                self.pending_conditions = Some(conditions.clone())
            }
            StreamEvent::Error(message) => self.error = Some(message.clone()),
            StreamEvent::End => self.finished = true,
        }
    }

    /// Decode a complete response body.
    pub fn from_wire(body: &str) -> Self {
        let mut dispatcher = EventDispatcher::new();
        let mut transcript = Self::new();
        let mut events = dispatcher.feed(body);
        events.extend(dispatcher.finish());
        for event in &events {
            transcript.apply(event);
        }
        transcript
    }
}
