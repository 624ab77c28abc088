use std::fmt;

use serde::Serialize;

use crate::types::{IntentConditions, ItineraryItem};

/// Everything the orchestrator reports to the caller during one request.
///
/// Events are produced in program order into a single channel and consumed
/// once by the transport encoder:
/// - `Start` opens every response and `End` closes it
/// - `TextDelta` carries incremental assistant text
/// - `ItineraryResult` carries a finished itinerary
/// - `RequestMoreInput` hands back the merged conditions when trip
///   parameters are missing
/// - `Error` reports a failure that ended the request early
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Start,
    TextDelta(String),
    ItineraryResult(Vec<ItineraryItem>),
    RequestMoreInput(IntentConditions),
    Error(String),
    End,
}

/// Wire discriminator of a [`StreamEvent`] frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Text,
    JsonItinerary,
    RequestItinerary,
    Error,
    End,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Start,
        EventKind::Text,
        EventKind::JsonItinerary,
        EventKind::RequestItinerary,
        EventKind::Error,
        EventKind::End,
    ];

    /// The `event:` field value used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Text => "text",
            EventKind::JsonItinerary => "json-itinerary",
            EventKind::RequestItinerary => "request-itinerary",
            EventKind::Error => "error",
            EventKind::End => "end",
        }
    }

    /// Look up a kind by its wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name.trim())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct ItineraryPayload<'a> {
    itinerary: &'a [ItineraryItem],
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Start => EventKind::Start,
            StreamEvent::TextDelta(_) => EventKind::Text,
            StreamEvent::ItineraryResult(_) => EventKind::JsonItinerary,
            StreamEvent::RequestMoreInput(_) => EventKind::RequestItinerary,
            StreamEvent::Error(_) => EventKind::Error,
            StreamEvent::End => EventKind::End,
        }
    }

    /// Canonical payload text for the `data:` field(s).
    ///
    /// Text carries no carriage returns: `\r\n` and lone `\r` become `\n`.
    /// Itineraries are always wrapped as `{"itinerary": [...]}`.
    pub fn payload(&self) -> String {
        match self {
            StreamEvent::Start | StreamEvent::End => String::new(),
            StreamEvent::TextDelta(text) | StreamEvent::Error(text) => normalize_newlines(text),
            StreamEvent::ItineraryResult(items) => {
                serde_json::to_string(&ItineraryPayload { itinerary: items }).unwrap_or_default()
            }
            StreamEvent::RequestMoreInput(conditions) => {
                serde_json::to_string(conditions).unwrap_or_default()
            }
        }
    }
}

/// Replace `\r\n` and lone `\r` with `\n`.
pub fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let names: Vec<&str> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "start",
                "text",
                "json-itinerary",
                "request-itinerary",
                "error",
                "end"
            ]
        );
    }

    #[test]
    fn test_kind_from_wire() {
        assert_eq!(
            EventKind::from_wire("json-itinerary"),
            Some(EventKind::JsonItinerary)
        );
        assert_eq!(EventKind::from_wire(" end "), Some(EventKind::End));
        assert_eq!(EventKind::from_wire("message"), None);
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(StreamEvent::Start.kind(), EventKind::Start);
        assert_eq!(
            StreamEvent::TextDelta("hi".into()).kind(),
            EventKind::Text
        );
        assert_eq!(
            StreamEvent::ItineraryResult(vec![]).kind(),
            EventKind::JsonItinerary
        );
        assert_eq!(
            StreamEvent::RequestMoreInput(IntentConditions::default()).kind(),
            EventKind::RequestItinerary
        );
        assert_eq!(StreamEvent::Error("x".into()).kind(), EventKind::Error);
    }

    #[test]
    fn test_payload_normalizes_carriage_returns() {
        let event = StreamEvent::TextDelta("a\r\nb\rc\n".to_string());
        assert_eq!(event.payload(), "a\nb\nc\n");
    }

    #[test]
    fn test_itinerary_payload_is_wrapped() {
        let payload = StreamEvent::ItineraryResult(vec![]).payload();
        assert_eq!(payload, r#"{"itinerary":[]}"#);
    }

    #[test]
    fn test_conditions_payload() {
        let conditions = IntentConditions {
            wants_itinerary: true,
            ..Default::default()
        };
        let payload = StreamEvent::RequestMoreInput(conditions).payload();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["wantsItinerary"], true);
        assert_eq!(value["tripDurationDays"], 0);
    }

    #[test]
    fn test_empty_payloads() {
        assert_eq!(StreamEvent::Start.payload(), "");
        assert_eq!(StreamEvent::End.payload(), "");
    }
}
