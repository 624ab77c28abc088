//! Intent evaluator: turns the conversation into merged [`IntentConditions`].
//!
//! Structured extraction by the model comes first. Deterministic fallbacks
//! over the summary and the user's own words fill whatever the model missed,
//! then the result is merged over the conditions carried from earlier turns.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use voyage_core::types::{ConversationTurn, IntentConditions, Speaker};
use voyage_inference::{CompletionRequest, GatewayError, InferenceGateway};

const EVALUATOR_PROMPT: &str = "Based on the conversation summary, determine the traveller's trip \
conditions. Set wantsItinerary to true if they want to plan a trip or generate an itinerary. \
Extract tripDurationDays, partySize, transportChoice, wantsTicketBooking and \
hasAccessibilityNeed only if explicitly stated, using 0, empty text or false otherwise. Capture \
preferences such as beaches or nature in preferences. Set wantsFinalize to true only if they want \
to finalize the drafted itinerary and receive it. If the message contains structured data such \
as \"itineraryDuration=1; numberOfPeople=1; transport=Taxi\", parse those values.";

const EVALUATOR_MAX_TOKENS: u32 = 512;

const PREFERENCE_KEYWORDS: &[&str] = &[
    "beach", "nature", "culture", "history", "wildlife", "shopping", "food",
];

// =============================================================================
// Compiled patterns
// =============================================================================

struct KeyValuePatterns {
    duration: Regex,
    people: Regex,
    transport: Regex,
    accessibility: Regex,
    tickets: Regex,
    preferences: Regex,
}

static KV_PATTERNS: LazyLock<KeyValuePatterns> = LazyLock::new(|| KeyValuePatterns {
    duration: Regex::new(r"(?i)\b(?:itineraryduration|tripdurationdays)\s*=\s*(\d+)").unwrap(),
    people: Regex::new(r"(?i)\b(?:numberofpeople|partysize)\s*=\s*(\d+)").unwrap(),
    transport: Regex::new(r"(?i)\b(?:transportchoice|transport)\s*=\s*([^;,\n]+)").unwrap(),
    accessibility: Regex::new(
        r"(?i)\b(?:hasdisabledperson|hasaccessibilityneed)\s*=\s*(true|false)",
    )
    .unwrap(),
    tickets: Regex::new(r"(?i)\b(?:booktickets|wantsticketbooking)\s*=\s*(true|false)").unwrap(),
    preferences: Regex::new(r"(?i)\b(?:itinerarypreferences|preferences)\s*=\s*([^;\n]+)")
        .unwrap(),
});

static ITINERARY_KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:itinerary|plan|trip|generate)\b").unwrap());

/// Values meaning "not given". A value that starts with one of these words,
/// like "not specified yet", counts too.
const EMPTY_MARKERS: &[&str] = &[
    "null",
    "none",
    "undefined",
    "n/a",
    "unknown",
    "unspecified",
    "not specified",
    "not provided",
    "not mentioned",
    "not stated",
    "not given",
    "tbd",
];

static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

// =============================================================================
// Evaluator
// =============================================================================

/// Extracts trip parameters and action flags from the conversation.
pub struct IntentEvaluator {
    gateway: Arc<dyn InferenceGateway>,
}

impl IntentEvaluator {
    pub fn new(gateway: Arc<dyn InferenceGateway>) -> Self {
        Self { gateway }
    }

    /// Evaluate the conversation and merge the result over `prior`.
    ///
    /// A malformed extraction is treated as empty; transport failures and
    /// timeouts propagate.
    pub async fn evaluate(
        &self,
        summary: &str,
        turns: &[ConversationTurn],
        prior: &IntentConditions,
    ) -> Result<IntentConditions, GatewayError> {
        let request = CompletionRequest::new(EVALUATOR_PROMPT)
            .with_user(format!("Summary: {summary}"))
            .with_max_tokens(EVALUATOR_MAX_TOKENS);

        let extracted = match self
            .gateway
            .generate_structured(request, &conditions_schema())
            .await
        {
            Ok(value) => read_extraction(&value),
            Err(e) if e.is_malformed_output() => {
                warn!(error = %e, "Condition extraction was malformed, using fallbacks only");
                IntentConditions::default()
            }
            Err(e) => return Err(e),
        };

        let user_turns: Vec<&str> = turns
            .iter()
            .filter(|t| t.speaker == Speaker::User)
            .map(|t| t.text.as_str())
            .collect();
        let latest = user_turns.last().copied().unwrap_or_default();
        let mut texts = vec![summary];
        texts.extend(&user_turns);

        let evaluated = apply_fallbacks(extracted, &texts, latest).merge_over(prior);
        debug!(?evaluated, "Conditions evaluated");
        Ok(evaluated)
    }
}

/// JSON schema of the extraction answer.
pub fn conditions_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tripDurationDays": {
                "type": "number",
                "description": "Number of days for the trip, 0 if not stated."
            },
            "wantsItinerary": {
                "type": "boolean",
                "description": "Does the traveller want to generate an itinerary?"
            },
            "preferences": {
                "type": "string",
                "description": "The traveller's preferences for the itinerary, if any."
            },
            "wantsTicketBooking": {
                "type": "boolean",
                "description": "Will the traveller book flight tickets?"
            },
            "partySize": {
                "type": "number",
                "description": "Number of people on the trip, 0 if not stated."
            },
            "transportChoice": {
                "type": "string",
                "description": "Preferred transport for the trip, empty if not stated."
            },
            "wantsFinalize": {
                "type": "boolean",
                "description": "Does the traveller want to finalize the drafted itinerary?"
            },
            "hasAccessibilityNeed": {
                "type": "boolean",
                "description": "Is anyone in the group travelling with a disability?"
            }
        },
        "required": [
            "tripDurationDays", "wantsItinerary", "preferences", "wantsTicketBooking",
            "partySize", "transportChoice", "wantsFinalize", "hasAccessibilityNeed"
        ]
    })
}

// =============================================================================
// Lenient reading of the model's answer
// =============================================================================

/// Read an extraction answer, accepting stringly-typed values and the legacy
/// field names.
pub fn read_extraction(value: &Value) -> IntentConditions {
    let Some(obj) = value.as_object() else {
        warn!("Condition extraction is not an object");
        return IntentConditions::default();
    };

    IntentConditions {
        trip_duration_days: field(obj, &["tripDurationDays", "itineraryDuration"])
            .map(read_u32)
            .unwrap_or(0),
        wants_itinerary: field(obj, &["wantsItinerary", "generateItinerary"])
            .is_some_and(read_bool),
        preferences: field(obj, &["preferences", "itineraryPreferences"])
            .map(read_string)
            .unwrap_or_default(),
        wants_ticket_booking: field(obj, &["wantsTicketBooking", "bookTickets"])
            .is_some_and(read_bool),
        party_size: field(obj, &["partySize", "numberOfPeople"])
            .map(read_u32)
            .unwrap_or(0),
        transport_choice: field(obj, &["transportChoice", "transport"])
            .map(read_string)
            .unwrap_or_default(),
        wants_finalize: field(obj, &["wantsFinalize", "finalizeItinerary"]).is_some_and(read_bool),
        has_accessibility_need: field(obj, &["hasAccessibilityNeed", "hasDisabledPerson"])
            .is_some_and(read_bool),
    }
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|v| !v.is_null())
}

fn is_empty_marker(text: &str) -> bool {
    let lowered = text
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim_end()
        .to_ascii_lowercase();
    lowered.is_empty()
        || EMPTY_MARKERS.iter().any(|marker| {
            lowered
                .strip_prefix(*marker)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with([' ', ',', ';', '(']))
        })
}

fn read_u32(value: &Value) -> u32 {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !is_empty_marker(s) => LEADING_NUMBER_RE
            .find(s)
            .and_then(|m| m.as_str().parse::<f64>().ok()),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() && n > 0.0 => n.round().min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

fn read_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn read_string(value: &Value) -> String {
    match value {
        Value::String(s) if !is_empty_marker(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(read_string)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

// =============================================================================
// Deterministic fallbacks
// =============================================================================

/// Fill fields the model left empty from `key=value` fragments and keywords
/// found in `texts`. Any structured fragment also implies an itinerary
/// request; planning keywords only count in `latest`, the newest user turn.
pub fn apply_fallbacks(
    mut conditions: IntentConditions,
    texts: &[&str],
    latest: &str,
) -> IntentConditions {
    let patterns = &*KV_PATTERNS;
    let capture = |re: &Regex| -> Option<String> {
        texts
            .iter()
            .rev()
            .find_map(|text| re.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };

    let duration = capture(&patterns.duration);
    let people = capture(&patterns.people);
    let transport = capture(&patterns.transport);
    let accessibility = capture(&patterns.accessibility);
    let tickets = capture(&patterns.tickets);
    let preferences = capture(&patterns.preferences);

    let has_structured = duration.is_some()
        || people.is_some()
        || transport.is_some()
        || accessibility.is_some()
        || tickets.is_some();

    if conditions.trip_duration_days == 0 {
        conditions.trip_duration_days = duration.and_then(|d| d.parse().ok()).unwrap_or(0);
    }
    if conditions.party_size == 0 {
        conditions.party_size = people.and_then(|p| p.parse().ok()).unwrap_or(0);
    }
    if conditions.transport_choice.trim().is_empty() {
        conditions.transport_choice = transport.filter(|t| !is_empty_marker(t)).unwrap_or_default();
    }
    conditions.has_accessibility_need |= accessibility.is_some_and(|v| v.eq_ignore_ascii_case("true"));
    conditions.wants_ticket_booking |= tickets.is_some_and(|v| v.eq_ignore_ascii_case("true"));

    if conditions.preferences.trim().is_empty() {
        conditions.preferences = match preferences.filter(|p| !is_empty_marker(p)) {
            Some(p) => p,
            None => keyword_preferences(texts),
        };
    }

    conditions.wants_itinerary =
        conditions.wants_itinerary || has_structured || ITINERARY_KEYWORD_RE.is_match(latest);

    conditions
}

fn keyword_preferences(texts: &[&str]) -> String {
    let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
    PREFERENCE_KEYWORDS
        .iter()
        .filter(|kw| lowered.iter().any(|t| t.contains(*kw)))
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}
