//! Schedule synthesis: arranges candidates into dated, timed stops.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use voyage_core::types::{sort_itinerary, AttractionCandidate, ItineraryItem};
use voyage_inference::{CompletionRequest, GatewayError, InferenceGateway};

const ITEM_FIELDS: &[(&str, &str, &str)] = &[
    ("date", "string", "The date of the visit in YYYY-MM-DD format."),
    ("day", "string", "The day of the week of the visit (e.g. 'Monday')."),
    ("hour", "string", "The time of the visit (e.g. '10:00 AM')."),
    ("location", "string", "The specific location name of the attraction."),
    ("region", "string", "The geographical region of the attraction."),
    ("description", "string", "A brief description of the attraction."),
    ("attraction_name", "string", "The name of the attraction."),
    ("rating", "number", "The rating of the attraction out of 5."),
    ("url", "string", "The Google Maps URL of the attraction."),
];

const MAX_RATING: f64 = 5.0;

/// Turns a candidate pool into a day-by-day schedule.
pub struct ScheduleSynthesizer {
    gateway: Arc<dyn InferenceGateway>,
    per_day: usize,
}

impl ScheduleSynthesizer {
    pub fn new(gateway: Arc<dyn InferenceGateway>, per_day: usize) -> Self {
        Self {
            gateway,
            per_day: per_day.max(1),
        }
    }

    /// Generate the schedule. A missing or unreadable `itinerary` field
    /// yields an empty schedule; only gateway failures are errors.
    pub async fn synthesize(
        &self,
        candidates: &[AttractionCandidate],
        today: NaiveDate,
        days: u32,
    ) -> Result<Vec<ItineraryItem>, GatewayError> {
        let days = days.max(1);
        let min_items = self.per_day * days as usize;

        let request = CompletionRequest::new(
            "You plan sightseeing itineraries. Only use the attractions you are given.",
        )
        .with_user(format!(
            "The current date is {} and the current day is {}.\n\
             Generate an itinerary based on the following attractions:\n{}\n\n\
             There must be at least {min_items} attractions for {days} days, starting today.",
            today.format("%Y-%m-%d"),
            today.format("%A"),
            render_candidates(candidates),
        ));

        let answer = match self
            .gateway
            .generate_structured(request, &itinerary_schema())
            .await
        {
            Ok(answer) => answer,
            Err(e) if e.is_malformed_output() => {
                warn!(error = %e, "Itinerary generation was malformed");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let items = read_items(&answer);
        debug!(items = items.len(), min_items, "Itinerary synthesized");
        Ok(items)
    }
}

/// JSON schema of the generation answer.
pub fn itinerary_schema() -> Value {
    let properties: Map<String, Value> = ITEM_FIELDS
        .iter()
        .map(|(name, kind, description)| {
            (
                name.to_string(),
                json!({"type": kind, "description": description}),
            )
        })
        .collect();
    let required: Vec<&str> = ITEM_FIELDS.iter().map(|(name, _, _)| *name).collect();

    json!({
        "type": "object",
        "properties": {
            "itinerary": {
                "type": "array",
                "description": "The attractions of the itinerary with their details.",
                "items": {
                    "type": "object",
                    "properties": properties,
                    "required": required
                }
            }
        },
        "required": ["itinerary"]
    })
}

fn render_candidates(candidates: &[AttractionCandidate]) -> String {
    candidates
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "location": c.metadata.location,
                "region": c.metadata.region,
                "rating": c.metadata.rating,
                "url": c.metadata.url,
                "description": c.metadata.description,
            })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read, repair and sort the generated items. Items without a valid date
/// are dropped.
fn read_items(answer: &Value) -> Vec<ItineraryItem> {
    let Some(raw_items) = answer.get("itinerary").and_then(Value::as_array) else {
        warn!("Itinerary answer has no itinerary array");
        return Vec::new();
    };

    let mut items: Vec<ItineraryItem> = raw_items
        .iter()
        .enumerate()
        .filter_map(|(position, raw)| match repair_item(raw) {
            Some(item) => Some(item),
            None => {
                warn!(position, "Skipping malformed itinerary item");
                None
            }
        })
        .collect();
    sort_itinerary(&mut items);
    items
}

fn repair_item(raw: &Value) -> Option<ItineraryItem> {
    let obj = raw.as_object()?;
    let text = |key: &str| match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    let date = NaiveDate::parse_from_str(&text("date"), "%Y-%m-%d").ok()?;
    let attraction_name = text("attraction_name");
    if attraction_name.is_empty() {
        return None;
    }

    let rating = match obj.get("rating") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|r| r.is_finite())
    .unwrap_or(0.0)
    .clamp(0.0, MAX_RATING);

    let day = match text("day") {
        d if d.is_empty() => date.format("%A").to_string(),
        d => d,
    };

    Some(ItineraryItem {
        date,
        day,
        hour: text("hour"),
        location: text("location"),
        region: text("region"),
        description: text("description"),
        attraction_name,
        rating,
        url: text("url"),
    })
}
