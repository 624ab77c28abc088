use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trip length used when the user never stated one.
pub const DEFAULT_TRIP_DAYS: u32 = 3;

// =============================================================================
// Conversation
// =============================================================================

/// Who authored a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    /// Messages produced by the backend. Older clients label these `system`,
    /// `ai` or `model`.
    #[serde(alias = "system", alias = "ai", alias = "model")]
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

/// One message of the running chat history.
///
/// The full history is resubmitted on every request; nothing is kept
/// server-side between requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(alias = "type")]
    pub speaker: Speaker,
    #[serde(alias = "message", default)]
    pub text: String,
    /// Itinerary payload previously shown to the user alongside this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary: Option<Value>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            itinerary: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            itinerary: None,
        }
    }

    /// Attach an itinerary payload to this turn.
    pub fn with_itinerary(mut self, itinerary: Value) -> Self {
        self.itinerary = Some(itinerary);
        self
    }
}

// =============================================================================
// Intent
// =============================================================================

/// Trip parameters and action flags extracted from the conversation.
///
/// Numeric fields use `0` as the "not stated" sentinel; an explicit `1` is
/// a real value. Field names on the wire are camelCase.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntentConditions {
    pub trip_duration_days: u32,
    pub wants_itinerary: bool,
    pub preferences: String,
    pub wants_ticket_booking: bool,
    pub party_size: u32,
    pub transport_choice: String,
    pub wants_finalize: bool,
    pub has_accessibility_need: bool,
}

impl IntentConditions {
    /// Merge freshly extracted conditions over the ones carried from earlier
    /// turns. Non-zero numbers, non-blank strings and `true` flags in `self`
    /// win; everything else is inherited from `prior`.
    pub fn merge_over(self, prior: &IntentConditions) -> IntentConditions {
        fn pick_num(new: u32, old: u32) -> u32 {
            if new > 0 {
                new
            } else {
                old
            }
        }
        fn pick_str(new: String, old: &str) -> String {
            if new.trim().is_empty() {
                old.to_string()
            } else {
                new
            }
        }

        IntentConditions {
            trip_duration_days: pick_num(self.trip_duration_days, prior.trip_duration_days),
            wants_itinerary: self.wants_itinerary || prior.wants_itinerary,
            preferences: pick_str(self.preferences, &prior.preferences),
            wants_ticket_booking: self.wants_ticket_booking || prior.wants_ticket_booking,
            party_size: pick_num(self.party_size, prior.party_size),
            transport_choice: pick_str(self.transport_choice, &prior.transport_choice),
            wants_finalize: self.wants_finalize || prior.wants_finalize,
            has_accessibility_need: self.has_accessibility_need || prior.has_accessibility_need,
        }
    }

    /// Whether enough is known to plan: at least one day, one traveller and
    /// a named transport.
    pub fn ready_for_itinerary(&self) -> bool {
        self.trip_duration_days >= 1
            && self.party_size >= 1
            && !self.transport_choice.trim().is_empty()
    }

    /// Names of the parameters still blocking itinerary generation.
    pub fn missing_parameters(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.trip_duration_days == 0 {
            missing.push("tripDurationDays");
        }
        if self.party_size == 0 {
            missing.push("partySize");
        }
        if self.transport_choice.trim().is_empty() {
            missing.push("transportChoice");
        }
        missing
    }

    /// Trip length with the unset sentinel replaced by the default.
    pub fn effective_duration(&self) -> u32 {
        if self.trip_duration_days == 0 {
            DEFAULT_TRIP_DAYS
        } else {
            self.trip_duration_days
        }
    }
}

// =============================================================================
// Attractions
// =============================================================================

/// Descriptive fields of an attraction document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttractionMetadata {
    pub location: String,
    pub region: String,
    pub rating: Option<f64>,
    pub url: String,
    pub description: String,
}

impl AttractionMetadata {
    /// Read metadata from a raw dataset document. Unknown fields are ignored;
    /// `maps_url` is accepted in place of `url`.
    pub fn from_document(doc: &Value) -> Self {
        let text = |key: &str| {
            doc.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let url = match text("url") {
            u if !u.is_empty() => u,
            _ => text("maps_url"),
        };
        let rating = doc.get("rating").and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Self {
            location: text("location"),
            region: text("region"),
            rating,
            url,
            description: text("description"),
        }
    }
}

/// A retrieved knowledge-base record offered to the schedule synthesizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttractionCandidate {
    pub id: String,
    pub name: String,
    pub source_text: String,
    pub metadata: AttractionMetadata,
}

// =============================================================================
// Itinerary
// =============================================================================

/// One scheduled stop. Field names are part of the wire contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItineraryItem {
    /// Calendar date, serialized as `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// Weekday name, e.g. `Monday`.
    pub day: String,
    /// 12-hour clock time, e.g. `9 AM` or `10:30 PM`.
    pub hour: String,
    pub location: String,
    pub region: String,
    pub description: String,
    pub attraction_name: String,
    /// Rating out of 5.
    pub rating: f64,
    pub url: String,
}

impl ItineraryItem {
    /// Minutes after midnight of `hour`, if it parses.
    pub fn start_minutes(&self) -> Option<u32> {
        parse_time_to_minutes(&self.hour)
    }
}

/// Parse a clock string such as `9 AM`, `10:30 pm` or `14:00` into minutes
/// after midnight.
pub fn parse_time_to_minutes(raw: &str) -> Option<u32> {
    let normalized = raw.trim().to_ascii_lowercase().replace('.', "");
    let (clock, meridiem) = if let Some(rest) = normalized.strip_suffix("am") {
        (rest.trim(), Some(false))
    } else if let Some(rest) = normalized.strip_suffix("pm") {
        (rest.trim(), Some(true))
    } else {
        (normalized.as_str(), None)
    };

    let (hours, minutes) = match clock.split_once(':') {
        Some((h, m)) => (h.trim().parse::<u32>().ok()?, m.trim().parse::<u32>().ok()?),
        None => (clock.parse::<u32>().ok()?, 0),
    };
    if minutes >= 60 {
        return None;
    }

    let hours = match meridiem {
        Some(is_pm) => {
            if !(1..=12).contains(&hours) {
                return None;
            }
            match (hours, is_pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            }
        }
        None if hours < 24 => hours,
        None => return None,
    };

    Some(hours * 60 + minutes)
}

/// Order an itinerary by date, then start time. Unparsable times sort first
/// within their date.
pub fn sort_itinerary(items: &mut [ItineraryItem]) {
    items.sort_by_key(|item| (item.date, item.start_minutes()));
}

// =============================================================================
// Vehicle
// =============================================================================

/// Vehicle size class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleTier {
    Sedan,
    SevenSeater,
    MiniVan,
}

/// Recommended vehicle for the party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleAssignment {
    pub tier: VehicleTier,
    pub tier_label: String,
    pub price_note: String,
    pub accessibility_note: String,
}

// =============================================================================
// Identity
// =============================================================================

/// The authenticated user, as reported by the identity layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(date: &str, hour: &str) -> ItineraryItem {
        ItineraryItem {
            date: date.parse().unwrap(),
            day: "Monday".to_string(),
            hour: hour.to_string(),
            location: "Grand Baie".to_string(),
            region: "North".to_string(),
            description: "Lagoon".to_string(),
            attraction_name: "Grand Baie Beach".to_string(),
            rating: 4.5,
            url: "https://maps.example/gb".to_string(),
        }
    }

    #[test]
    fn test_turn_accepts_legacy_field_names() {
        let turn: ConversationTurn =
            serde_json::from_value(json!({"type": "user", "message": "hi"})).unwrap();
        assert_eq!(turn.speaker, Speaker::User);
        assert_eq!(turn.text, "hi");
        assert!(turn.itinerary.is_none());

        let turn: ConversationTurn =
            serde_json::from_value(json!({"speaker": "system", "text": "hello"})).unwrap();
        assert_eq!(turn.speaker, Speaker::Assistant);
    }

    #[test]
    fn test_conditions_wire_names() {
        let conditions = IntentConditions {
            trip_duration_days: 3,
            party_size: 2,
            transport_choice: "taxi".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&conditions).unwrap();
        assert_eq!(value["tripDurationDays"], 3);
        assert_eq!(value["partySize"], 2);
        assert_eq!(value["transportChoice"], "taxi");
        assert_eq!(value["hasAccessibilityNeed"], false);
        assert_eq!(value.as_object().unwrap().len(), 8);
    }

    #[test]
    fn test_conditions_missing_fields_default() {
        let conditions: IntentConditions =
            serde_json::from_value(json!({"wantsItinerary": true})).unwrap();
        assert!(conditions.wants_itinerary);
        assert_eq!(conditions.trip_duration_days, 0);
        assert!(!conditions.ready_for_itinerary());
    }

    #[test]
    fn test_merge_keeps_prior_values() {
        let prior = IntentConditions {
            trip_duration_days: 4,
            preferences: "beach".to_string(),
            party_size: 2,
            ..Default::default()
        };
        let fresh = IntentConditions {
            transport_choice: "car".to_string(),
            wants_itinerary: true,
            ..Default::default()
        };

        let merged = fresh.merge_over(&prior);
        assert_eq!(merged.trip_duration_days, 4);
        assert_eq!(merged.preferences, "beach");
        assert_eq!(merged.party_size, 2);
        assert_eq!(merged.transport_choice, "car");
        assert!(merged.wants_itinerary);
        assert!(merged.ready_for_itinerary());
    }

    #[test]
    fn test_merge_new_values_overwrite() {
        let prior = IntentConditions {
            trip_duration_days: 4,
            transport_choice: "bus".to_string(),
            ..Default::default()
        };
        let fresh = IntentConditions {
            trip_duration_days: 1,
            transport_choice: "   ".to_string(),
            ..Default::default()
        };

        let merged = fresh.merge_over(&prior);
        assert_eq!(merged.trip_duration_days, 1);
        assert_eq!(merged.transport_choice, "bus");
    }

    #[test]
    fn test_missing_parameters() {
        let conditions = IntentConditions {
            party_size: 2,
            ..Default::default()
        };
        assert_eq!(
            conditions.missing_parameters(),
            vec!["tripDurationDays", "transportChoice"]
        );
        assert_eq!(conditions.effective_duration(), DEFAULT_TRIP_DAYS);
    }

    #[test]
    fn test_parse_time_to_minutes() {
        assert_eq!(parse_time_to_minutes("9 AM"), Some(540));
        assert_eq!(parse_time_to_minutes("10:30 PM"), Some(22 * 60 + 30));
        assert_eq!(parse_time_to_minutes("12 AM"), Some(0));
        assert_eq!(parse_time_to_minutes("12:15 pm"), Some(735));
        assert_eq!(parse_time_to_minutes("9:00a.m."), Some(540));
        assert_eq!(parse_time_to_minutes("14:00"), Some(840));
        assert_eq!(parse_time_to_minutes("13 PM"), None);
        assert_eq!(parse_time_to_minutes("noon"), None);
        assert_eq!(parse_time_to_minutes(""), None);
    }

    #[test]
    fn test_sort_itinerary_by_date_then_hour() {
        let mut items = vec![
            item("2025-03-02", "9 AM"),
            item("2025-03-01", "2 PM"),
            item("2025-03-01", "whenever"),
            item("2025-03-01", "10:30 AM"),
        ];
        sort_itinerary(&mut items);

        let order: Vec<(String, String)> = items
            .iter()
            .map(|i| (i.date.to_string(), i.hour.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2025-03-01".to_string(), "whenever".to_string()),
                ("2025-03-01".to_string(), "10:30 AM".to_string()),
                ("2025-03-01".to_string(), "2 PM".to_string()),
                ("2025-03-02".to_string(), "9 AM".to_string()),
            ]
        );
    }

    #[test]
    fn test_itinerary_item_wire_shape() {
        let value = serde_json::to_value(item("2025-03-01", "9 AM")).unwrap();
        assert_eq!(value["date"], "2025-03-01");
        assert_eq!(value["attraction_name"], "Grand Baie Beach");
        assert_eq!(value.as_object().unwrap().len(), 9);
    }

    #[test]
    fn test_metadata_from_document() {
        let doc = json!({
            "name": "Le Morne",
            "location": "Le Morne",
            "region": "South West",
            "rating": "4.8",
            "maps_url": "https://maps.example/lm",
            "description": "Mountain",
            "extra": [1, 2]
        });
        let meta = AttractionMetadata::from_document(&doc);
        assert_eq!(meta.region, "South West");
        assert_eq!(meta.rating, Some(4.8));
        assert_eq!(meta.url, "https://maps.example/lm");
    }

    #[test]
    fn test_vehicle_assignment_wire_names() {
        let assignment = VehicleAssignment {
            tier: VehicleTier::SevenSeater,
            tier_label: "7-seater".to_string(),
            price_note: "$85".to_string(),
            accessibility_note: String::new(),
        };
        let value = serde_json::to_value(&assignment).unwrap();
        assert_eq!(value["tier"], "seven_seater");
        assert_eq!(value["tierLabel"], "7-seater");
        assert_eq!(value["priceNote"], "$85");
    }
}
