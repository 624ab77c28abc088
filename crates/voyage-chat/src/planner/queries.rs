//! Search query formulation from the traveller's preferences.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use voyage_inference::{CompletionRequest, GatewayError, InferenceGateway};

/// Preference used when the traveller stated none.
pub const DEFAULT_PREFERENCE: &str = "High Popularity (Good ratings, High Audience Popularity, etc)";

const QUERY_PROMPT: &str = "Formulate short search queries for tourist attractions that match the \
traveller's preferences. Each query should describe one kind of attraction in a few words.";

const QUERY_MAX_TOKENS: u32 = 256;

/// Turns preferences into knowledge-base search queries.
pub struct QueryFormulator {
    gateway: Arc<dyn InferenceGateway>,
    max_queries: usize,
}

impl QueryFormulator {
    pub fn new(gateway: Arc<dyn InferenceGateway>, max_queries: usize) -> Self {
        Self {
            gateway,
            max_queries: max_queries.max(1),
        }
    }

    /// Produce between one and `max_queries` queries. A malformed or empty
    /// answer falls back to the preference text itself.
    pub async fn formulate(&self, preferences: &str) -> Result<Vec<String>, GatewayError> {
        let preference = match preferences.trim() {
            "" => DEFAULT_PREFERENCE,
            p => p,
        };

        let request = CompletionRequest::new(QUERY_PROMPT)
            .with_user(format!(
                "Itinerary preferences: {preference}\nReturn at most {} queries.",
                self.max_queries
            ))
            .with_max_tokens(QUERY_MAX_TOKENS);

        let answer = match self
            .gateway
            .generate_structured(request, &queries_schema())
            .await
        {
            Ok(value) => value,
            Err(e) if e.is_malformed_output() => {
                warn!(error = %e, "Query formulation was malformed, searching by preference");
                Value::Null
            }
            Err(e) => return Err(e),
        };

        let mut queries = read_queries(&answer);
        queries.truncate(self.max_queries);
        if queries.is_empty() {
            queries.push(preference.to_string());
        }
        debug!(?queries, "Formulated search queries");
        Ok(queries)
    }
}

/// Object-rooted schema; some providers reject array-rooted structured output.
pub fn queries_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "queries": {
                "type": "array",
                "items": {
                    "type": "string",
                    "description": "A query based on the traveller's preferences to find attractions."
                }
            }
        },
        "required": ["queries"]
    })
}

/// Accept `{"queries": [...]}` or a bare array; blank and duplicate entries
/// are dropped.
fn read_queries(answer: &Value) -> Vec<String> {
    let items = match answer {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("queries") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    let mut queries: Vec<String> = Vec::with_capacity(items.len());
    for query in items.iter().filter_map(Value::as_str).map(str::trim) {
        if !query.is_empty() && !queries.iter().any(|q| q == query) {
            queries.push(query.to_string());
        }
    }
    queries
}
