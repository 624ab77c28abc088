//! Retrieval-augmented itinerary planning.
//!
//! Preferences become search queries, the queries pull a shuffled candidate
//! pool from the attraction store, and the pool is arranged into a schedule.

pub mod queries;
pub mod retriever;
pub mod schedule;

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use voyage_core::config::RetrievalConfig;
use voyage_core::types::{IntentConditions, ItineraryItem};
use voyage_inference::InferenceGateway;
use voyage_vector::AttractionStore;

use crate::error::ChatError;

pub use queries::{QueryFormulator, DEFAULT_PREFERENCE};
pub use retriever::AttractionRetriever;
pub use schedule::ScheduleSynthesizer;

/// Runs the three planning stages in order.
pub struct ItineraryPlanner {
    formulator: QueryFormulator,
    retriever: AttractionRetriever,
    synthesizer: ScheduleSynthesizer,
}

impl ItineraryPlanner {
    pub fn new(
        gateway: Arc<dyn InferenceGateway>,
        store: Arc<AttractionStore>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            formulator: QueryFormulator::new(gateway.clone(), config.max_queries),
            retriever: AttractionRetriever::new(store, config.candidates_per_day),
            synthesizer: ScheduleSynthesizer::new(gateway, config.candidates_per_day),
        }
    }

    pub async fn plan(
        &self,
        conditions: &IntentConditions,
        today: NaiveDate,
    ) -> Result<Vec<ItineraryItem>, ChatError> {
        let days = conditions.effective_duration();
        let queries = self.formulator.formulate(&conditions.preferences).await?;
        let candidates = self.retriever.retrieve(&queries, days).await?;
        let items = self
            .synthesizer
            .synthesize(&candidates, today, days)
            .await?;

        info!(
            days,
            queries = queries.len(),
            candidates = candidates.len(),
            items = items.len(),
            "Itinerary planned"
        );
        Ok(items)
    }
}
