//! Candidate retrieval from the attraction knowledge base.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::debug;

use voyage_core::error::VoyageError;
use voyage_core::types::{AttractionCandidate, DEFAULT_TRIP_DAYS};
use voyage_vector::AttractionStore;

/// Gathers a randomised candidate pool sized to the trip.
pub struct AttractionRetriever {
    store: Arc<AttractionStore>,
    per_day: usize,
}

impl AttractionRetriever {
    pub fn new(store: Arc<AttractionStore>, per_day: usize) -> Self {
        Self {
            store,
            per_day: per_day.max(1),
        }
    }

    /// Pool size for a trip of `days` days. Zero days counts as the default
    /// trip length.
    pub fn pool_size(&self, days: u32) -> usize {
        let days = if days == 0 { DEFAULT_TRIP_DAYS } else { days };
        self.per_day * days as usize
    }

    /// Search every query for `pool_size(days)` neighbours, drop repeated
    /// records, shuffle, and keep at most `pool_size(days)`.
    pub async fn retrieve(
        &self,
        queries: &[String],
        days: u32,
    ) -> Result<Vec<AttractionCandidate>, VoyageError> {
        let k = self.pool_size(days);

        let mut seen = HashSet::new();
        let mut pool = Vec::new();
        for query in queries {
            for candidate in self.store.similarity_search(query, k).await? {
                if seen.insert(candidate.id.clone()) {
                    pool.push(candidate);
                }
            }
        }

        let found = pool.len();
        pool.shuffle(&mut rand::rng());
        pool.truncate(k);
        debug!(queries = queries.len(), found, kept = pool.len(), "Retrieved candidates");
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voyage_vector::{IndexRecord, MockEmbedding, VectorIndex};

    async fn store_with(count: usize) -> Arc<AttractionStore> {
        let embedder = MockEmbedding::with_dimensions(16);
        let index = VectorIndex::new(16);
        for i in 0..count {
            let doc = json!({
                "name": format!("Attraction {i}"),
                "region": "North",
                "rating": 4.0,
                "description": format!("Place number {i}")
            });
            let text = doc.to_string();
            let embedding = voyage_vector::EmbeddingService::embed(&embedder, &text)
                .await
                .unwrap();
            index
                .insert(IndexRecord {
                    id: format!("poi:{i}"),
                    text,
                    metadata: doc,
                    embedding,
                })
                .unwrap();
        }
        Arc::new(AttractionStore::with_index(index, Arc::new(embedder)))
    }

    fn queries(items: &[&str]) -> Vec<String> {
        items.iter().map(|q| q.to_string()).collect()
    }

    #[tokio::test]
    async fn test_pool_is_three_per_day() {
        let retriever = AttractionRetriever::new(store_with(40).await, 3);
        let pool = retriever
            .retrieve(&queries(&["beach", "museum"]), 3)
            .await
            .unwrap();
        assert_eq!(pool.len(), 9);
    }

    #[tokio::test]
    async fn test_pool_limited_by_available_records() {
        let retriever = AttractionRetriever::new(store_with(4).await, 3);
        let pool = retriever
            .retrieve(&queries(&["beach", "museum", "food"]), 5)
            .await
            .unwrap();
        assert_eq!(pool.len(), 4);
    }

    #[tokio::test]
    async fn test_no_duplicate_records_across_queries() {
        let retriever = AttractionRetriever::new(store_with(12).await, 3);
        let pool = retriever
            .retrieve(&queries(&["beach", "beach", "beaches"]), 4)
            .await
            .unwrap();
        let ids: HashSet<_> = pool.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), pool.len());
        assert!(pool.iter().all(|c| c.id.starts_with("poi:")));
        assert_eq!(pool.len(), 12);
    }

    #[tokio::test]
    async fn test_zero_days_uses_default_length() {
        let retriever = AttractionRetriever::new(store_with(30).await, 3);
        assert_eq!(retriever.pool_size(0), 9);
        let pool = retriever.retrieve(&queries(&["x"]), 0).await.unwrap();
        assert_eq!(pool.len(), 9);
    }
}
