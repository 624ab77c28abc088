//! In-memory vector index with brute-force cosine similarity search and a
//! flat JSON snapshot format.
//!
//! Search is O(n) per query, which is fine for a curated attraction dataset
//! of a few thousand records.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use voyage_core::error::VoyageError;

const SNAPSHOT_VERSION: u32 = 1;

/// A single hit returned from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity score.
    pub score: f64,
    /// The text that was embedded for this record.
    pub text: String,
    pub metadata: Value,
}

/// A record stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: Value,
    pub embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dimensions: usize,
    records: Vec<IndexRecord>,
}

/// In-memory vector index using brute-force cosine similarity.
///
/// Thread-safe via interior RwLock; clones share the same records.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    records: Arc<RwLock<HashMap<String, IndexRecord>>>,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Insert a record, replacing any existing record with the same ID.
    pub fn insert(&self, record: IndexRecord) -> Result<(), VoyageError> {
        if record.embedding.len() != self.dimensions {
            return Err(VoyageError::Index(format!(
                "Record {} has {} dimensions, index expects {}",
                record.id,
                record.embedding.len(),
                self.dimensions
            )));
        }
        let mut records = self
            .records
            .write()
            .map_err(|e| VoyageError::Index(format!("Lock poisoned: {}", e)))?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Search for the k nearest neighbours to the query vector.
    ///
    /// Results are sorted by descending similarity; ties are broken by ID so
    /// results are stable across runs.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VoyageError> {
        if query.len() != self.dimensions {
            return Err(VoyageError::Index(format!(
                "Query has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            )));
        }
        let records = self
            .records
            .read()
            .map_err(|e| VoyageError::Index(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<SearchHit> = records
            .values()
            .map(|record| SearchHit {
                id: record.id.clone(),
                score: cosine_similarity(query, &record.embedding),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    /// Return the number of records currently stored in the index.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Return true if the index contains no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist the index as a JSON snapshot.
    ///
    /// The snapshot is written to a uniquely named sibling file and then
    /// renamed over `path`, so readers never observe a partial file.
    pub fn save(&self, path: &Path) -> Result<(), VoyageError> {
        let mut records: Vec<IndexRecord> = {
            let guard = self
                .records
                .read()
                .map_err(|e| VoyageError::Index(format!("Lock poisoned: {}", e)))?;
            guard.values().cloned().collect()
        };
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            dimensions: self.dimensions,
            records,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("index.json");
        let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let body = serde_json::to_vec(&snapshot)?;
        std::fs::write(&tmp_path, body)?;
        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        info!(
            path = %path.display(),
            records = snapshot.records.len(),
            "Vector index saved"
        );
        Ok(())
    }

    /// Load a snapshot written by [`VectorIndex::save`].
    pub fn load(path: &Path) -> Result<Self, VoyageError> {
        let body = std::fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&body)
            .map_err(|e| VoyageError::Index(format!("Corrupt index snapshot: {}", e)))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(VoyageError::Index(format!(
                "Unsupported index snapshot version {}",
                snapshot.version
            )));
        }

        let index = Self::new(snapshot.dimensions);
        for record in snapshot.records {
            index.insert(record)?;
        }
        debug!(path = %path.display(), records = index.len(), "Vector index loaded");
        Ok(index)
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
