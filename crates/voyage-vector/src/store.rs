//! Attraction knowledge base: build-or-load wrapper around [`VectorIndex`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use voyage_core::config::RetrievalConfig;
use voyage_core::error::VoyageError;
use voyage_core::types::{AttractionCandidate, AttractionMetadata};

use crate::embedding::DynEmbeddingService;
use crate::index::{IndexRecord, SearchHit, VectorIndex};

/// Persisted attraction index, initialised at most once per process.
///
/// The first query loads the snapshot at `index_path`; if it is missing,
/// unreadable or built with different dimensions, the index is rebuilt from
/// every `*.json` file in `dataset_dir` and saved before the query runs.
pub struct AttractionStore {
    dataset_dir: PathBuf,
    index_path: PathBuf,
    embedder: Arc<dyn DynEmbeddingService>,
    index: OnceCell<Arc<VectorIndex>>,
}

impl AttractionStore {
    pub fn new(
        dataset_dir: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            index_path: index_path.into(),
            embedder,
            index: OnceCell::new(),
        }
    }

    pub fn from_config(config: &RetrievalConfig, embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self::new(&config.dataset_dir, &config.index_path, embedder)
    }

    /// Wrap an already-built index. Nothing is read from or written to disk.
    pub fn with_index(index: VectorIndex, embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self {
            dataset_dir: PathBuf::new(),
            index_path: PathBuf::new(),
            embedder,
            index: OnceCell::new_with(Some(Arc::new(index))),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Get the index, loading or building it on first use.
    ///
    /// Concurrent callers in one process share a single initialisation.
    pub async fn index(&self) -> Result<Arc<VectorIndex>, VoyageError> {
        self.index
            .get_or_try_init(|| async {
                match self.load_existing().await {
                    Some(index) => Ok(Arc::new(index)),
                    None => self.build_and_save().await.map(Arc::new),
                }
            })
            .await
            .cloned()
    }

    /// Rebuild the index from the dataset and persist it, regardless of any
    /// existing snapshot. Returns the number of indexed documents.
    pub async fn rebuild(&self) -> Result<usize, VoyageError> {
        let index = self.build_and_save().await?;
        let count = index.len();
        if self.index.set(Arc::new(index)).is_err() {
            debug!("Index already initialised in this process; rebuilt snapshot applies on restart");
        }
        Ok(count)
    }

    /// Embed `query` and return up to `k` nearest attractions.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<AttractionCandidate>, VoyageError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let index = self.index().await?;
        let embedding = self.embedder.embed_boxed(query).await?;
        let hits = index.search(&embedding, k)?;
        debug!(query, hits = hits.len(), "Attraction search");
        Ok(hits.into_iter().map(candidate_from_hit).collect())
    }

    async fn load_existing(&self) -> Option<VectorIndex> {
        let path = self.index_path.clone();
        let loaded = blocking(move || Ok(path.exists().then(|| VectorIndex::load(&path))))
            .await
            .ok()??;
        match loaded {
            Ok(index) if index.dimensions() == self.embedder.dimensions() => {
                info!(
                    path = %self.index_path.display(),
                    records = index.len(),
                    "Loaded attraction index"
                );
                Some(index)
            }
            Ok(index) => {
                warn!(
                    found = index.dimensions(),
                    expected = self.embedder.dimensions(),
                    "Index dimensions do not match embedder, rebuilding"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to load attraction index, rebuilding");
                None
            }
        }
    }

    async fn build_and_save(&self) -> Result<VectorIndex, VoyageError> {
        let dir = self.dataset_dir.clone();
        let documents = blocking(move || read_dataset(&dir)).await?;
        info!(
            dataset = %self.dataset_dir.display(),
            documents = documents.len(),
            "Building attraction index"
        );

        let index = VectorIndex::new(self.embedder.dimensions());
        for (id, doc) in documents {
            let text = doc.to_string();
            match self.embedder.embed_boxed(&text).await {
                Ok(embedding) => {
                    let record = IndexRecord {
                        id: id.clone(),
                        text,
                        metadata: doc,
                        embedding,
                    };
                    if let Err(e) = index.insert(record) {
                        warn!(id = %id, error = %e, "Skipping attraction document");
                    }
                }
                Err(e) => warn!(id = %id, error = %e, "Skipping attraction document"),
            }
        }

        if index.is_empty() {
            return Err(VoyageError::Dataset(format!(
                "No attraction documents could be indexed from {}",
                self.dataset_dir.display()
            )));
        }

        let snapshot = index.clone();
        let path = self.index_path.clone();
        blocking(move || snapshot.save(&path)).await?;
        Ok(index)
    }
}

/// Run filesystem work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, VoyageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, VoyageError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| VoyageError::Index(format!("index I/O task failed: {e}")))?
}

impl std::fmt::Debug for AttractionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttractionStore")
            .field("dataset_dir", &self.dataset_dir)
            .field("index_path", &self.index_path)
            .field("initialised", &self.index.initialized())
            .finish()
    }
}

/// Read every `*.json` file in `dir`, in filename order.
///
/// Each file holds an array of documents. Files that cannot be parsed and
/// entries that are not objects are skipped with a warning. Document IDs are
/// the document's own `id` field when present, else `<file stem>:<position>`.
pub fn read_dataset(dir: &Path) -> Result<Vec<(String, Value)>, VoyageError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        VoyageError::Dataset(format!("Cannot read dataset directory {}: {}", dir.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut documents = Vec::new();
    for path in files {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let parsed = std::fs::read_to_string(&path)
            .map_err(VoyageError::from)
            .and_then(|body| serde_json::from_str::<Value>(&body).map_err(VoyageError::from));
        let docs = match parsed {
            Ok(Value::Array(docs)) => docs,
            Ok(_) => {
                warn!(file = %path.display(), "Dataset file is not a JSON array, skipping");
                continue;
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Unreadable dataset file, skipping");
                continue;
            }
        };

        for (position, doc) in docs.into_iter().enumerate() {
            if !doc.is_object() {
                warn!(file = %path.display(), position, "Dataset entry is not an object, skipping");
                continue;
            }
            let id = match doc.get("id") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => format!("{stem}:{position}"),
            };
            documents.push((id, doc));
        }
    }

    Ok(documents)
}

fn candidate_from_hit(hit: SearchHit) -> AttractionCandidate {
    let name = hit
        .metadata
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    AttractionCandidate {
        id: hit.id,
        name,
        metadata: AttractionMetadata::from_document(&hit.metadata),
        source_text: hit.text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedding;
    use serde_json::json;

    fn write_dataset(dir: &Path) {
        let beaches = json!([
            {"name": "Trou aux Biches", "location": "Trou aux Biches", "region": "North",
             "rating": 4.6, "url": "https://maps.example/tab", "description": "Calm beach"},
            {"name": "Belle Mare", "location": "Belle Mare", "region": "East",
             "rating": 4.5, "maps_url": "https://maps.example/bm", "description": "Long beach"},
            "not an object"
        ]);
        let culture = json!([
            {"id": "aapravasi", "name": "Aapravasi Ghat", "location": "Port Louis",
             "region": "Port Louis", "rating": 4.4, "description": "Heritage site"}
        ]);
        std::fs::write(dir.join("a_beaches.json"), beaches.to_string()).unwrap();
        std::fs::write(dir.join("b_culture.json"), culture.to_string()).unwrap();
        std::fs::write(dir.join("c_broken.json"), "[{").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
    }

    fn store_in(dir: &Path) -> AttractionStore {
        AttractionStore::new(
            dir.join("dataset"),
            dir.join("index").join("vector_store.json"),
            Arc::new(MockEmbedding::with_dimensions(32)),
        )
    }

    #[test]
    fn test_read_dataset_reads_all_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());

        let docs = read_dataset(dir.path()).unwrap();
        let ids: Vec<&str> = docs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a_beaches:0", "a_beaches:1", "aapravasi"]);
    }

    #[test]
    fn test_read_dataset_missing_dir() {
        assert!(matches!(
            read_dataset(Path::new("/nonexistent/dataset")),
            Err(VoyageError::Dataset(_))
        ));
    }

    #[tokio::test]
    async fn test_builds_and_persists_on_first_query() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dataset")).unwrap();
        write_dataset(&dir.path().join("dataset"));

        let store = store_in(dir.path());
        let hits = store.similarity_search("beach", 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(store.index_path().exists());

        let bm = hits.iter().find(|c| c.name == "Belle Mare").unwrap();
        assert_eq!(bm.metadata.url, "https://maps.example/bm");
        assert_eq!(bm.metadata.region, "East");
        assert!(bm.source_text.contains("Long beach"));
    }

    #[tokio::test]
    async fn test_reuses_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dataset")).unwrap();
        write_dataset(&dir.path().join("dataset"));

        assert_eq!(store_in(dir.path()).rebuild().await.unwrap(), 3);

        // Dataset removed: a second store must come from the snapshot.
        std::fs::remove_dir_all(dir.path().join("dataset")).unwrap();
        let store = store_in(dir.path());
        let hits = store.similarity_search("heritage", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_queries_share_one_build() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dataset")).unwrap();
        write_dataset(&dir.path().join("dataset"));

        let store = store_in(dir.path());
        let (first, second) = tokio::join!(
            store.similarity_search("beach", 2),
            store.similarity_search("heritage", 2)
        );
        assert_eq!(first.unwrap().len(), 2);
        assert_eq!(second.unwrap().len(), 2);

        let first_index = store.index().await.unwrap();
        assert!(Arc::ptr_eq(&first_index, &store.index().await.unwrap()));
        assert_eq!(VectorIndex::load(store.index_path()).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_dataset_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dataset")).unwrap();

        let store = store_in(dir.path());
        assert!(matches!(
            store.similarity_search("anything", 3).await,
            Err(VoyageError::Dataset(_))
        ));
    }

    #[tokio::test]
    async fn test_with_index_skips_disk() {
        let embedder = Arc::new(MockEmbedding::with_dimensions(4));
        let index = VectorIndex::new(4);
        index
            .insert(IndexRecord {
                id: "only".to_string(),
                text: "{}".to_string(),
                metadata: json!({"name": "Only One"}),
                embedding: vec![0.5, 0.5, 0.5, 0.5],
            })
            .unwrap();

        let store = AttractionStore::with_index(index, embedder);
        let hits = store.similarity_search("q", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Only One");
        assert!(store.similarity_search("q", 0).await.unwrap().is_empty());
    }
}
