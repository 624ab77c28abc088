//! Voyage Vector crate - embedding service, vector index, and the attraction
//! knowledge base.
//!
//! Provides an in-memory vector index with cosine similarity search and JSON
//! snapshots, an embedding service trait with a mock implementation for
//! testing, and the build-or-load `AttractionStore` used by retrieval.

pub mod embedding;
pub mod index;
pub mod store;

pub use embedding::{DynEmbeddingService, EmbeddingService, MockEmbedding};
pub use index::{IndexRecord, SearchHit, VectorIndex};
pub use store::{read_dataset, AttractionStore};
