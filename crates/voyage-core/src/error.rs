use thiserror::Error;

/// Top-level error type for the Voyage system.
///
/// Subsystem crates define their own error types and convert into or out of
/// `VoyageError` so that the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VoyageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<toml::de::Error> for VoyageError {
    fn from(err: toml::de::Error) -> Self {
        VoyageError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VoyageError {
    fn from(err: toml::ser::Error) -> Self {
        VoyageError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VoyageError {
    fn from(err: serde_json::Error) -> Self {
        VoyageError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Voyage operations.
pub type Result<T> = std::result::Result<T, VoyageError>;
