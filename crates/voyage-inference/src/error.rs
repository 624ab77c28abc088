//! Inference gateway error types

use std::time::Duration;
use thiserror::Error;

use voyage_core::error::VoyageError;

/// Errors that can occur while talking to the inference service
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed generation output: {0}")]
    MalformedOutput(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Map a reqwest error, promoting client timeouts to [`GatewayError::Timeout`].
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(timeout)
        } else {
            GatewayError::Network(err)
        }
    }

    /// The model answered, but not in the requested shape. Callers recover
    /// from this locally with defaults instead of failing the request.
    pub fn is_malformed_output(&self) -> bool {
        matches!(self, GatewayError::MalformedOutput(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<GatewayError> for VoyageError {
    fn from(err: GatewayError) -> Self {
        VoyageError::Embedding(err.to_string())
    }
}
