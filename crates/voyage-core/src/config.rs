use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VoyageError};

/// Top-level configuration for the Voyage backend.
///
/// Loaded from `~/.voyage/config.toml` by default. Each section corresponds
/// to one subsystem; missing sections fall back to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoyageConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub finalize: FinalizeConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl VoyageConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VoyageConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VoyageError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the API token and other runtime files.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP port the API server listens on.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.voyage/data".to_string(),
            log_level: "info".to_string(),
            port: 3000,
        }
    }
}

/// Inference gateway settings (OpenAI-compatible chat + embeddings endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Base URL; `/chat/completions` and `/embeddings` are appended.
    pub base_url: String,
    /// Chat model used for summaries, extraction, and streaming answers.
    pub model: String,
    /// Embedding model used to build and query the attraction index.
    pub embedding_model: String,
    /// Vector size returned by `embedding_model`.
    pub embedding_dimensions: usize,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens per call.
    pub max_tokens: u32,
    /// Request timeout in seconds. Applies to every gateway call.
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.5-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimensions: 768,
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

/// Attraction retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory of `*.json` attraction documents.
    pub dataset_dir: String,
    /// Persisted vector index file. Rebuilt from the dataset when missing.
    pub index_path: String,
    /// Candidates requested per trip day.
    pub candidates_per_day: usize,
    /// Maximum number of search queries formulated per itinerary.
    pub max_queries: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dataset_dir: "datasets/attractions".to_string(),
            index_path: "datasets/vector_store.json".to_string(),
            candidates_per_day: 3,
            max_queries: 5,
        }
    }
}

/// Document generation and email dispatch endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizeConfig {
    /// Endpoint accepting `{itinerary, recipientEmail, recipientName}`.
    pub endpoint_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:3001/api/generate-itinerary".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Conversation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum characters in a single turn.
    pub max_message_length: usize,
    /// Maximum turns accepted in one request.
    pub max_turns: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 4000,
            max_turns: 200,
        }
    }
}

/// API authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// File holding the bearer token. Generated on first start when missing.
    pub token_path: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_path: "~/.voyage/api_token".to_string(),
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").ok();
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").ok();
        if let Some(home) = home {
            return std::path::PathBuf::from(home).join(rest);
        }
    }
    std::path::PathBuf::from(path)
}
