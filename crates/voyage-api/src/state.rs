//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use voyage_chat::ChatOrchestrator;
use voyage_core::config::VoyageConfig;

/// Shared application state.
///
/// All fields use `Arc` or are cheap to clone, so handlers can clone the
/// state into spawned request tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, read-only after startup.
    pub config: Arc<VoyageConfig>,
    /// Dialogue engine shared by every request.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Bearer token required on protected routes.
    pub api_token: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: VoyageConfig,
        orchestrator: ChatOrchestrator,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            api_token: api_token.into(),
            start_time: Instant::now(),
        }
    }
}
