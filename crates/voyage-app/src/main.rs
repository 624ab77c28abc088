//! Voyage application binary - composition root.
//!
//! Ties together all Voyage crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Connect the inference gateway (or the offline scripted one)
//! 3. Open the attraction store (index is built or loaded on first use)
//! 4. Start the axum API server, build the index, or act as a client

mod cli;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;

use voyage_api::auth::load_or_generate_token;
use voyage_api::state::AppState;
use voyage_chat::{ChatOrchestrator, HttpDispatcher};
use voyage_core::codec::{EventDispatcher, StreamTranscript};
use voyage_core::config::{expand_home, VoyageConfig};
use voyage_core::events::{EventKind, StreamEvent};
use voyage_inference::{InferenceGateway, OpenAiCompatGateway, ScriptedGateway};
use voyage_vector::{AttractionStore, DynEmbeddingService, MockEmbedding};

use cli::{resolve_port, CliArgs, Command};

type AppResult = Result<(), Box<dyn std::error::Error>>;

/// Model access for one run.
struct Backends {
    gateway: Arc<dyn InferenceGateway>,
    embedder: Arc<dyn DynEmbeddingService>,
    index_path: PathBuf,
}

/// Connect the configured gateway, or the scripted one when offline.
///
/// Offline runs use mock embeddings with their own index snapshot so they
/// never overwrite the real one.
fn backends(config: &VoyageConfig, offline: bool) -> Result<Backends, Box<dyn std::error::Error>> {
    let index_path = expand_home(&config.retrieval.index_path);
    if offline {
        tracing::warn!("Offline mode: replies are echoed and embeddings are mocked");
        return Ok(Backends {
            gateway: Arc::new(ScriptedGateway::offline()),
            embedder: Arc::new(MockEmbedding::new()),
            index_path: offline_index_path(&index_path),
        });
    }

    let gateway = Arc::new(OpenAiCompatGateway::from_config(&config.inference)?);
    tracing::info!(
        base_url = %config.inference.base_url,
        model = %config.inference.model,
        "Inference gateway ready"
    );
    Ok(Backends {
        gateway: gateway.clone(),
        embedder: gateway,
        index_path,
    })
}

fn offline_index_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "vector_store.json".to_string());
    path.with_file_name(format!("offline_{name}"))
}

fn open_store(config: &VoyageConfig, backends: &Backends) -> Arc<AttractionStore> {
    Arc::new(AttractionStore::new(
        expand_home(&config.retrieval.dataset_dir),
        backends.index_path.clone(),
        backends.embedder.clone(),
    ))
}

async fn serve(mut config: VoyageConfig, port: u16, offline: bool) -> AppResult {
    config.general.port = port;

    let backends = backends(&config, offline)?;
    let store = open_store(&config, &backends);
    let dispatcher = Arc::new(HttpDispatcher::from_config(&config.finalize)?);
    let orchestrator = ChatOrchestrator::new(backends.gateway, store, dispatcher, &config);

    let token_path = expand_home(&config.auth.token_path);
    let api_token = load_or_generate_token(&token_path);

    let state = AppState::new(config.clone(), orchestrator, api_token);
    if let Err(e) = voyage_api::start_server(&config, state).await {
        tracing::error!(error = %e, "API server stopped");
        tracing::error!("Try: VOYAGE_PORT={} voyage serve", port.saturating_add(1));
        return Err(e.into());
    }
    Ok(())
}

async fn index(config: VoyageConfig, rebuild: bool, offline: bool) -> AppResult {
    let backends = backends(&config, offline)?;
    let store = open_store(&config, &backends);

    let count = if rebuild {
        store.rebuild().await?
    } else {
        store.index().await?.len()
    };
    tracing::info!(path = %store.index_path().display(), records = count, "Attraction index ready");
    println!("{count} attractions indexed at {}", store.index_path().display());
    Ok(())
}

async fn ask(
    config: VoyageConfig,
    message: String,
    url: Option<String>,
    token: Option<String>,
) -> AppResult {
    let url = url.unwrap_or_else(|| {
        format!("http://127.0.0.1:{}/agent", resolve_port(None, config.general.port))
    });
    let token = match token {
        Some(token) => token,
        None => std::fs::read_to_string(expand_home(&config.auth.token_path))
            .map(|t| t.trim().to_string())
            .map_err(|e| format!("No --token given and the token file is unreadable: {e}"))?,
    };

    let response = reqwest::Client::new()
        .post(&url)
        .bearer_auth(token)
        .json(&serde_json::json!({
            "messages": [{"type": "user", "message": message}]
        }))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("Request failed ({status}): {body}").into());
    }

    let mut dispatcher = EventDispatcher::new();
    dispatcher.on(EventKind::Text, |event| {
        if let StreamEvent::TextDelta(text) = event {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
    });

    let mut transcript = StreamTranscript::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        for event in dispatcher.feed(chunk?) {
            transcript.apply(&event);
        }
    }
    for event in dispatcher.finish() {
        transcript.apply(&event);
    }
    println!();

    if let Some(items) = &transcript.itinerary {
        for item in items {
            println!(
                "{} {:<9} {:>8}  {} ({}, {:.1}/5)",
                item.date, item.day, item.hour, item.attraction_name, item.region, item.rating
            );
        }
    }
    if let Some(conditions) = &transcript.pending_conditions {
        println!("Still needed: {}", conditions.missing_parameters().join(", "));
    }
    if let Some(error) = transcript.error {
        return Err(error.into());
    }
    if !transcript.finished {
        tracing::warn!("Stream closed before the end event");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let config = VoyageConfig::load_or_default(&config_file);

    // RUST_LOG wins over the flag and the config file.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Voyage v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    match args.command {
        Command::Serve { port, offline } => {
            let port = resolve_port(port, config.general.port);
            serve(config, port, offline).await
        }
        Command::Index { rebuild, offline } => index(config, rebuild, offline).await,
        Command::Ask {
            message,
            url,
            token,
        } => ask(config, message, url, token).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_index_path() {
        assert_eq!(
            offline_index_path(Path::new("datasets/vector_store.json")),
            PathBuf::from("datasets/offline_vector_store.json")
        );
    }

    #[test]
    fn test_offline_backends() {
        let config = VoyageConfig::default();
        let backends = backends(&config, true).unwrap();
        assert_eq!(backends.embedder.dimensions(), MockEmbedding::DEFAULT_DIMENSIONS);
        assert!(backends
            .index_path
            .to_string_lossy()
            .ends_with("offline_vector_store.json"));
    }
}
