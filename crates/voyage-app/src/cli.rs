//! CLI argument definitions for the Voyage application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 3000;

/// Voyage - a conversational trip-planning backend.
#[derive(Parser, Debug)]
#[command(name = "voyage", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API server.
    Serve {
        /// API server port.
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,

        /// Use the scripted gateway and mock embeddings instead of the
        /// inference service.
        #[arg(long = "offline")]
        offline: bool,
    },
    /// Build the attraction index, or report on the existing one.
    Index {
        /// Rebuild even if a snapshot exists.
        #[arg(long = "rebuild")]
        rebuild: bool,

        /// Embed with mock embeddings.
        #[arg(long = "offline")]
        offline: bool,
    },
    /// Send one message to a running server and print the streamed reply.
    Ask {
        /// The message to send.
        message: String,

        /// Agent endpoint. Defaults to the local server.
        #[arg(long = "url")]
        url: Option<String>,

        /// Bearer token. Defaults to the token file of the local server.
        #[arg(long = "token")]
        token: Option<String>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > VOYAGE_CONFIG env var > ~/.voyage/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("VOYAGE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Resolve the API server port.
///
/// Priority: --port flag > VOYAGE_PORT env var > config file value > 3000.
pub fn resolve_port(flag: Option<u16>, config_port: u16) -> u16 {
    if let Some(p) = flag {
        return p;
    }
    if let Ok(val) = std::env::var("VOYAGE_PORT") {
        if let Ok(p) = val.parse::<u16>() {
            return p;
        }
    }
    if config_port != 0 {
        return config_port;
    }
    DEFAULT_PORT
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".voyage").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".voyage").join("config.toml");
    }
    PathBuf::from("config.toml")
}
