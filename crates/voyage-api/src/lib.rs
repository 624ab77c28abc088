//! Voyage API crate - axum HTTP server, route handlers, SSE streaming.
//!
//! Exposes the dialogue engine as `POST /agent`, which answers with a
//! `text/event-stream` of progress events, plus an unauthenticated
//! `GET /health`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
