//! API authentication via bearer tokens, plus the caller identity forwarded
//! by the upstream identity proxy.
//!
//! Protected routes require `Authorization: Bearer <token>`. Once the token
//! checks out, the `x-user-email` and `x-user-name` headers are read into a
//! [`RecipientIdentity`] request extension for the handlers.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;

use voyage_core::types::RecipientIdentity;

use crate::state::AppState;

pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Generate a random 32-character hex token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// Load token from file, or generate and save a new one.
pub fn load_or_generate_token(token_path: &std::path::Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(token_path) {
        let token = contents.trim().to_string();
        if !token.is_empty() {
            tracing::info!("API token loaded from {}", token_path.display());
            return token;
        }
    }

    let token = generate_token();

    if let Some(parent) = token_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(token_path, &token) {
        tracing::warn!(error = %e, "Failed to save API token to {}", token_path.display());
    } else {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(token_path, std::fs::Permissions::from_mode(0o600));
        }
        tracing::info!("API token saved to {}", token_path.display());
    }

    token
}

/// Read the forwarded identity headers. Blank or non-UTF-8 values count as
/// absent.
pub fn identity_from_headers(headers: &HeaderMap) -> RecipientIdentity {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    RecipientIdentity {
        name: read(USER_NAME_HEADER),
        email: read(USER_EMAIL_HEADER),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": message
        })),
    )
        .into_response()
}

/// Middleware that validates Bearer token authentication and attaches the
/// caller's [`RecipientIdentity`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(value) = req.headers().get("authorization") else {
        return unauthorized("Missing Authorization header");
    };
    let Ok(value_str) = value.to_str() else {
        return unauthorized("Invalid Authorization header encoding");
    };

    match value_str.strip_prefix("Bearer ") {
        Some(token) if token == state.api_token => {
            let identity = identity_from_headers(req.headers());
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        _ => unauthorized("Invalid bearer token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_generate_token_is_hex() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_token_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("api_token");

        let first = load_or_generate_token(&path);
        assert!(path.exists());
        assert_eq!(load_or_generate_token(&path), first);
    }

    #[test]
    fn test_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_EMAIL_HEADER, HeaderValue::from_static(" ada@example.com "));
        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("  "));

        let identity = identity_from_headers(&headers);
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
        assert_eq!(identity.name, None);
        assert_eq!(identity_from_headers(&HeaderMap::new()), RecipientIdentity::default());
    }
}
