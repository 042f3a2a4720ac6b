// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Bearer-key authentication for agent-facing routes.
//!
//! Agents authenticate with `Authorization: Bearer <key>`.  Raw keys are
//! never stored — only their SHA-256 hex digest — so validation hashes the
//! presented key and looks the digest up.  The digest comparison happens
//! inside the database index; the hash itself makes a timing oracle on the
//! raw key useless.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use tracing::warn;

use agentgate_store::GateError;

use crate::{error::ApiError, state::AppState};

/// SHA-256 hex digest of a raw bearer key, as stored in the agent row.
pub fn hash_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
}

/// Axum middleware: resolve the bearer key to an enabled agent row and stash
/// it in the request extensions.
pub async fn bearer_auth_mw(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(key) = extract_bearer(req.headers()) else {
        return ApiError(GateError::Unauthorized("missing bearer key".into())).into_response();
    };
    let agent = match state.store.agent_by_key_hash(&hash_key(key)) {
        Ok(Some(agent)) if agent.enabled => agent,
        Ok(Some(agent)) => {
            warn!(agent = %agent.name, "disabled agent presented a valid key");
            return ApiError(GateError::Unauthorized("agent is disabled".into()))
                .into_response();
        }
        Ok(None) => {
            warn!("unknown bearer key presented");
            return ApiError(GateError::Unauthorized("invalid bearer key".into()))
                .into_response();
        }
        Err(e) => return ApiError(e).into_response(),
    };
    req.extensions_mut().insert(agent);
    next.run(req).await
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;

    use super::{extract_bearer, hash_key};

    #[test]
    fn hash_key_is_deterministic_hex() {
        let h = hash_key("agk_secret");
        assert_eq!(h, hash_key("agk_secret"));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(h, hash_key("agk_other"));
    }

    #[test]
    fn extract_bearer_from_valid_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer my-key-123".parse().unwrap(),
        );
        assert_eq!(extract_bearer(&headers), Some("my-key-123"));
    }

    #[test]
    fn extract_bearer_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Basic dXNlcjpwYXNz".parse().unwrap(),
        );
        assert!(extract_bearer(&headers).is_none());
    }

    #[test]
    fn extract_bearer_missing_header() {
        assert!(extract_bearer(&HeaderMap::new()).is_none());
    }
}
