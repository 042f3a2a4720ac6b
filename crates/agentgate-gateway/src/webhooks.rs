// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Inbound GitHub webhooks.
//!
//! The raw body must survive untouched until the HMAC check: GitHub signs
//! the exact bytes it sends, so the handler takes `Bytes` and only parses
//! JSON after the signature verifies.
//!
//! 1. GitHub sends `X-Hub-Signature-256: sha256=<hmac>` over the raw body.
//! 2. We compute `HMAC-SHA256(secret, body)` and compare in constant time
//!    (`subtle::ConstantTimeEq`).
//! 3. A missing or wrong signature while a secret is configured is a 401.
//! 4. `ping` is acknowledged without fan-out; other events are normalized to
//!    `{service, event: "<type>.<action>", repo, data}`, filtered per the
//!    source's event list, and fanned out to every agent with a webhook.
//!
//! Every delivery decision lands in the webhook log.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::join_all;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use agentgate_notify::NotifyEvent;

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is missing")]
    Missing,
    #[error("signature is malformed")]
    Malformed,
    #[error("HMAC signature does not match")]
    Mismatch,
}

/// Verify `sha256=<hex>` over the raw body in constant time.
pub fn verify_github_signature(
    secret: &[u8],
    body: &[u8],
    provided: Option<&str>,
) -> Result<(), SignatureError> {
    let provided = provided.ok_or(SignatureError::Missing)?;
    let hex_digest = provided
        .strip_prefix("sha256=")
        .ok_or(SignatureError::Malformed)?;

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).map_err(|_| SignatureError::Malformed)?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if expected.as_bytes().ct_eq(hex_digest.as_bytes()).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// POST `/webhooks/github`
pub async fn github(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event_type = header_str(&headers, "x-github-event").unwrap_or("unknown");
    let delivery_id = header_str(&headers, "x-github-delivery");

    let Some(config) = state.settings.webhook_source("github") else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not-found", "message": "webhook source not configured" })),
        )
            .into_response();
    };

    if let Some(secret) = config.secret.as_deref().filter(|s| !s.is_empty()) {
        let signature = header_str(&headers, "x-hub-signature-256");
        if let Err(e) = verify_github_signature(secret.as_bytes(), &body, signature) {
            warn!(error = %e, "github webhook signature rejected");
            let _ = state.store.insert_webhook_log(
                "github",
                event_type,
                delivery_id,
                "rejected",
                Some(&e.to_string()),
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "forbidden", "message": "bad signature" })),
            )
                .into_response();
        }
    }

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    // Ping: acknowledge, log, never fan out.
    if event_type == "ping" {
        let zen = payload.get("zen").and_then(Value::as_str).unwrap_or("");
        let _ = state
            .store
            .insert_webhook_log("github", "ping", delivery_id, "accepted", Some(zen));
        return Json(json!({ "ok": true, "pong": true, "zen": zen })).into_response();
    }

    // Normalize into "<type>.<action>" where the payload has an action.
    let event_name = match payload.get("action").and_then(Value::as_str) {
        Some(action) => format!("{event_type}.{action}"),
        None => event_type.to_string(),
    };
    let repo = payload
        .pointer("/repository/full_name")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if !config.enabled {
        let _ = state.store.insert_webhook_log(
            "github",
            &event_name,
            delivery_id,
            "disabled",
            None,
        );
        return Json(json!({ "ok": true, "filtered": true })).into_response();
    }
    if !config.events.is_empty()
        && !config.events.iter().any(|e| e == &event_name || e == event_type)
    {
        let _ = state.store.insert_webhook_log(
            "github",
            &event_name,
            delivery_id,
            "filtered",
            None,
        );
        return Json(json!({ "ok": true, "filtered": true })).into_response();
    }

    // Fan out to every agent with a webhook, in parallel.
    let agents = match state.store.agents_with_webhooks() {
        Ok(agents) => agents,
        Err(e) => {
            return crate::error::ApiError(e).into_response();
        }
    };
    let normalized = json!({
        "service": "github",
        "event": event_name,
        "repo": repo,
        "data": payload,
    });

    let deliveries = agents.iter().map(|agent| {
        let notifier = state.notifier.clone();
        let event = NotifyEvent::ServiceEvent {
            service: "github".into(),
            event: event_name.clone(),
            data: normalized.clone(),
        };
        let text = format!("github {event_name} on {repo}");
        async move { notifier.notify(agent, event, &text).await.is_delivered() }
    });
    let outcomes = join_all(deliveries).await;
    let delivered = outcomes.iter().filter(|ok| **ok).count();
    let failed = outcomes.len() - delivered;

    info!(event = %event_name, %repo, delivered, failed, "github webhook fanned out");
    let _ = state.store.insert_webhook_log(
        "github",
        &event_name,
        delivery_id,
        "accepted",
        Some(&format!("delivered={delivered} failed={failed}")),
    );

    Json(json!({ "ok": true, "delivered": delivered, "failed": failed })).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
