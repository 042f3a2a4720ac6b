// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Route table assembly.
//!
//! Static prefixes (`/api/queue`, `/api/agents`, `/api/services`) win over
//! the parameterized read-proxy route, so the proxy only ever sees real
//! service keys.

mod agents;
mod proxy;
mod queue;

use axum::{
    middleware,
    routing::{any, get, post},
    Json, Router,
};

use crate::{auth, mcp, state::AppState, webhooks};

pub fn router(state: AppState) -> Router {
    // Everything under /api and /mcp requires a valid agent bearer key.
    let authed = Router::new()
        // ── Queue ────────────────────────────────────────────────────────────
        .route("/api/queue/list", get(queue::list_all))
        .route("/api/queue/:service/:account/submit", post(queue::submit))
        .route(
            "/api/queue/:service/:account/status/:id",
            get(queue::status).delete(queue::withdraw),
        )
        .route("/api/queue/:service/:account/list", get(queue::list_scoped))
        .route("/api/queue/:service/:account/warn/:id", post(queue::warn))
        .route(
            "/api/queue/:service/:account/warnings/:id",
            get(queue::warnings),
        )
        // ── Messaging / mementos / discovery ─────────────────────────────────
        .route("/api/agents/message", post(agents::send_message))
        .route("/api/agents/messages", get(agents::list_messages))
        .route("/api/agents/messages/:id/read", post(agents::mark_read))
        .route("/api/agents/status", get(agents::status))
        .route("/api/agents/messageable", get(agents::messageable))
        .route("/api/agents/broadcast", post(agents::broadcast))
        .route("/api/agents/broadcasts", get(agents::list_broadcasts))
        .route("/api/agents/broadcasts/:id", get(agents::get_broadcast))
        .route("/api/agents/memento", post(agents::save_memento))
        .route("/api/agents/memento/keywords", get(agents::memento_keywords))
        .route("/api/agents/memento/search", get(agents::memento_search))
        .route("/api/agents/memento/recent", get(agents::memento_recent))
        .route("/api/agents/memento/:ids", get(agents::memento_by_ids))
        .route("/api/services", get(agents::list_services))
        // ── Read proxy (GET only; other methods get 405 from axum) ───────────
        .route("/api/:service/:account/*path", get(proxy::read))
        // ── Tool sessions ────────────────────────────────────────────────────
        .route("/mcp", any(mcp::endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::bearer_auth_mw,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhooks/github", post(webhooks::github))
        .merge(authed)
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
