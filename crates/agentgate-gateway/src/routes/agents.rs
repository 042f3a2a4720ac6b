// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Agent-plane routes: direct messages, broadcasts, mementos, and service
//! discovery.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use agentgate_config::services;
use agentgate_store::AgentRow;

use crate::{error::ApiResult, state::AppState};

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub to_agent: String,
    pub message: String,
}

/// POST `/api/agents/message`
pub async fn send_message(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Json(body): Json<MessageBody>,
) -> ApiResult<Json<Value>> {
    let receipt = state
        .messages
        .send(&agent, &body.to_agent, &body.message)
        .await?;
    Ok(Json(json!(receipt)))
}

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread: bool,
}

/// GET `/api/agents/messages[?unread=true]`
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Query(query): Query<InboxQuery>,
) -> ApiResult<Json<Value>> {
    let messages = state.messages.inbox(&agent, query.unread)?;
    Ok(Json(json!({ "messages": messages })))
}

/// POST `/api/agents/messages/{id}/read`
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.messages.mark_read(&agent, id)?;
    Ok(Json(json!({ "marked_read": id })))
}

/// GET `/api/agents/status`
pub async fn status(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
) -> ApiResult<Json<Value>> {
    let status = state.messages.status(&agent)?;
    Ok(Json(json!(status)))
}

/// GET `/api/agents/messageable`
pub async fn messageable(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
) -> ApiResult<Json<Value>> {
    let agents: Vec<Value> = state
        .messages
        .messageable(&agent)?
        .iter()
        .map(|a| json!({ "name": a.name, "bio": a.bio }))
        .collect();
    Ok(Json(json!({ "agents": agents })))
}

// ── Broadcasts ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BroadcastBody {
    pub message: String,
}

/// POST `/api/agents/broadcast`
pub async fn broadcast(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Json(body): Json<BroadcastBody>,
) -> ApiResult<Json<Value>> {
    let outcome = state.broadcasts.broadcast(&agent, &body.message).await?;
    Ok(Json(json!(outcome)))
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

/// GET `/api/agents/broadcasts`
pub async fn list_broadcasts(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let broadcasts = state.broadcasts.list(&agent, query.limit.unwrap_or(20))?;
    Ok(Json(json!({ "broadcasts": broadcasts })))
}

/// GET `/api/agents/broadcasts/{id}`
pub async fn get_broadcast(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let (broadcast, recipients) = state.broadcasts.get(&agent, id)?;
    Ok(Json(json!({ "broadcast": broadcast, "recipients": recipients })))
}

// ── Mementos ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MementoBody {
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub model: Option<String>,
    pub role: Option<String>,
}

/// POST `/api/agents/memento`
pub async fn save_memento(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Json(body): Json<MementoBody>,
) -> ApiResult<Json<Value>> {
    let saved = state.mementos.save(
        &agent,
        &body.content,
        &body.keywords,
        body.model.as_deref(),
        body.role.as_deref(),
    )?;
    Ok(Json(json!(saved)))
}

/// GET `/api/agents/memento/keywords`
pub async fn memento_keywords(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
) -> ApiResult<Json<Value>> {
    let keywords: Vec<Value> = state
        .mementos
        .keywords(&agent)?
        .iter()
        .map(|(stem, count)| json!({ "keyword": stem, "count": count }))
        .collect();
    Ok(Json(json!({ "keywords": keywords })))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Comma-separated keywords.
    pub keywords: String,
    pub limit: Option<i64>,
}

/// GET `/api/agents/memento/search?keywords=a,b&limit=10`
pub async fn memento_search(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let keywords: Vec<String> = query
        .keywords
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    let results = state.mementos.search(&agent, &keywords, query.limit)?;
    Ok(Json(json!({ "results": results })))
}

/// GET `/api/agents/memento/recent?limit=10`
pub async fn memento_recent(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let mementos = state.mementos.recent(&agent, query.limit)?;
    Ok(Json(json!({ "mementos": mementos })))
}

/// GET `/api/agents/memento/{ids}` — comma-separated ids, max 20.
pub async fn memento_by_ids(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path(ids): Path<String>,
) -> ApiResult<Json<Value>> {
    let ids: Vec<i64> = ids
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    let mementos = state.mementos.get_by_ids(&agent, &ids)?;
    Ok(Json(json!({ "mementos": mementos })))
}

// ── Service discovery ─────────────────────────────────────────────────────────

/// GET `/api/services` — accounts the calling agent can actually reach.
pub async fn list_services(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
) -> ApiResult<Json<Value>> {
    let pairs = state.store.list_credentials()?;
    let accessible: Vec<Value> = pairs
        .into_iter()
        .filter_map(|(db_key, account)| {
            let def = services().iter().find(|d| d.db_key == db_key)?;
            state
                .resolver
                .permits(def.db_key, &account, &agent.name)
                .then(|| {
                    json!({
                        "service": def.key,
                        "account": account,
                        "category": def.category,
                        "write_capable": def.write_capable,
                    })
                })
        })
        .collect();
    Ok(Json(json!({ "services": accessible })))
}
