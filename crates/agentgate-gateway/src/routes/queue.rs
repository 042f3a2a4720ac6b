// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use agentgate_store::{AgentRow, WriteRequest};

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub requests: Vec<WriteRequest>,
    #[serde(default)]
    pub comment: String,
}

/// POST `/api/queue/{service}/{account}/submit`
pub async fn submit(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path((service, account)): Path<(String, String)>,
    Json(body): Json<SubmitBody>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .queue
        .submit(&agent, &service, &account, body.requests, &body.comment)
        .await?;
    Ok(Json(json!(outcome)))
}

/// GET `/api/queue/{service}/{account}/status/{id}`
pub async fn status(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path((service, account, id)): Path<(String, String, String)>,
) -> ApiResult<Json<Value>> {
    let view = state.queue.status(&agent, &service, &account, &id)?;
    Ok(Json(json!(view)))
}

#[derive(Debug, Default, Deserialize)]
pub struct WithdrawBody {
    pub reason: Option<String>,
}

/// DELETE `/api/queue/{service}/{account}/status/{id}` — withdraw.
///
/// The body is optional; an empty or absent body means no reason.
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path((service, account, id)): Path<(String, String, String)>,
    body: Option<Json<WithdrawBody>>,
) -> ApiResult<Json<Value>> {
    let reason = body.and_then(|Json(b)| b.reason);
    let view = state
        .queue
        .withdraw(&agent, &service, &account, &id, reason.as_deref())?;
    Ok(Json(json!(view)))
}

/// GET `/api/queue/list`
pub async fn list_all(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
) -> ApiResult<Json<Value>> {
    let entries = state.queue.list(&agent, None)?;
    Ok(Json(json!({ "entries": entries })))
}

/// GET `/api/queue/{service}/{account}/list`
pub async fn list_scoped(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path((service, account)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let entries = state
        .queue
        .list(&agent, Some((service.as_str(), account.as_str())))?;
    Ok(Json(json!({ "entries": entries })))
}

#[derive(Debug, Deserialize)]
pub struct WarnBody {
    pub message: String,
}

/// POST `/api/queue/{service}/{account}/warn/{id}`
pub async fn warn(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path((_service, _account, id)): Path<(String, String, String)>,
    Json(body): Json<WarnBody>,
) -> ApiResult<Json<Value>> {
    let warning_id = state.queue.warn(&agent, &id, &body.message).await?;
    Ok(Json(json!({ "warning_id": warning_id })))
}

/// GET `/api/queue/{service}/{account}/warnings/{id}`
pub async fn warnings(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path((_service, _account, id)): Path<(String, String, String)>,
) -> ApiResult<Json<Value>> {
    let warnings = state.queue.warnings(&agent, &id)?;
    Ok(Json(json!({ "warnings": warnings })))
}
