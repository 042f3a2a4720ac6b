// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use axum::{
    extract::{Path, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};

use agentgate_store::AgentRow;

use crate::{error::ApiResult, state::AppState};

/// GET `/api/{service}/{account}/{path...}` — transparent read passthrough.
///
/// The upstream status and body come back verbatim.  The `X-Agentgate-Raw`
/// header is accepted for compatibility; with response simplifiers out of
/// the gateway's scope every response is raw already.
pub async fn read(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    Path((service, account, path)): Path<(String, String, String)>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    let upstream = state
        .proxy
        .get(&agent.name, &service, &account, &path, query.as_deref())
        .await?;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, upstream.body).into_response();
    if let Some(content_type) = upstream.content_type {
        if let Ok(value) = content_type.parse() {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }
    Ok(response)
}
