// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The tool-dispatch endpoint: MCP streamable-HTTP on a single path.
//!
//! - `POST` carries JSON-RPC messages (`initialize`, `ping`, `tools/list`,
//!   `tools/call`, notifications).
//! - `GET` opens the server→client notification stream (SSE).
//! - `DELETE` terminates the session.
//!
//! The session id travels in the `Mcp-Session-Id` header.  `initialize`
//! opens a fresh session and returns the id in the response header; every
//! other message must present a valid id, which the session manager resolves
//! — lazily reconstructing the in-memory half after a restart.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use agentgate_store::{AgentRow, GateError};
use agentgate_tools::ToolCall;

use crate::{error::ApiError, state::AppState};

pub const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Entry point for every method on the session path.
pub async fn endpoint(
    State(state): State<AppState>,
    Extension(agent): Extension<AgentRow>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match method {
        Method::POST => post_message(state, agent, session_id, body).await,
        Method::GET => open_stream(state, agent, session_id).await,
        Method::DELETE => terminate(state, agent, session_id).await,
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn post_message(
    state: AppState,
    agent: AgentRow,
    session_id: Option<String>,
    body: Bytes,
) -> Response {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return rpc_error(None, -32700, &format!("parse error: {e}")).into_response();
        }
    };
    debug!(method = %request.method, agent = %agent.name, "session message");

    // initialize opens a session; everything else resolves one.
    if request.method == "initialize" {
        let entry = match state.sessions.initialize(&agent).await {
            Ok(entry) => entry,
            Err(e) => return ApiError(e).into_response(),
        };
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "agentgate", "version": env!("CARGO_PKG_VERSION") },
        });
        let mut response = rpc_result(request.id, result).into_response();
        if let Ok(value) = entry.session_id.parse() {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
        return response;
    }

    let Some(session_id) = session_id else {
        return ApiError(GateError::BadRequest(
            "Mcp-Session-Id header is required".into(),
        ))
        .into_response();
    };
    let entry = match state.sessions.resume(&session_id, &agent).await {
        Ok(entry) => entry,
        Err(e) => return ApiError(e).into_response(),
    };

    // Notifications carry no id and expect no body.
    if request.method.starts_with("notifications/") {
        return StatusCode::ACCEPTED.into_response();
    }

    match request.method.as_str() {
        "ping" => rpc_result(request.id, json!({})).into_response(),
        "tools/list" => {
            let tools: Vec<Value> = entry
                .schemas()
                .into_iter()
                .map(|schema| {
                    json!({
                        "name": schema.name,
                        "description": schema.description,
                        "inputSchema": schema.parameters,
                    })
                })
                .collect();
            rpc_result(request.id, json!({ "tools": tools })).into_response()
        }
        "tools/call" => {
            let name = request
                .params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if name.is_empty() {
                return rpc_error(request.id, -32602, "tools/call requires a name")
                    .into_response();
            }
            let args = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let output = state
                .sessions
                .dispatch(&entry, &ToolCall { name, args })
                .await;
            if output.is_error {
                // Mirror the failure onto the notification stream so clients
                // watching the GET side see it without polling.
                entry.push_event(json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/message",
                    "params": {
                        "level": "error",
                        "logger": "agentgate",
                        "data": output.content.clone(),
                    },
                }));
            }
            let text = serde_json::to_string_pretty(&output.content)
                .unwrap_or_else(|_| output.content.to_string());
            rpc_result(
                request.id,
                json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": output.is_error,
                }),
            )
            .into_response()
        }
        other => rpc_error(request.id, -32601, &format!("method not found: {other}"))
            .into_response(),
    }
}

/// GET — attach an SSE notification stream to the session.
///
/// Only the broadcast receiver is held by the stream; when the session is
/// killed the sender drops and the stream terminates.
async fn open_stream(
    state: AppState,
    agent: AgentRow,
    session_id: Option<String>,
) -> Response {
    let Some(session_id) = session_id else {
        return ApiError(GateError::BadRequest(
            "Mcp-Session-Id header is required".into(),
        ))
        .into_response();
    };
    let receiver = match state.sessions.resume(&session_id, &agent).await {
        Ok(entry) => entry.subscribe(),
        Err(e) => return ApiError(e).into_response(),
    };

    let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(value) => Some(Ok::<_, std::convert::Infallible>(
                Event::default().event("message").data(value.to_string()),
            )),
            // Lagged receivers skip what they missed; closed ends the stream.
            Err(_) => None,
        }
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// DELETE — terminate the session (memory + row).
async fn terminate(state: AppState, agent: AgentRow, session_id: Option<String>) -> Response {
    let Some(session_id) = session_id else {
        return ApiError(GateError::BadRequest(
            "Mcp-Session-Id header is required".into(),
        ))
        .into_response();
    };
    // Resolving first guarantees the caller owns the session.
    if let Err(e) = state.sessions.resume(&session_id, &agent).await {
        return ApiError(e).into_response();
    }
    match state.sessions.kill(&session_id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

fn rpc_result(id: Option<Value>, result: Value) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "result": result,
    }))
}

fn rpc_error(id: Option<Value>, code: i64, message: &str) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "error": { "code": code, "message": message },
    }))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use axum::Json;
    use serde_json::json;

    use super::{rpc_error, rpc_result, RpcRequest};

    #[test]
    fn rpc_request_parses_with_and_without_params() {
        let req: RpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/list"
        }))
        .unwrap();
        assert_eq!(req.method, "tools/list");
        assert!(req.params.is_null());

        let req: RpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": {"name": "queue", "arguments": {"action": "list"}}
        }))
        .unwrap();
        assert_eq!(req.params["name"], "queue");
    }

    #[test]
    fn rpc_result_echoes_id() {
        let Json(body) = rpc_result(Some(json!(7)), json!({"ok": true}));
        assert_eq!(body["id"], 7);
        assert_eq!(body["result"]["ok"], true);
        assert!(body.get("error").is_none());
    }

    #[test]
    fn rpc_error_carries_code() {
        let Json(body) = rpc_error(None, -32601, "nope");
        assert_eq!(body["error"]["code"], -32601);
        assert!(body["id"].is_null());
    }
}
