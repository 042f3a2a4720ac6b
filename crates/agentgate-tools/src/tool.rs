// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use agentgate_store::{AgentRow, GateError};

/// A single tool invocation requested by a session client.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// The result of executing a tool.
///
/// `content` is the JSON payload handed back to the client.  Errors carry
/// the gateway error shape wrapped with a `via` marker so tool clients can
/// tell gateway errors apart from upstream content.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: Value,
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful result.
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Error result in the gateway's wire error shape.
    pub fn err(err: &GateError) -> Self {
        Self {
            content: json!({
                "via": "agentgate",
                "error": { "error": err.kind(), "message": err.to_string() },
            }),
            is_error: true,
        }
    }

    /// Bad-request shortcut for argument validation failures.
    pub fn invalid_args(detail: impl std::fmt::Display) -> Self {
        Self::err(&GateError::BadRequest(format!("invalid arguments: {detail}")))
    }
}

/// Trait every tool family implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Execute on behalf of the bound (and already re-validated) agent.
    /// Errors are wrapped in [`ToolOutput::err`], never raised.
    async fn execute(&self, agent: &AgentRow, args: Value) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
