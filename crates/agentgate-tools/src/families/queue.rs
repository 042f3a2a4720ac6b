// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use agentgate_store::AgentRow;

use crate::{deps::ToolDeps, tool::{Tool, ToolOutput}};

/// Queue inspection and self-service.  Write submission is deliberately not
/// here — writes go through the per-category tools so the service scope is
/// explicit in the tool name.
pub struct QueueTool {
    deps: ToolDeps,
}

impl QueueTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum QueueAction {
    List {
        service: Option<String>,
        account: Option<String>,
    },
    Status {
        service: String,
        account: String,
        id: String,
    },
    Withdraw {
        service: String,
        account: String,
        id: String,
        reason: Option<String>,
    },
    Warn {
        id: String,
        message: String,
    },
    GetWarnings {
        id: String,
    },
}

#[async_trait]
impl Tool for QueueTool {
    fn name(&self) -> &str {
        "queue"
    }

    fn description(&self) -> &str {
        "Inspect your approval-queue entries: list them, poll status, withdraw \
         your own pending submissions, and flag or review peer warnings. \
         Submitting writes happens through the per-category tools."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list", "status", "withdraw", "warn", "get_warnings"]
                },
                "service": { "type": "string" },
                "account": { "type": "string" },
                "id": { "type": "string", "description": "Queue entry id" },
                "reason": { "type": "string" },
                "message": { "type": "string", "description": "Warning text" }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, agent: &AgentRow, args: Value) -> ToolOutput {
        let action: QueueAction = match serde_json::from_value(args) {
            Ok(action) => action,
            Err(e) => return ToolOutput::invalid_args(e),
        };
        match action {
            QueueAction::List { service, account } => {
                let scope = match (&service, &account) {
                    (Some(s), Some(a)) => Some((s.as_str(), a.as_str())),
                    (None, None) => None,
                    _ => {
                        return ToolOutput::invalid_args(
                            "service and account must be given together",
                        )
                    }
                };
                match self.deps.queue.list(agent, scope) {
                    Ok(entries) => ToolOutput::ok(json!({ "entries": entries })),
                    Err(e) => ToolOutput::err(&e),
                }
            }
            QueueAction::Status {
                service,
                account,
                id,
            } => match self.deps.queue.status(agent, &service, &account, &id) {
                Ok(view) => ToolOutput::ok(json!(view)),
                Err(e) => ToolOutput::err(&e),
            },
            QueueAction::Withdraw {
                service,
                account,
                id,
                reason,
            } => match self
                .deps
                .queue
                .withdraw(agent, &service, &account, &id, reason.as_deref())
            {
                Ok(view) => ToolOutput::ok(json!(view)),
                Err(e) => ToolOutput::err(&e),
            },
            QueueAction::Warn { id, message } => {
                match self.deps.queue.warn(agent, &id, &message).await {
                    Ok(warning_id) => ToolOutput::ok(json!({ "warning_id": warning_id })),
                    Err(e) => ToolOutput::err(&e),
                }
            }
            QueueAction::GetWarnings { id } => match self.deps.queue.warnings(agent, &id) {
                Ok(warnings) => ToolOutput::ok(json!({ "warnings": warnings })),
                Err(e) => ToolOutput::err(&e),
            },
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
