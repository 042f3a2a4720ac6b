// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use agentgate_store::AgentRow;

use crate::{deps::ToolDeps, tool::{Tool, ToolOutput}};

pub struct MessagesTool {
    deps: ToolDeps,
}

impl MessagesTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum MessagesAction {
    Send {
        to_agent: String,
        message: String,
    },
    Get {
        #[serde(default)]
        unread: bool,
    },
    MarkRead {
        id: i64,
    },
    ListAgents,
    Status,
    Broadcast {
        message: String,
    },
    ListBroadcasts {
        limit: Option<i64>,
    },
    GetBroadcast {
        id: i64,
    },
}

#[async_trait]
impl Tool for MessagesTool {
    fn name(&self) -> &str {
        "messages"
    }

    fn description(&self) -> &str {
        "Direct messages and broadcasts between agents on this gateway. \
         Depending on the messaging mode, sends may require human approval \
         before they are delivered."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["send", "get", "mark_read", "list_agents", "status",
                             "broadcast", "list_broadcasts", "get_broadcast"]
                },
                "to_agent": { "type": "string" },
                "message": { "type": "string", "description": "Body, max 10 KiB" },
                "unread": { "type": "boolean" },
                "id": { "type": "integer" },
                "limit": { "type": "integer" }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, agent: &AgentRow, args: Value) -> ToolOutput {
        let action: MessagesAction = match serde_json::from_value(args) {
            Ok(action) => action,
            Err(e) => return ToolOutput::invalid_args(e),
        };
        match action {
            MessagesAction::Send { to_agent, message } => {
                match self.deps.messages.send(agent, &to_agent, &message).await {
                    Ok(receipt) => ToolOutput::ok(json!(receipt)),
                    Err(e) => ToolOutput::err(&e),
                }
            }
            MessagesAction::Get { unread } => match self.deps.messages.inbox(agent, unread) {
                Ok(messages) => ToolOutput::ok(json!({ "messages": messages })),
                Err(e) => ToolOutput::err(&e),
            },
            MessagesAction::MarkRead { id } => match self.deps.messages.mark_read(agent, id) {
                Ok(()) => ToolOutput::ok(json!({ "marked_read": id })),
                Err(e) => ToolOutput::err(&e),
            },
            MessagesAction::ListAgents => match self.deps.messages.messageable(agent) {
                Ok(agents) => {
                    let list: Vec<Value> = agents
                        .iter()
                        .map(|a| json!({ "name": a.name, "bio": a.bio }))
                        .collect();
                    ToolOutput::ok(json!({ "agents": list }))
                }
                Err(e) => ToolOutput::err(&e),
            },
            MessagesAction::Status => match self.deps.messages.status(agent) {
                Ok(status) => ToolOutput::ok(json!(status)),
                Err(e) => ToolOutput::err(&e),
            },
            MessagesAction::Broadcast { message } => {
                match self.deps.broadcasts.broadcast(agent, &message).await {
                    Ok(outcome) => ToolOutput::ok(json!(outcome)),
                    Err(e) => ToolOutput::err(&e),
                }
            }
            MessagesAction::ListBroadcasts { limit } => {
                match self.deps.broadcasts.list(agent, limit.unwrap_or(20)) {
                    Ok(list) => ToolOutput::ok(json!({ "broadcasts": list })),
                    Err(e) => ToolOutput::err(&e),
                }
            }
            MessagesAction::GetBroadcast { id } => match self.deps.broadcasts.get(agent, id) {
                Ok((broadcast, recipients)) => ToolOutput::ok(json!({
                    "broadcast": broadcast,
                    "recipients": recipients,
                })),
                Err(e) => ToolOutput::err(&e),
            },
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::MessagesAction;

    #[test]
    fn send_requires_recipient_and_body() {
        let ok: MessagesAction = serde_json::from_value(
            json!({"action": "send", "to_agent": "bob", "message": "hi"}),
        )
        .unwrap();
        assert!(matches!(ok, MessagesAction::Send { .. }));

        let missing: Result<MessagesAction, _> =
            serde_json::from_value(json!({"action": "send", "to_agent": "bob"}));
        assert!(missing.is_err());
    }

    #[test]
    fn get_unread_defaults_to_false() {
        let action: MessagesAction = serde_json::from_value(json!({"action": "get"})).unwrap();
        assert!(matches!(action, MessagesAction::Get { unread: false }));
    }

    #[test]
    fn bare_actions_parse() {
        for name in ["list_agents", "status"] {
            let parsed: Result<MessagesAction, _> =
                serde_json::from_value(json!({"action": name}));
            assert!(parsed.is_ok(), "{name} must parse without extra fields");
        }
    }
}
