// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use agentgate_store::AgentRow;

use crate::{deps::ToolDeps, families::accessible_accounts, tool::{Tool, ToolOutput}};

/// Service discovery: who am I, and which upstream accounts can I reach.
pub struct ServicesTool {
    deps: ToolDeps,
}

impl ServicesTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ServicesAction {
    Whoami,
    List,
    ListDetail,
}

#[async_trait]
impl Tool for ServicesTool {
    fn name(&self) -> &str {
        "services"
    }

    fn description(&self) -> &str {
        "Discover your identity and which third-party services and accounts \
         you can reach through this gateway."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["whoami", "list", "list_detail"]
                }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, agent: &AgentRow, args: Value) -> ToolOutput {
        let action: ServicesAction = match serde_json::from_value(args) {
            Ok(action) => action,
            Err(e) => return ToolOutput::invalid_args(e),
        };
        match action {
            ServicesAction::Whoami => ToolOutput::ok(json!({
                "name": agent.name,
                "bio": agent.bio,
                "enabled": agent.enabled,
                "created_at": agent.created_at,
                "webhook_configured": agent.webhook_url.is_some(),
            })),
            ServicesAction::List => {
                let mut services: Vec<&str> = accessible_accounts(&self.deps, agent)
                    .iter()
                    .map(|(def, _)| def.key)
                    .collect();
                services.sort_unstable();
                services.dedup();
                ToolOutput::ok(json!({ "services": services }))
            }
            ServicesAction::ListDetail => {
                let detail: Vec<Value> = accessible_accounts(&self.deps, agent)
                    .iter()
                    .map(|(def, account)| {
                        json!({
                            "service": def.key,
                            "account": account,
                            "category": def.category,
                            "write_capable": def.write_capable,
                        })
                    })
                    .collect();
                ToolOutput::ok(json!({ "services": detail }))
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ServicesAction;

    #[test]
    fn all_actions_parse() {
        for name in ["whoami", "list", "list_detail"] {
            let parsed: Result<ServicesAction, _> =
                serde_json::from_value(json!({"action": name}));
            assert!(parsed.is_ok(), "{name} must parse");
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let parsed: Result<ServicesAction, _> =
            serde_json::from_value(json!({"action": "delete_everything"}));
        assert!(parsed.is_err());
    }
}
