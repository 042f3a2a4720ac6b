// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use agentgate_store::{AgentRow, GateError};

use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema as advertised to session clients.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Per-session registry.  Built once when the session opens (or is lazily
/// reconstructed) from the agent's accessible services; immutable afterwards.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schemas for all registered tools, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn execute(&self, agent: &AgentRow, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(agent, call.args.clone()).await,
            None => ToolOutput::err(&GateError::NotFound(format!(
                "unknown tool: {}",
                call.name
            ))),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use agentgate_store::AgentRow;

    use super::*;

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its arguments"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, _agent: &AgentRow, args: Value) -> ToolOutput {
            ToolOutput::ok(json!({ "echo": args }))
        }
    }

    fn test_agent() -> AgentRow {
        AgentRow {
            id: 1,
            name: "alice".into(),
            key_hash: String::new(),
            key_prefix: String::new(),
            bio: None,
            webhook_url: None,
            webhook_token: None,
            enabled: true,
            raw_results: false,
            created_at: "2026-01-01 00:00:00".into(),
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn schemas_are_sorted_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "zulu" });
        reg.register(EchoTool { name: "alpha" });
        let schemas = reg.schemas();
        assert_eq!(schemas[0].name, "alpha");
        assert_eq!(schemas[1].name, "zulu");
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_not_found() {
        let reg = ToolRegistry::new();
        let out = reg
            .execute(
                &test_agent(),
                &ToolCall {
                    name: "missing".into(),
                    args: json!({}),
                },
            )
            .await;
        assert!(out.is_error);
        assert_eq!(out.content["error"]["error"], "not-found");
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let out = reg
            .execute(
                &test_agent(),
                &ToolCall {
                    name: "echo".into(),
                    args: json!({"x": 1}),
                },
            )
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content["echo"]["x"], 1);
    }
}
