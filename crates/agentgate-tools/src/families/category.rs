// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Per-category service tools (`code`, `social`, `personal`, `search`).
//!
//! One instance is registered per category the session's agent can reach.
//! `read` proxies a GET through the credential vault; `write` routes a batch
//! into the approval queue.  The search category is read-only.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use agentgate_config::{service, ServiceCategory};
use agentgate_store::{AgentRow, GateError, WriteRequest};

use crate::{deps::ToolDeps, tool::{Tool, ToolOutput}};

pub struct CategoryTool {
    deps: ToolDeps,
    category: ServiceCategory,
}

impl CategoryTool {
    pub fn new(deps: ToolDeps, category: ServiceCategory) -> Self {
        Self { deps, category }
    }

    fn writable(&self) -> bool {
        self.category != ServiceCategory::Search
    }

    /// The named service must exist and belong to this tool's category.
    fn category_service(&self, key: &str) -> Result<&'static agentgate_config::ServiceDef, GateError> {
        let def = service(key)
            .ok_or_else(|| GateError::NotFound(format!("unknown service: {key}")))?;
        if def.category != self.category {
            return Err(GateError::Forbidden(format!(
                "service {key} does not belong to the {} category",
                self.category.as_str()
            )));
        }
        Ok(def)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum CategoryAction {
    Read {
        service: String,
        account: String,
        path: String,
        query: Option<String>,
    },
    Write {
        service: String,
        account: String,
        requests: Vec<WriteRequest>,
        comment: String,
    },
}

#[async_trait]
impl Tool for CategoryTool {
    fn name(&self) -> &str {
        self.category.as_str()
    }

    fn description(&self) -> &str {
        match self.category {
            ServiceCategory::Code => {
                "Read from your code-hosting services (github, jira). Writes \
                 are queued for human approval with a mandatory comment."
            }
            ServiceCategory::Social => {
                "Read from your social accounts (bluesky, reddit, mastodon, \
                 youtube, linkedin). Writes are queued for human approval \
                 with a mandatory comment."
            }
            ServiceCategory::Personal => {
                "Read from your personal-data services (calendar, fitbit). \
                 Writes are queued for human approval with a mandatory \
                 comment."
            }
            ServiceCategory::Search => {
                "Query your configured search providers (brave, \
                 google_search). Read-only."
            }
        }
    }

    fn parameters_schema(&self) -> Value {
        let actions = if self.writable() {
            json!(["read", "write"])
        } else {
            json!(["read"])
        };
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": actions },
                "service": { "type": "string" },
                "account": { "type": "string" },
                "path": { "type": "string", "description": "Upstream path, e.g. /repos/o/r/issues" },
                "query": { "type": "string", "description": "Raw query string without the leading ?" },
                "requests": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "method": { "type": "string", "enum": ["POST", "PUT", "PATCH", "DELETE"] },
                            "path": { "type": "string" },
                            "body": {},
                            "headers": { "type": "object" },
                            "binaryBase64": { "type": "boolean" }
                        },
                        "required": ["method", "path"]
                    }
                },
                "comment": { "type": "string", "description": "Why this write should be approved" }
            },
            "required": ["action", "service", "account"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, agent: &AgentRow, args: Value) -> ToolOutput {
        let action: CategoryAction = match serde_json::from_value(args) {
            Ok(action) => action,
            Err(e) => return ToolOutput::invalid_args(e),
        };
        match action {
            CategoryAction::Read {
                service: service_key,
                account,
                path,
                query,
            } => {
                if let Err(e) = self.category_service(&service_key) {
                    return ToolOutput::err(&e);
                }
                match self
                    .deps
                    .proxy
                    .get(&agent.name, &service_key, &account, &path, query.as_deref())
                    .await
                {
                    Ok(resp) => {
                        let body = serde_json::from_slice::<Value>(&resp.body)
                            .unwrap_or_else(|_| {
                                Value::String(String::from_utf8_lossy(&resp.body).into_owned())
                            });
                        ToolOutput::ok(json!({ "status": resp.status, "body": body }))
                    }
                    Err(e) => ToolOutput::err(&e),
                }
            }
            CategoryAction::Write {
                service: service_key,
                account,
                requests,
                comment,
            } => {
                if !self.writable() {
                    return ToolOutput::err(&GateError::Forbidden(
                        "the search category is read-only".into(),
                    ));
                }
                if let Err(e) = self.category_service(&service_key) {
                    return ToolOutput::err(&e);
                }
                match self
                    .deps
                    .queue
                    .submit(agent, &service_key, &account, requests, &comment)
                    .await
                {
                    Ok(outcome) => ToolOutput::ok(json!(outcome)),
                    Err(e) => ToolOutput::err(&e),
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::CategoryAction;

    #[test]
    fn read_action_parses() {
        let action: CategoryAction = serde_json::from_value(json!({
            "action": "read",
            "service": "github",
            "account": "personal",
            "path": "/user/repos",
        }))
        .unwrap();
        assert!(matches!(action, CategoryAction::Read { query: None, .. }));
    }

    #[test]
    fn write_action_parses_requests() {
        let action: CategoryAction = serde_json::from_value(json!({
            "action": "write",
            "service": "github",
            "account": "personal",
            "comment": "create issue",
            "requests": [{"method": "POST", "path": "/repos/o/r/issues", "body": {"title": "T"}}],
        }))
        .unwrap();
        match action {
            CategoryAction::Write { requests, .. } => assert_eq!(requests.len(), 1),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn write_without_comment_fails_to_parse() {
        let parsed: Result<CategoryAction, _> = serde_json::from_value(json!({
            "action": "write",
            "service": "github",
            "account": "personal",
            "requests": [],
        }));
        assert!(parsed.is_err());
    }
}
