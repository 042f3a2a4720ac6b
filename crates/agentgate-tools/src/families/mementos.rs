// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use agentgate_store::AgentRow;

use crate::{deps::ToolDeps, tool::{Tool, ToolOutput}};

pub struct MementosTool {
    deps: ToolDeps,
}

impl MementosTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum MementosAction {
    Save {
        content: String,
        #[serde(default)]
        keywords: Vec<String>,
        model: Option<String>,
        role: Option<String>,
    },
    Search {
        keywords: Vec<String>,
        limit: Option<i64>,
    },
    Keywords,
    Recent {
        limit: Option<i64>,
    },
    GetByIds {
        ids: Vec<i64>,
    },
}

#[async_trait]
impl Tool for MementosTool {
    fn name(&self) -> &str {
        "mementos"
    }

    fn description(&self) -> &str {
        "Your private keyword-indexed note store. Notes survive restarts and \
         are only visible to you. Keywords are stemmed, so searching 'games' \
         finds notes tagged 'game' or 'gaming'. Content max 12 KiB, up to 10 \
         keywords per note."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["save", "search", "keywords", "recent", "get_by_ids"]
                },
                "content": { "type": "string" },
                "keywords": { "type": "array", "items": { "type": "string" }, "maxItems": 10 },
                "model": { "type": "string" },
                "role": { "type": "string" },
                "limit": { "type": "integer" },
                "ids": { "type": "array", "items": { "type": "integer" }, "maxItems": 20 }
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, agent: &AgentRow, args: Value) -> ToolOutput {
        let action: MementosAction = match serde_json::from_value(args) {
            Ok(action) => action,
            Err(e) => return ToolOutput::invalid_args(e),
        };
        match action {
            MementosAction::Save {
                content,
                keywords,
                model,
                role,
            } => match self.deps.mementos.save(
                agent,
                &content,
                &keywords,
                model.as_deref(),
                role.as_deref(),
            ) {
                Ok(saved) => ToolOutput::ok(json!(saved)),
                Err(e) => ToolOutput::err(&e),
            },
            MementosAction::Search { keywords, limit } => {
                match self.deps.mementos.search(agent, &keywords, limit) {
                    Ok(hits) => ToolOutput::ok(json!({ "results": hits })),
                    Err(e) => ToolOutput::err(&e),
                }
            }
            MementosAction::Keywords => match self.deps.mementos.keywords(agent) {
                Ok(keywords) => {
                    let list: Vec<Value> = keywords
                        .iter()
                        .map(|(stem, count)| json!({ "keyword": stem, "count": count }))
                        .collect();
                    ToolOutput::ok(json!({ "keywords": list }))
                }
                Err(e) => ToolOutput::err(&e),
            },
            MementosAction::Recent { limit } => match self.deps.mementos.recent(agent, limit) {
                Ok(hits) => ToolOutput::ok(json!({ "mementos": hits })),
                Err(e) => ToolOutput::err(&e),
            },
            MementosAction::GetByIds { ids } => {
                match self.deps.mementos.get_by_ids(agent, &ids) {
                    Ok(rows) => ToolOutput::ok(json!({ "mementos": rows })),
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

    use super::MementosAction;

    #[test]
    fn save_parses_with_optional_fields() {
        let action: MementosAction = serde_json::from_value(json!({
            "action": "save",
            "content": "snake game notes",
            "keywords": ["game", "snake"],
        }))
        .unwrap();
        match action {
            MementosAction::Save { model, role, keywords, .. } => {
                assert!(model.is_none() && role.is_none());
                assert_eq!(keywords.len(), 2);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn search_requires_keywords() {
        let err: Result<MementosAction, _> =
            serde_json::from_value(json!({"action": "search"}));
        assert!(err.is_err());
    }

    #[test]
    fn get_by_ids_requires_ids() {
        let err: Result<MementosAction, _> =
            serde_json::from_value(json!({"action": "get_by_ids"}));
        assert!(err.is_err());
    }
}
