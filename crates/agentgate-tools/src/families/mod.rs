// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The tool families and the per-session registry builder.

mod category;
mod mementos;
mod messages;
mod queue;
mod services;

use std::collections::BTreeSet;

use agentgate_config::{services as registry_services, ServiceCategory, ServiceDef};
use agentgate_store::AgentRow;

use crate::{deps::ToolDeps, registry::ToolRegistry};

/// (service definition, account) pairs the agent may reach right now.
pub(crate) fn accessible_accounts(
    deps: &ToolDeps,
    agent: &AgentRow,
) -> Vec<(&'static ServiceDef, String)> {
    let Ok(pairs) = deps.store.list_credentials() else {
        return Vec::new();
    };
    pairs
        .into_iter()
        .filter_map(|(db_key, account)| {
            let def = registry_services().iter().find(|d| d.db_key == db_key)?;
            deps.resolver
                .permits(def.db_key, &account, &agent.name)
                .then_some((def, account))
        })
        .collect()
}

/// Build the session's tool registry: the four fixed families plus one
/// category tool per category with at least one accessible account.
pub fn build_registry(deps: &ToolDeps, agent: &AgentRow) -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(queue::QueueTool::new(deps.clone()));
    reg.register(messages::MessagesTool::new(deps.clone()));
    reg.register(mementos::MementosTool::new(deps.clone()));
    reg.register(services::ServicesTool::new(deps.clone()));

    let categories: BTreeSet<ServiceCategory> = accessible_accounts(deps, agent)
        .into_iter()
        .map(|(def, _)| def.category)
        .collect();
    for category in categories {
        reg.register(category::CategoryTool::new(deps.clone(), category));
    }
    reg
}
