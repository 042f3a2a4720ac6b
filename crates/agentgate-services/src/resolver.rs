// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use agentgate_store::{AccessMode, GateError, Result, Store};

/// Decides whether an agent may touch a (service, account) pair.
///
/// Policies are stored per pair; the absence of a policy means mode `all`.
/// The per-agent bypass flag is a separate concern — it does not grant
/// access, it only skips the human approval step for agents that already
/// have access.
#[derive(Clone)]
pub struct AccessResolver {
    store: Arc<Store>,
}

impl AccessResolver {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// `Err(Forbidden)` when the policy denies the agent.
    pub fn check(&self, service_db_key: &str, account: &str, agent: &str) -> Result<()> {
        let Some(policy) = self.store.access_policy(service_db_key, account)? else {
            return Ok(());
        };
        let listed = policy
            .agents
            .iter()
            .any(|a| a.eq_ignore_ascii_case(agent));
        let allowed = match policy.mode {
            AccessMode::All => true,
            AccessMode::Allowlist => listed,
            AccessMode::Denylist => !listed,
        };
        if allowed {
            Ok(())
        } else {
            Err(GateError::Forbidden(format!(
                "agent {agent} is not permitted on {service_db_key}/{account}"
            )))
        }
    }

    /// Boolean convenience for service discovery listings.
    pub fn permits(&self, service_db_key: &str, account: &str, agent: &str) -> bool {
        self.check(service_db_key, account, agent).is_ok()
    }

    /// Whether submissions from this agent skip human approval.
    pub fn bypasses_approval(
        &self,
        service_db_key: &str,
        account: &str,
        agent: &str,
    ) -> Result<bool> {
        self.store.bypass_auth(service_db_key, account, agent)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
