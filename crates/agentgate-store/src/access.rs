// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::{params, OptionalExtension};

use crate::{AccessMode, AccessPolicyRow, GateError, Result, Store};

impl Store {
    /// Policy for (service, account); `None` means no explicit policy, which
    /// the resolver treats as mode `all`.
    pub fn access_policy(
        &self,
        service: &str,
        account_name: &str,
    ) -> Result<Option<AccessPolicyRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT mode, agents FROM access_policies
                 WHERE service = ?1 AND account_name = ?2",
                params![service, account_name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        match row {
            Some((mode, agents)) => {
                let mode = AccessMode::parse(&mode).ok_or_else(|| {
                    GateError::Internal(format!("corrupt access mode: {mode}"))
                })?;
                Ok(Some(AccessPolicyRow {
                    service: service.to_string(),
                    account_name: account_name.to_string(),
                    mode,
                    agents: serde_json::from_str(&agents)?,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn set_access_policy(
        &self,
        service: &str,
        account_name: &str,
        mode: AccessMode,
        agents: &[String],
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO access_policies (service, account_name, mode, agents)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                service,
                account_name,
                mode.as_str(),
                serde_json::to_string(agents)?
            ],
        )?;
        Ok(())
    }

    /// Per-(service, account, agent) queue bypass flag.
    pub fn bypass_auth(&self, service: &str, account_name: &str, agent_name: &str) -> Result<bool> {
        let conn = self.lock();
        let flag = conn
            .query_row(
                "SELECT bypass_auth FROM agent_bypass
                 WHERE service = ?1 AND account_name = ?2 AND agent_name = ?3",
                params![service, account_name, agent_name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(0) != 0)
    }

    pub fn set_bypass_auth(
        &self,
        service: &str,
        account_name: &str,
        agent_name: &str,
        bypass: bool,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO agent_bypass (service, account_name, agent_name, bypass_auth)
             VALUES (?1, ?2, ?3, ?4)",
            params![service, account_name, agent_name, bypass as i64],
        )?;
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::{AccessMode, Store};

    #[test]
    fn missing_policy_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.access_policy("github", "personal").unwrap().is_none());
    }

    #[test]
    fn set_and_read_allowlist() {
        let store = Store::open_in_memory().unwrap();
        store
            .set_access_policy(
                "github",
                "personal",
                AccessMode::Allowlist,
                &["alice".into(), "bob".into()],
            )
            .unwrap();
        let policy = store.access_policy("github", "personal").unwrap().unwrap();
        assert_eq!(policy.mode, AccessMode::Allowlist);
        assert_eq!(policy.agents, vec!["alice", "bob"]);
    }

    #[test]
    fn bypass_defaults_to_false() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.bypass_auth("bluesky", "alice", "bot").unwrap());
    }

    #[test]
    fn bypass_set_and_clear() {
        let store = Store::open_in_memory().unwrap();
        store.set_bypass_auth("bluesky", "alice", "bot", true).unwrap();
        assert!(store.bypass_auth("bluesky", "alice", "bot").unwrap());
        store.set_bypass_auth("bluesky", "alice", "bot", false).unwrap();
        assert!(!store.bypass_auth("bluesky", "alice", "bot").unwrap());
    }

    #[test]
    fn bypass_is_case_insensitive_on_agent_name() {
        let store = Store::open_in_memory().unwrap();
        store.set_bypass_auth("bluesky", "alice", "Bot", true).unwrap();
        assert!(store.bypass_auth("bluesky", "alice", "bot").unwrap());
    }
}
