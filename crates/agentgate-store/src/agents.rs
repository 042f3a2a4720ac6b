// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::{params, OptionalExtension, Row};

use crate::{now_ts, AgentRow, GateError, NewAgent, Result, Store};

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<AgentRow> {
    Ok(AgentRow {
        id: row.get(0)?,
        name: row.get(1)?,
        key_hash: row.get(2)?,
        key_prefix: row.get(3)?,
        bio: row.get(4)?,
        webhook_url: row.get(5)?,
        webhook_token: row.get(6)?,
        enabled: row.get::<_, i64>(7)? != 0,
        raw_results: row.get::<_, i64>(8)? != 0,
        created_at: row.get(9)?,
    })
}

const AGENT_COLS: &str =
    "id, name, key_hash, key_prefix, bio, webhook_url, webhook_token, enabled, raw_results, created_at";

impl Store {
    pub fn insert_agent(&self, agent: NewAgent) -> Result<AgentRow> {
        let conn = self.lock();
        let created_at = now_ts();
        conn.execute(
            "INSERT INTO agents (name, key_hash, key_prefix, bio, webhook_url, webhook_token, enabled, raw_results, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, ?7)",
            params![
                agent.name,
                agent.key_hash,
                agent.key_prefix,
                agent.bio,
                agent.webhook_url,
                agent.webhook_token,
                created_at
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                GateError::BadRequest(format!("agent name already exists: {}", agent.name))
            }
            other => other.into(),
        })?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.agent_by_id(id)?
            .ok_or_else(|| GateError::Internal("inserted agent vanished".into()))
    }

    pub fn agent_by_id(&self, id: i64) -> Result<Option<AgentRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {AGENT_COLS} FROM agents WHERE id = ?1"),
                params![id],
                row_to_agent,
            )
            .optional()?;
        Ok(row)
    }

    /// Case-insensitive name lookup (name column is COLLATE NOCASE).
    pub fn agent_by_name(&self, name: &str) -> Result<Option<AgentRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {AGENT_COLS} FROM agents WHERE name = ?1"),
                params![name],
                row_to_agent,
            )
            .optional()?;
        Ok(row)
    }

    pub fn agent_by_key_hash(&self, key_hash: &str) -> Result<Option<AgentRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {AGENT_COLS} FROM agents WHERE key_hash = ?1"),
                params![key_hash],
                row_to_agent,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_agents(&self) -> Result<Vec<AgentRow>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {AGENT_COLS} FROM agents ORDER BY name"))?;
        let rows = stmt
            .query_map([], row_to_agent)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Enabled agents that have a webhook URL — the broadcast audience.
    pub fn agents_with_webhooks(&self) -> Result<Vec<AgentRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AGENT_COLS} FROM agents
             WHERE enabled = 1 AND webhook_url IS NOT NULL AND webhook_url != ''
             ORDER BY name"
        ))?;
        let rows = stmt
            .query_map([], row_to_agent)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Returns false when no such agent exists.
    pub fn set_agent_enabled(&self, name: &str, enabled: bool) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE agents SET enabled = ?2 WHERE name = ?1",
            params![name, enabled as i64],
        )?;
        Ok(n > 0)
    }

    pub fn update_agent_webhook(
        &self,
        name: &str,
        webhook_url: Option<&str>,
        webhook_token: Option<&str>,
    ) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE agents SET webhook_url = ?2, webhook_token = ?3 WHERE name = ?1",
            params![name, webhook_url, webhook_token],
        )?;
        Ok(n > 0)
    }

    /// Administrative removal.  History referencing the name (queue entries,
    /// messages, mementos) is left untouched.
    pub fn delete_agent(&self, name: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM agents WHERE name = ?1", params![name])?;
        Ok(n > 0)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::{NewAgent, Store};

    fn new_agent(name: &str) -> NewAgent {
        NewAgent {
            name: name.into(),
            key_hash: format!("hash-{name}"),
            key_prefix: "agk_abcd".into(),
            bio: None,
            webhook_url: None,
            webhook_token: None,
        }
    }

    #[test]
    fn insert_and_lookup_by_name() {
        let store = Store::open_in_memory().unwrap();
        let row = store.insert_agent(new_agent("Alice")).unwrap();
        assert!(row.enabled);
        assert_eq!(row.name, "Alice");
        let found = store.agent_by_name("alice").unwrap().unwrap();
        assert_eq!(found.id, row.id);
    }

    #[test]
    fn duplicate_name_case_insensitive_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        store.insert_agent(new_agent("Alice")).unwrap();
        let err = store.insert_agent(new_agent("ALICE")).unwrap_err();
        assert_eq!(err.kind(), "bad-request");
    }

    #[test]
    fn lookup_by_key_hash() {
        let store = Store::open_in_memory().unwrap();
        store.insert_agent(new_agent("bob")).unwrap();
        let found = store.agent_by_key_hash("hash-bob").unwrap().unwrap();
        assert_eq!(found.name, "bob");
        assert!(store.agent_by_key_hash("nope").unwrap().is_none());
    }

    #[test]
    fn disable_then_enable() {
        let store = Store::open_in_memory().unwrap();
        store.insert_agent(new_agent("carol")).unwrap();
        assert!(store.set_agent_enabled("carol", false).unwrap());
        assert!(!store.agent_by_name("carol").unwrap().unwrap().enabled);
        assert!(store.set_agent_enabled("carol", true).unwrap());
        assert!(store.agent_by_name("carol").unwrap().unwrap().enabled);
    }

    #[test]
    fn set_enabled_missing_agent_returns_false() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.set_agent_enabled("ghost", true).unwrap());
    }

    #[test]
    fn webhook_audience_excludes_disabled_and_webhookless() {
        let store = Store::open_in_memory().unwrap();
        let mut a = new_agent("a");
        a.webhook_url = Some("http://localhost:9/hook".into());
        store.insert_agent(a).unwrap();
        store.insert_agent(new_agent("b")).unwrap();
        let mut c = new_agent("c");
        c.webhook_url = Some("http://localhost:9/hook".into());
        store.insert_agent(c).unwrap();
        store.set_agent_enabled("c", false).unwrap();

        let audience = store.agents_with_webhooks().unwrap();
        assert_eq!(audience.len(), 1);
        assert_eq!(audience[0].name, "a");
    }

    #[test]
    fn delete_agent_removes_row() {
        let store = Store::open_in_memory().unwrap();
        store.insert_agent(new_agent("dave")).unwrap();
        assert!(store.delete_agent("dave").unwrap());
        assert!(store.agent_by_name("dave").unwrap().is_none());
        assert!(!store.delete_agent("dave").unwrap());
    }
}
