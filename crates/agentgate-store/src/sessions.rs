// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::{params, OptionalExtension, Row};

use crate::{now_ts, Result, SessionRow, Store};

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        session_id: row.get(0)?,
        agent_name: row.get(1)?,
        created_at: row.get(2)?,
        last_seen: row.get(3)?,
    })
}

impl Store {
    pub fn insert_session(&self, session_id: &str, agent_name: &str) -> Result<SessionRow> {
        let now = now_ts();
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO sessions (session_id, agent_name, created_at, last_seen)
             VALUES (?1, ?2, ?3, ?3)",
            params![session_id, agent_name, now],
        )?;
        Ok(SessionRow {
            session_id: session_id.to_string(),
            agent_name: agent_name.to_string(),
            created_at: now.clone(),
            last_seen: now,
        })
    }

    pub fn session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT session_id, agent_name, created_at, last_seen FROM sessions
                 WHERE session_id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, agent_name, created_at, last_seen FROM sessions
             ORDER BY last_seen DESC",
        )?;
        let rows = stmt
            .query_map([], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Persist a debounced last-seen update.
    pub fn touch_session(&self, session_id: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE sessions SET last_seen = ?2 WHERE session_id = ?1",
            params![session_id, now_ts()],
        )?;
        Ok(n > 0)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(n > 0)
    }

    pub fn delete_agent_sessions(&self, agent_name: &str) -> Result<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM sessions WHERE agent_name = ?1",
            params![agent_name],
        )?;
        Ok(n)
    }

    /// Sessions whose last-seen is strictly before `cutoff`.  The timestamp
    /// format sorts lexicographically, so plain string comparison is exact.
    pub fn sessions_seen_before(&self, cutoff: &str) -> Result<Vec<SessionRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, agent_name, created_at, last_seen FROM sessions
             WHERE last_seen < ?1",
        )?;
        let rows = stmt
            .query_map(params![cutoff], row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn insert_and_lookup() {
        let store = Store::open_in_memory().unwrap();
        store.insert_session("s-1", "alice").unwrap();
        let row = store.session("s-1").unwrap().unwrap();
        assert_eq!(row.agent_name, "alice");
        assert_eq!(row.created_at, row.last_seen);
    }

    #[test]
    fn touch_missing_session_returns_false() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.touch_session("ghost").unwrap());
    }

    #[test]
    fn delete_agent_sessions_removes_all_theirs() {
        let store = Store::open_in_memory().unwrap();
        store.insert_session("s-1", "alice").unwrap();
        store.insert_session("s-2", "Alice").unwrap();
        store.insert_session("s-3", "bob").unwrap();
        assert_eq!(store.delete_agent_sessions("alice").unwrap(), 2);
        assert!(store.session("s-3").unwrap().is_some());
    }

    #[test]
    fn cutoff_comparison_finds_stale_sessions() {
        let store = Store::open_in_memory().unwrap();
        store.insert_session("s-1", "alice").unwrap();
        // Any future cutoff must catch the session just created.
        let stale = store.sessions_seen_before("2999-01-01 00:00:00").unwrap();
        assert_eq!(stale.len(), 1);
        let none = store.sessions_seen_before("2000-01-01 00:00:00").unwrap();
        assert!(none.is_empty());
    }
}
