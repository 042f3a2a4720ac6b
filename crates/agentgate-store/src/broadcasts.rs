// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::{params, OptionalExtension};

use crate::{
    now_ts, BroadcastRecipientRow, BroadcastRow, DeliveryStatus, GateError, Result, Store,
};

impl Store {
    pub fn insert_broadcast(
        &self,
        from_agent: &str,
        body: &str,
        total_recipients: i64,
    ) -> Result<BroadcastRow> {
        let conn = self.lock();
        let created_at = now_ts();
        conn.execute(
            "INSERT INTO broadcasts (from_agent, body, total_recipients, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![from_agent, body, total_recipients, created_at],
        )?;
        Ok(BroadcastRow {
            id: conn.last_insert_rowid(),
            from_agent: from_agent.to_string(),
            body: body.to_string(),
            total_recipients,
            created_at,
        })
    }

    /// Record one fan-out outcome.  Upsert so a retry never double-counts.
    pub fn record_broadcast_recipient(
        &self,
        broadcast_id: i64,
        to_agent: &str,
        status: DeliveryStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO broadcast_recipients (broadcast_id, to_agent, status, error)
             VALUES (?1, ?2, ?3, ?4)",
            params![broadcast_id, to_agent, status.as_str(), error],
        )?;
        Ok(())
    }

    pub fn broadcast(&self, id: i64) -> Result<Option<BroadcastRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, from_agent, body, total_recipients, created_at
                 FROM broadcasts WHERE id = ?1",
                params![id],
                |row| {
                    Ok(BroadcastRow {
                        id: row.get(0)?,
                        from_agent: row.get(1)?,
                        body: row.get(2)?,
                        total_recipients: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn broadcast_recipients(&self, broadcast_id: i64) -> Result<Vec<BroadcastRecipientRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT broadcast_id, to_agent, status, error
             FROM broadcast_recipients WHERE broadcast_id = ?1 ORDER BY to_agent",
        )?;
        let rows = stmt
            .query_map(params![broadcast_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);
        rows.into_iter()
            .map(|(broadcast_id, to_agent, status, error)| {
                Ok(BroadcastRecipientRow {
                    broadcast_id,
                    to_agent,
                    status: DeliveryStatus::parse(&status).ok_or_else(|| {
                        GateError::Internal(format!("corrupt delivery status: {status}"))
                    })?,
                    error,
                })
            })
            .collect()
    }

    /// Broadcasts sent by `agent`, newest first.
    pub fn broadcasts_from(&self, agent: &str, limit: i64) -> Result<Vec<BroadcastRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, from_agent, body, total_recipients, created_at
             FROM broadcasts WHERE from_agent = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![agent, limit], |row| {
                Ok(BroadcastRow {
                    id: row.get(0)?,
                    from_agent: row.get(1)?,
                    body: row.get(2)?,
                    total_recipients: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
