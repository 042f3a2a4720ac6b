// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::{params, OptionalExtension, Row};

use crate::{now_ts, GateError, MessageRow, MessageStatus, Result, Store};

const MSG_COLS: &str = "id, from_agent, to_agent, body, status, rejection_reason, \
     created_at, delivered_at, read_at";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<(MessageRow, String)> {
    let status: String = row.get(4)?;
    Ok((
        MessageRow {
            id: row.get(0)?,
            from_agent: row.get(1)?,
            to_agent: row.get(2)?,
            body: row.get(3)?,
            status: MessageStatus::Pending,
            rejection_reason: row.get(5)?,
            created_at: row.get(6)?,
            delivered_at: row.get(7)?,
            read_at: row.get(8)?,
        },
        status,
    ))
}

fn decode_message((mut msg, status): (MessageRow, String)) -> Result<MessageRow> {
    msg.status = MessageStatus::parse(&status)
        .ok_or_else(|| GateError::Internal(format!("corrupt message status: {status}")))?;
    Ok(msg)
}

impl Store {
    /// Insert a direct message in the given initial status (`pending` under
    /// supervised mode, `delivered` under open mode).
    pub fn insert_message(
        &self,
        from_agent: &str,
        to_agent: &str,
        body: &str,
        status: MessageStatus,
    ) -> Result<MessageRow> {
        let now = now_ts();
        let delivered_at = (status == MessageStatus::Delivered).then(|| now.clone());
        let conn = self.lock();
        conn.execute(
            "INSERT INTO agent_messages (from_agent, to_agent, body, status, created_at, delivered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![from_agent, to_agent, body, status.as_str(), now, delivered_at],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.message(id)?
            .ok_or_else(|| GateError::Internal("inserted message vanished".into()))
    }

    pub fn message(&self, id: i64) -> Result<Option<MessageRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {MSG_COLS} FROM agent_messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()?;
        drop(conn);
        row.map(decode_message).transpose()
    }

    /// Delivered messages addressed to `agent`, oldest first.  Pending rows
    /// are invisible to the recipient until a human approves them.
    pub fn messages_for(&self, agent: &str, unread_only: bool) -> Result<Vec<MessageRow>> {
        let mut sql = format!(
            "SELECT {MSG_COLS} FROM agent_messages WHERE to_agent = ?1 AND status = 'delivered'"
        );
        if unread_only {
            sql.push_str(" AND read_at IS NULL");
        }
        sql.push_str(" ORDER BY id");
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![agent], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);
        rows.into_iter().map(decode_message).collect()
    }

    /// Messages sent by `agent`, newest first — the sender's outbox view.
    pub fn messages_from(&self, agent: &str) -> Result<Vec<MessageRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MSG_COLS} FROM agent_messages WHERE from_agent = ?1 ORDER BY id DESC"
        ))?;
        let rows = stmt
            .query_map(params![agent], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);
        rows.into_iter().map(decode_message).collect()
    }

    /// All pending messages, oldest first (supervised review order).
    pub fn pending_messages(&self) -> Result<Vec<MessageRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MSG_COLS} FROM agent_messages WHERE status = 'pending' ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);
        rows.into_iter().map(decode_message).collect()
    }

    /// pending → delivered.  Returns false when the message was not pending.
    pub fn deliver_message(&self, id: i64) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE agent_messages SET status = 'delivered', delivered_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, now_ts()],
        )?;
        Ok(n > 0)
    }

    /// pending → rejected with reason.
    pub fn reject_message(&self, id: i64, reason: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE agent_messages SET status = 'rejected', rejection_reason = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, reason],
        )?;
        Ok(n > 0)
    }

    /// Set `read_at` once.  A second call finds no matching row and returns
    /// false, which the messaging layer reports as not-found-or-already-read.
    pub fn mark_message_read(&self, id: i64, agent: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE agent_messages SET read_at = ?2
             WHERE id = ?1 AND to_agent = ?3 AND status = 'delivered' AND read_at IS NULL",
            params![id, now_ts(), agent],
        )?;
        Ok(n > 0)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
