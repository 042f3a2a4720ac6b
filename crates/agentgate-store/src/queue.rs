// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Queue entry persistence.
//!
//! Every lifecycle transition is a single conditional `UPDATE … WHERE
//! status = <source>`: the database is the arbiter of races, so when an
//! admin approval and an agent withdrawal hit the same pending entry
//! concurrently, exactly one statement reports an affected row and the
//! loser sees `false`.

use rusqlite::{params, OptionalExtension, Row};

use crate::{
    new_id, now_ts, GateError, QueueEntryRow, QueueStatus, RequestResult, Result, Store,
    WarningRow, WriteRequest,
};

const QUEUE_COLS: &str = "id, service, account_name, requests, comment, submitted_by, \
     submitted_at, status, reviewed_at, rejection_reason, completed_at, results, auto_approved";

/// Raw column values; JSON and status decoding happens outside the row
/// mapper so serde errors surface as `GateError` instead of being shoehorned
/// into rusqlite's FromSql machinery.
struct RawEntry {
    entry: QueueEntryRow,
    requests_json: String,
    results_json: Option<String>,
    status_str: String,
}

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        entry: QueueEntryRow {
            id: row.get(0)?,
            service: row.get(1)?,
            account_name: row.get(2)?,
            requests: Vec::new(),
            comment: row.get(4)?,
            submitted_by: row.get(5)?,
            submitted_at: row.get(6)?,
            status: QueueStatus::Pending,
            reviewed_at: row.get(8)?,
            rejection_reason: row.get(9)?,
            completed_at: row.get(10)?,
            results: None,
            auto_approved: row.get::<_, i64>(12)? != 0,
        },
        requests_json: row.get(3)?,
        results_json: row.get(11)?,
        status_str: row.get(7)?,
    })
}

fn decode_entry(raw: RawEntry) -> Result<QueueEntryRow> {
    let mut entry = raw.entry;
    entry.requests = serde_json::from_str::<Vec<WriteRequest>>(&raw.requests_json)?;
    entry.results = match raw.results_json {
        Some(json) => Some(serde_json::from_str::<Vec<RequestResult>>(&json)?),
        None => None,
    };
    entry.status = QueueStatus::parse(&raw.status_str).ok_or_else(|| {
        GateError::Internal(format!("corrupt queue status: {}", raw.status_str))
    })?;
    Ok(entry)
}

impl Store {
    /// Insert a fresh `pending` entry and return it.
    pub fn insert_queue_entry(
        &self,
        service: &str,
        account_name: &str,
        requests: &[WriteRequest],
        comment: &str,
        submitted_by: &str,
    ) -> Result<QueueEntryRow> {
        let id = new_id();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO queue_entries (id, service, account_name, requests, comment, submitted_by, submitted_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending')",
            params![
                id,
                service,
                account_name,
                serde_json::to_string(requests)?,
                comment,
                submitted_by,
                now_ts()
            ],
        )?;
        drop(conn);
        self.queue_entry(&id)?
            .ok_or_else(|| GateError::Internal("inserted queue entry vanished".into()))
    }

    pub fn queue_entry(&self, id: &str) -> Result<Option<QueueEntryRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {QUEUE_COLS} FROM queue_entries WHERE id = ?1"),
                params![id],
                row_to_raw,
            )
            .optional()?;
        drop(conn);
        row.map(decode_entry).transpose()
    }

    /// List entries, newest first.  `submitted_by = None` lists everything
    /// (shared queue visibility); a service/account pair narrows further.
    pub fn list_queue_entries(
        &self,
        submitted_by: Option<&str>,
        service_account: Option<(&str, &str)>,
    ) -> Result<Vec<QueueEntryRow>> {
        let mut sql = format!("SELECT {QUEUE_COLS} FROM queue_entries");
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(agent) = submitted_by {
            args.push(agent.to_string());
            clauses.push(format!("submitted_by = ?{}", args.len()));
        }
        if let Some((service, account)) = service_account {
            args.push(service.to_string());
            clauses.push(format!("service = ?{}", args.len()));
            args.push(account.to_string());
            clauses.push(format!("account_name = ?{}", args.len()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY submitted_at DESC, id");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_raw)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);
        rows.into_iter().map(decode_entry).collect()
    }

    /// Entries with the given status, oldest first (review order).
    pub fn queue_entries_with_status(&self, status: QueueStatus) -> Result<Vec<QueueEntryRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {QUEUE_COLS} FROM queue_entries WHERE status = ?1 ORDER BY submitted_at, id"
        ))?;
        let rows = stmt
            .query_map(params![status.as_str()], row_to_raw)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);
        rows.into_iter().map(decode_entry).collect()
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// pending → approved.  Returns false when the entry was not pending.
    pub fn approve_entry(&self, id: &str, auto: bool) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE queue_entries SET status = 'approved', reviewed_at = ?2, auto_approved = ?3
             WHERE id = ?1 AND status = 'pending'",
            params![id, now_ts(), auto as i64],
        )?;
        Ok(n > 0)
    }

    /// pending → rejected.
    pub fn reject_entry(&self, id: &str, reason: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE queue_entries SET status = 'rejected', reviewed_at = ?2, rejection_reason = ?3
             WHERE id = ?1 AND status = 'pending'",
            params![id, now_ts(), reason],
        )?;
        Ok(n > 0)
    }

    /// pending → withdrawn, only for the original submitter.
    pub fn withdraw_entry(&self, id: &str, agent: &str, reason: Option<&str>) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE queue_entries SET status = 'withdrawn', reviewed_at = ?2, rejection_reason = ?3
             WHERE id = ?1 AND status = 'pending' AND submitted_by = ?4",
            params![id, now_ts(), reason, agent],
        )?;
        Ok(n > 0)
    }

    /// approved → executing.
    pub fn begin_execution(&self, id: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE queue_entries SET status = 'executing' WHERE id = ?1 AND status = 'approved'",
            params![id],
        )?;
        Ok(n > 0)
    }

    /// executing → completed | failed, recording the aligned results.
    pub fn finish_execution(
        &self,
        id: &str,
        status: QueueStatus,
        results: &[RequestResult],
    ) -> Result<bool> {
        debug_assert!(matches!(
            status,
            QueueStatus::Completed | QueueStatus::Failed
        ));
        let conn = self.lock();
        let n = conn.execute(
            "UPDATE queue_entries SET status = ?2, completed_at = ?3, results = ?4
             WHERE id = ?1 AND status = 'executing'",
            params![
                id,
                status.as_str(),
                now_ts(),
                serde_json::to_string(results)?
            ],
        )?;
        Ok(n > 0)
    }

    // ── Warnings ─────────────────────────────────────────────────────────────

    /// Insert a peer warning.  The pending check happens in the same critical
    /// section as the insert so a warning can never land on a reviewed entry.
    pub fn insert_warning(&self, queue_id: &str, warned_by: &str, message: &str) -> Result<i64> {
        let conn = self.lock();
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM queue_entries WHERE id = ?1",
                params![queue_id],
                |row| row.get(0),
            )
            .optional()?;
        match status.as_deref() {
            None => return Err(GateError::NotFound(format!("queue entry {queue_id}"))),
            Some("pending") => {}
            Some(other) => {
                return Err(GateError::IllegalState(format!(
                    "cannot warn on a {other} entry"
                )))
            }
        }
        conn.execute(
            "INSERT INTO queue_warnings (queue_id, warned_by, message, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![queue_id, warned_by, message, now_ts()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn warnings_for(&self, queue_id: &str) -> Result<Vec<WarningRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, queue_id, warned_by, message, created_at
             FROM queue_warnings WHERE queue_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![queue_id], |row| {
                Ok(WarningRow {
                    id: row.get(0)?,
                    queue_id: row.get(1)?,
                    warned_by: row.get(2)?,
                    message: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Admin purge of a terminal entry.  Warnings cascade.
    pub fn purge_queue_entry(&self, id: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM queue_entries WHERE id = ?1
             AND status IN ('completed', 'failed', 'rejected', 'withdrawn')",
            params![id],
        )?;
        Ok(n > 0)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::{QueueStatus, RequestResult, Store, WriteRequest};

    fn req(method: &str, path: &str) -> WriteRequest {
        WriteRequest {
            method: method.into(),
            path: path.into(),
            body: None,
            headers: None,
            binary_base64: false,
        }
    }

    fn submit(store: &Store) -> String {
        store
            .insert_queue_entry(
                "github",
                "personal",
                &[req("POST", "/repos/o/r/issues")],
                "create issue",
                "alice",
            )
            .unwrap()
            .id
    }

    #[test]
    fn insert_creates_pending_entry() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        let entry = store.queue_entry(&id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Pending);
        assert_eq!(entry.requests.len(), 1);
        assert!(!entry.auto_approved);
        assert!(entry.results.is_none());
    }

    #[test]
    fn approve_only_succeeds_from_pending() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        assert!(store.approve_entry(&id, false).unwrap());
        // Second approval must lose.
        assert!(!store.approve_entry(&id, false).unwrap());
        let entry = store.queue_entry(&id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Approved);
        assert!(entry.reviewed_at.is_some());
    }

    #[test]
    fn approve_withdraw_race_has_single_winner() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        let approved = store.approve_entry(&id, false).unwrap();
        let withdrawn = store.withdraw_entry(&id, "alice", None).unwrap();
        assert!(approved ^ withdrawn);
    }

    #[test]
    fn withdraw_requires_submitter() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        assert!(!store.withdraw_entry(&id, "mallory", None).unwrap());
        assert!(store.withdraw_entry(&id, "alice", Some("changed my mind")).unwrap());
        let entry = store.queue_entry(&id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Withdrawn);
        assert_eq!(entry.submitted_by, "alice");
        assert!(entry.reviewed_at.unwrap() >= entry.submitted_at);
    }

    #[test]
    fn execution_path_records_results() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        store.approve_entry(&id, false).unwrap();
        assert!(store.begin_execution(&id).unwrap());
        let results = vec![RequestResult {
            ok: true,
            status: 201,
            body: serde_json::json!({"number": 1}),
        }];
        assert!(store
            .finish_execution(&id, QueueStatus::Completed, &results)
            .unwrap());
        let entry = store.queue_entry(&id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Completed);
        assert_eq!(entry.results.unwrap().len(), 1);
        assert!(entry.completed_at.is_some());
    }

    #[test]
    fn begin_execution_requires_approved() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        assert!(!store.begin_execution(&id).unwrap());
    }

    #[test]
    fn reject_records_reason() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        assert!(store.reject_entry(&id, "not today").unwrap());
        let entry = store.queue_entry(&id).unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Rejected);
        assert_eq!(entry.rejection_reason.as_deref(), Some("not today"));
    }

    #[test]
    fn warning_requires_pending_entry() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        let wid = store.insert_warning(&id, "bob", "looks destructive").unwrap();
        assert!(wid > 0);
        store.reject_entry(&id, "no").unwrap();
        let err = store.insert_warning(&id, "bob", "again").unwrap_err();
        assert_eq!(err.kind(), "illegal-state");
    }

    #[test]
    fn warning_on_missing_entry_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.insert_warning("nope", "bob", "hm").unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[test]
    fn warnings_cascade_on_purge() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        store.insert_warning(&id, "bob", "careful").unwrap();
        store.reject_entry(&id, "no").unwrap();
        assert!(store.purge_queue_entry(&id).unwrap());
        assert!(store.warnings_for(&id).unwrap().is_empty());
    }

    #[test]
    fn purge_refuses_non_terminal() {
        let store = Store::open_in_memory().unwrap();
        let id = submit(&store);
        assert!(!store.purge_queue_entry(&id).unwrap());
    }

    #[test]
    fn list_filters_by_submitter_and_account() {
        let store = Store::open_in_memory().unwrap();
        submit(&store);
        store
            .insert_queue_entry("bluesky", "alice", &[req("POST", "/xrpc/x")], "post", "bob")
            .unwrap();

        assert_eq!(store.list_queue_entries(None, None).unwrap().len(), 2);
        assert_eq!(
            store.list_queue_entries(Some("alice"), None).unwrap().len(),
            1
        );
        assert_eq!(
            store
                .list_queue_entries(None, Some(("bluesky", "alice")))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store
                .list_queue_entries(Some("bob"), Some(("github", "personal")))
                .unwrap()
                .len(),
            0
        );
    }
}
