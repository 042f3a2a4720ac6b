// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Single source of truth for all gateway state.
//!
//! One SQLite file (`agentgate.db` in the data directory) holds agents,
//! credentials, access policies, queue entries and warnings, messages,
//! broadcasts, mementos, sessions, settings, and the inbound webhook log.
//! A `Mutex<Connection>` serializes access; every method takes the lock for
//! a short, purely in-process critical section — no upstream I/O ever
//! happens while it is held.
//!
//! Timestamps are ISO-8601 strings, space-separated date/time, UTC
//! (`YYYY-MM-DD HH:MM:SS`).  The format sorts lexicographically, which the
//! session sweeper and queue listings rely on.

mod access;
mod agents;
mod broadcasts;
mod credentials;
mod error;
mod mementos;
mod messages;
mod queue;
mod schema;
mod sessions;
mod settings;
mod types;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

pub use error::{GateError, Result};
pub use settings::{
    Settings, WebhookSourceConfig, KEY_AGENT_WITHDRAW_ENABLED, KEY_MESSAGING_MODE,
    KEY_SHARED_QUEUE_VISIBILITY,
};
pub use types::*;

/// Database file name inside the data directory.
pub const DB_FILE: &str = "agentgate.db";

/// Handle to the embedded store.  Cheap to share behind an `Arc`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GateError::Internal(format!("creating data dir: {e}")))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-statement; continuing would hand
        // out a connection in an unknown transaction state.
        self.conn.lock().expect("store mutex poisoned")
    }
}

/// Current UTC time in the store's timestamp format.
pub fn now_ts() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Fresh opaque identifier for queue entries and sessions.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentgate.db");
        let _store = Store::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentgate.db");
        drop(Store::open(&path).unwrap());
        // Re-opening must not fail on existing tables.
        let _store = Store::open(&path).unwrap();
    }

    #[test]
    fn now_ts_is_space_separated_iso() {
        let ts = now_ts();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[10..11], " ");
        assert!(ts[..4].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
