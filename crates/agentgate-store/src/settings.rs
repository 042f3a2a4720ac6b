// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The settings bag and its typed accessor.
//!
//! Raw rows are `{key, value}` strings; `Settings` interprets the handful of
//! well-known keys.  Admin writes go through `set_setting` and take effect on
//! the next read — nothing is cached here, the store lock is cheap and the
//! settings are read at most a few times per request.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use agentgate_config::MessagingMode;

use crate::{now_ts, Result, Store, WebhookLogRow};

/// Well-known setting keys.
pub const KEY_MESSAGING_MODE: &str = "messaging_mode";
pub const KEY_SHARED_QUEUE_VISIBILITY: &str = "shared_queue_visibility";
pub const KEY_AGENT_WITHDRAW_ENABLED: &str = "agent_withdraw_enabled";

/// Per-source inbound webhook configuration, stored under `webhook:<source>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookSourceConfig {
    /// HMAC secret; when set, unsigned deliveries are rejected.
    pub secret: Option<String>,
    /// Event allowlist (`"issues.opened"`, `"push"`…).  Empty or absent
    /// means fan out everything.
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl Store {
    pub fn setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Inbound webhook log ──────────────────────────────────────────────────

    pub fn insert_webhook_log(
        &self,
        source: &str,
        event: &str,
        delivery_id: Option<&str>,
        status: &str,
        detail: Option<&str>,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO webhook_log (source, event, delivery_id, status, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![source, event, delivery_id, status, detail, now_ts()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn recent_webhook_log(&self, limit: i64) -> Result<Vec<WebhookLogRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, source, event, delivery_id, status, detail, created_at
             FROM webhook_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(WebhookLogRow {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    event: row.get(2)?,
                    delivery_id: row.get(3)?,
                    status: row.get(4)?,
                    detail: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Typed view over the settings table.
#[derive(Clone)]
pub struct Settings {
    store: Arc<Store>,
}

impl Settings {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Defaults to `supervised` when unset or unparseable.
    pub fn messaging_mode(&self) -> MessagingMode {
        self.store
            .setting(KEY_MESSAGING_MODE)
            .ok()
            .flatten()
            .and_then(|v| MessagingMode::parse(&v))
            .unwrap_or_default()
    }

    pub fn set_messaging_mode(&self, mode: MessagingMode) -> Result<()> {
        self.store.set_setting(KEY_MESSAGING_MODE, mode.as_str())
    }

    /// When true, every agent's queue listing includes all entries.
    pub fn shared_queue_visibility(&self) -> bool {
        self.bool_setting(KEY_SHARED_QUEUE_VISIBILITY, false)
    }

    /// When false, agents cannot withdraw their own pending entries.
    pub fn agent_withdraw_enabled(&self) -> bool {
        self.bool_setting(KEY_AGENT_WITHDRAW_ENABLED, true)
    }

    pub fn webhook_source(&self, source: &str) -> Option<WebhookSourceConfig> {
        let raw = self.store.setting(&format!("webhook:{source}")).ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn set_webhook_source(&self, source: &str, config: &WebhookSourceConfig) -> Result<()> {
        self.store.set_setting(
            &format!("webhook:{source}"),
            &serde_json::to_string(config)?,
        )
    }

    fn bool_setting(&self, key: &str, default: bool) -> bool {
        match self.store.setting(key).ok().flatten().as_deref() {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => default,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentgate_config::MessagingMode;

    use super::{Settings, WebhookSourceConfig};
    use crate::Store;

    fn settings() -> Settings {
        Settings::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn messaging_mode_defaults_to_supervised() {
        assert_eq!(settings().messaging_mode(), MessagingMode::Supervised);
    }

    #[test]
    fn messaging_mode_roundtrips() {
        let s = settings();
        s.set_messaging_mode(MessagingMode::Open).unwrap();
        assert_eq!(s.messaging_mode(), MessagingMode::Open);
    }

    #[test]
    fn queue_visibility_defaults_private() {
        assert!(!settings().shared_queue_visibility());
    }

    #[test]
    fn withdraw_defaults_enabled() {
        assert!(settings().agent_withdraw_enabled());
    }

    #[test]
    fn webhook_source_roundtrips() {
        let s = settings();
        assert!(s.webhook_source("github").is_none());
        s.set_webhook_source(
            "github",
            &WebhookSourceConfig {
                secret: Some("shh".into()),
                events: vec!["issues.opened".into()],
                enabled: true,
            },
        )
        .unwrap();
        let cfg = s.webhook_source("github").unwrap();
        assert_eq!(cfg.secret.as_deref(), Some("shh"));
        assert!(cfg.enabled);
    }

    #[test]
    fn webhook_log_records_rows() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_webhook_log("github", "ping", Some("d-1"), "accepted", None)
            .unwrap();
        let rows = store.recent_webhook_log(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event, "ping");
    }
}
