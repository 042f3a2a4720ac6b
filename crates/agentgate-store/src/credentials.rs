// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::{params, OptionalExtension};

use crate::{CredentialRow, Result, Store};

impl Store {
    /// Insert or replace the credential bag for (service, account).
    pub fn upsert_credential(
        &self,
        service: &str,
        account_name: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO credentials (service, account_name, data) VALUES (?1, ?2, ?3)",
            params![service, account_name, data.to_string()],
        )?;
        Ok(())
    }

    pub fn credential(&self, service: &str, account_name: &str) -> Result<Option<CredentialRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT service, account_name, data FROM credentials
                 WHERE service = ?1 AND account_name = ?2",
                params![service, account_name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((service, account_name, data)) => Ok(Some(CredentialRow {
                service,
                account_name,
                data: serde_json::from_str(&data)?,
            })),
            None => Ok(None),
        }
    }

    /// All configured (service, account) pairs, without the secret bags.
    pub fn list_credentials(&self) -> Result<Vec<(String, String)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT service, account_name FROM credentials ORDER BY service, account_name",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_credential(&self, service: &str, account_name: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM credentials WHERE service = ?1 AND account_name = ?2",
            params![service, account_name],
        )?;
        Ok(n > 0)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::Store;

    #[test]
    fn upsert_then_read_back() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_credential("github", "personal", &json!({"token": "ghp_x"}))
            .unwrap();
        let cred = store.credential("github", "personal").unwrap().unwrap();
        assert_eq!(cred.data["token"], "ghp_x");
    }

    #[test]
    fn upsert_replaces_existing_bag() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_credential("github", "personal", &json!({"token": "old"}))
            .unwrap();
        store
            .upsert_credential("github", "personal", &json!({"token": "new"}))
            .unwrap();
        let cred = store.credential("github", "personal").unwrap().unwrap();
        assert_eq!(cred.data["token"], "new");
        assert_eq!(store.list_credentials().unwrap().len(), 1);
    }

    #[test]
    fn missing_credential_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.credential("github", "nobody").unwrap().is_none());
    }

    #[test]
    fn delete_credential_removes_row() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_credential("bluesky", "alice", &json!({"identifier": "alice.bsky.social"}))
            .unwrap();
        assert!(store.delete_credential("bluesky", "alice").unwrap());
        assert!(!store.delete_credential("bluesky", "alice").unwrap());
    }
}
