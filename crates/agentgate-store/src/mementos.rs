// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::params;

use crate::{now_ts, MementoHit, MementoRow, Result, Store};

impl Store {
    /// Insert a memento and its keyword stems in one transaction.  `stems`
    /// must already be normalized + stemmed; duplicates are collapsed by the
    /// keyword table's primary key.
    pub fn insert_memento(
        &self,
        agent_id: i64,
        content: &str,
        model: Option<&str>,
        role: Option<&str>,
        stems: &[String],
    ) -> Result<MementoRow> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let created_at = now_ts();
        tx.execute(
            "INSERT INTO mementos (agent_id, model, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![agent_id, model, role, content, created_at],
        )?;
        let id = tx.last_insert_rowid();
        for stem in stems {
            tx.execute(
                "INSERT OR IGNORE INTO memento_keywords (memento_id, keyword_stem) VALUES (?1, ?2)",
                params![id, stem],
            )?;
        }
        tx.commit()?;
        Ok(MementoRow {
            id,
            agent_id,
            model: model.map(str::to_string),
            role: role.map(str::to_string),
            content: content.to_string(),
            created_at,
        })
    }

    /// Any-intersect search: mementos owned by `agent_id` with at least one
    /// matching stem, ranked by distinct-stem match count then recency.
    pub fn search_mementos(
        &self,
        agent_id: i64,
        stems: &[String],
        limit: i64,
    ) -> Result<Vec<MementoHit>> {
        if stems.is_empty() {
            return Ok(Vec::new());
        }
        // ?3, ?4, … — ?1 is the agent, ?2 the limit.
        let placeholders = (0..stems.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT m.id, substr(m.content, 1, 100), COUNT(DISTINCT k.keyword_stem), m.created_at
             FROM mementos m
             JOIN memento_keywords k ON k.memento_id = m.id
             WHERE m.agent_id = ?1 AND k.keyword_stem IN ({placeholders})
             GROUP BY m.id
             ORDER BY COUNT(DISTINCT k.keyword_stem) DESC, m.created_at DESC, m.id DESC
             LIMIT ?2"
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut args: Vec<rusqlite::types::Value> = Vec::with_capacity(stems.len() + 2);
        args.push(agent_id.into());
        args.push(limit.into());
        for stem in stems {
            args.push(stem.clone().into());
        }
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), |row| {
                Ok(MementoHit {
                    id: row.get(0)?,
                    preview: row.get(1)?,
                    matches: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Metadata-only listing, newest first.
    pub fn recent_mementos(&self, agent_id: i64, limit: i64) -> Result<Vec<MementoHit>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, substr(content, 1, 100), 0, created_at
             FROM mementos WHERE agent_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![agent_id, limit], |row| {
                Ok(MementoHit {
                    id: row.get(0)?,
                    preview: row.get(1)?,
                    matches: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Full rows for the given ids, strictly scoped to the owning agent.
    /// Unknown or foreign ids are silently absent from the result.
    pub fn mementos_by_ids(&self, agent_id: i64, ids: &[i64]) -> Result<Vec<MementoRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (0..ids.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, agent_id, model, role, content, created_at
             FROM mementos WHERE agent_id = ?1 AND id IN ({placeholders}) ORDER BY id"
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut args: Vec<rusqlite::types::Value> = Vec::with_capacity(ids.len() + 1);
        args.push(agent_id.into());
        for id in ids {
            args.push((*id).into());
        }
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), |row| {
                Ok(MementoRow {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    model: row.get(2)?,
                    role: row.get(3)?,
                    content: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Distinct stems across the agent's mementos with usage counts,
    /// most-used first.
    pub fn memento_keywords(&self, agent_id: i64) -> Result<Vec<(String, i64)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT k.keyword_stem, COUNT(*) FROM memento_keywords k
             JOIN mementos m ON m.id = k.memento_id
             WHERE m.agent_id = ?1
             GROUP BY k.keyword_stem ORDER BY COUNT(*) DESC, k.keyword_stem",
        )?;
        let rows = stmt
            .query_map(params![agent_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Stems stored for one memento (test and introspection helper).
    pub fn stems_for_memento(&self, memento_id: i64) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT keyword_stem FROM memento_keywords WHERE memento_id = ?1 ORDER BY keyword_stem",
        )?;
        let rows = stmt
            .query_map(params![memento_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_memento(&self, agent_id: i64, id: i64) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM mementos WHERE id = ?1 AND agent_id = ?2",
            params![id, agent_id],
        )?;
        Ok(n > 0)
    }

}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::Store;

    fn stems(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn insert_stores_deduplicated_stems() {
        let store = Store::open_in_memory().unwrap();
        let m = store
            .insert_memento(1, "snake game notes", None, None, &stems(&["game", "game", "snake"]))
            .unwrap();
        assert_eq!(store.stems_for_memento(m.id).unwrap(), vec!["game", "snake"]);
    }

    #[test]
    fn search_ranks_by_match_count_then_recency() {
        let store = Store::open_in_memory().unwrap();
        let m1 = store
            .insert_memento(1, "first", None, None, &stems(&["game", "snake"]))
            .unwrap();
        let m2 = store
            .insert_memento(1, "second", None, None, &stems(&["game", "engine"]))
            .unwrap();
        let m3 = store
            .insert_memento(1, "third", None, None, &stems(&["project"]))
            .unwrap();

        let hits = store
            .search_mementos(1, &stems(&["game", "snake"]), 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, m1.id);
        assert_eq!(hits[0].matches, 2);
        assert_eq!(hits[1].id, m2.id);
        assert_eq!(hits[1].matches, 1);
        assert!(!hits.iter().any(|h| h.id == m3.id));
    }

    #[test]
    fn search_is_scoped_to_agent() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_memento(1, "mine", None, None, &stems(&["secret"]))
            .unwrap();
        store
            .insert_memento(2, "theirs", None, None, &stems(&["secret"]))
            .unwrap();
        let hits = store.search_mementos(1, &stems(&["secret"]), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].preview, "mine");
    }

    #[test]
    fn search_with_no_stems_is_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.search_mementos(1, &[], 10).unwrap().is_empty());
    }

    #[test]
    fn by_ids_ignores_foreign_rows() {
        let store = Store::open_in_memory().unwrap();
        let mine = store
            .insert_memento(1, "mine", None, None, &stems(&["a"]))
            .unwrap();
        let theirs = store
            .insert_memento(2, "theirs", None, None, &stems(&["a"]))
            .unwrap();
        let rows = store.mementos_by_ids(1, &[mine.id, theirs.id]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, mine.id);
    }

    #[test]
    fn keywords_counts_usage() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_memento(1, "a", None, None, &stems(&["game", "snake"]))
            .unwrap();
        store
            .insert_memento(1, "b", None, None, &stems(&["game"]))
            .unwrap();
        let kw = store.memento_keywords(1).unwrap();
        assert_eq!(kw[0], ("game".to_string(), 2));
        assert_eq!(kw[1], ("snake".to_string(), 1));
    }

    #[test]
    fn keyword_rows_cascade_on_delete() {
        let store = Store::open_in_memory().unwrap();
        let m = store
            .insert_memento(1, "a", None, None, &stems(&["x"]))
            .unwrap();
        assert!(store.delete_memento(1, m.id).unwrap());
        assert!(store.stems_for_memento(m.id).unwrap().is_empty());
    }

    #[test]
    fn recent_returns_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store.insert_memento(1, "old", None, None, &[]).unwrap();
        store.insert_memento(1, "new", None, None, &[]).unwrap();
        let recent = store.recent_mementos(1, 10).unwrap();
        assert_eq!(recent[0].preview, "new");
    }
}
