// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The memento store: immutable keyword-tagged notes, one owner each.
//!
//! Keywords pass through `normalize` (lowercase, strip everything but
//! alphanumerics and hyphens) and a Porter stemmer before storage, so
//! "Gaming", "games" and "game" all land on the same stem.  Search applies
//! the identical pipeline to its inputs — the composition is idempotent, so
//! a stored stem searched verbatim always matches itself.

use std::sync::Arc;

use rust_stemmers::{Algorithm, Stemmer};
use serde::Serialize;
use tracing::debug;

use agentgate_store::{AgentRow, GateError, MementoHit, MementoRow, Result, Store};

/// Content cap per memento.
pub const MAX_CONTENT_BYTES: usize = 12 * 1024;
/// Keywords accepted per save.
pub const MAX_KEYWORDS: usize = 10;
/// Search result limit default and ceiling.
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;
pub const MAX_SEARCH_LIMIT: i64 = 100;
/// get_by_ids accepts at most this many ids per call.
pub const MAX_IDS_PER_GET: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct SavedMemento {
    pub id: i64,
    pub keywords: Vec<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct MementoService {
    store: Arc<Store>,
    stemmer: Arc<Stemmer>,
}

impl MementoService {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            stemmer: Arc::new(Stemmer::create(Algorithm::English)),
        }
    }

    // ── Keyword pipeline ─────────────────────────────────────────────────────

    /// Lowercase and strip everything except ASCII alphanumerics and hyphens.
    fn normalize(keyword: &str) -> String {
        keyword
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect()
    }

    /// `normalize` then stem; `None` when nothing survives normalization.
    pub fn stem(&self, keyword: &str) -> Option<String> {
        let normalized = Self::normalize(keyword);
        if normalized.is_empty() {
            return None;
        }
        Some(self.stemmer.stem(&normalized).into_owned())
    }

    fn stem_all(&self, keywords: &[String]) -> Vec<String> {
        let mut stems: Vec<String> = keywords
            .iter()
            .filter_map(|k| self.stem(k))
            .collect();
        stems.sort_unstable();
        stems.dedup();
        stems
    }

    // ── Operations ───────────────────────────────────────────────────────────

    pub fn save(
        &self,
        agent: &AgentRow,
        content: &str,
        keywords: &[String],
        model: Option<&str>,
        role: Option<&str>,
    ) -> Result<SavedMemento> {
        if content.is_empty() {
            return Err(GateError::BadRequest("content is required".into()));
        }
        if content.len() > MAX_CONTENT_BYTES {
            return Err(GateError::BadRequest(format!(
                "content exceeds {MAX_CONTENT_BYTES} bytes"
            )));
        }
        if keywords.len() > MAX_KEYWORDS {
            return Err(GateError::BadRequest(format!(
                "at most {MAX_KEYWORDS} keywords per memento"
            )));
        }
        let stems = self.stem_all(keywords);
        let row = self
            .store
            .insert_memento(agent.id, content, model, role, &stems)?;
        debug!(agent = %agent.name, id = row.id, stems = stems.len(), "memento saved");
        Ok(SavedMemento {
            id: row.id,
            keywords: stems,
            created_at: row.created_at,
        })
    }

    /// Any-intersect search ranked by distinct-stem match count, then
    /// recency.  Empty or fully-normalized-away inputs yield no hits.
    pub fn search(
        &self,
        agent: &AgentRow,
        keywords: &[String],
        limit: Option<i64>,
    ) -> Result<Vec<MementoHit>> {
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        let stems = self.stem_all(keywords);
        self.store.search_mementos(agent.id, &stems, limit)
    }

    pub fn keywords(&self, agent: &AgentRow) -> Result<Vec<(String, i64)>> {
        self.store.memento_keywords(agent.id)
    }

    pub fn recent(&self, agent: &AgentRow, limit: Option<i64>) -> Result<Vec<MementoHit>> {
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        self.store.recent_mementos(agent.id, limit)
    }

    pub fn get_by_ids(&self, agent: &AgentRow, ids: &[i64]) -> Result<Vec<MementoRow>> {
        if ids.is_empty() {
            return Err(GateError::BadRequest("at least one id is required".into()));
        }
        if ids.len() > MAX_IDS_PER_GET {
            return Err(GateError::BadRequest(format!(
                "at most {MAX_IDS_PER_GET} ids per call"
            )));
        }
        self.store.mementos_by_ids(agent.id, ids)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentgate_store::{NewAgent, Store};

    use super::{MementoService, MAX_CONTENT_BYTES, MAX_KEYWORDS};

    fn service() -> (MementoService, agentgate_store::AgentRow) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let agent = store
            .insert_agent(NewAgent {
                name: "alice".into(),
                key_hash: "h".into(),
                key_prefix: "agk_test".into(),
                bio: None,
                webhook_url: None,
                webhook_token: None,
            })
            .unwrap();
        (MementoService::new(store), agent)
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn normalize_and_stem_is_idempotent() {
        let (svc, _) = service();
        for word in ["Gaming!", "snakes", "running", "rust-lang", "project"] {
            let once = svc.stem(word).unwrap();
            let twice = svc.stem(&once).unwrap();
            assert_eq!(once, twice, "stem({word}) must be a fixed point");
        }
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        let (svc, _) = service();
        assert_eq!(svc.stem("C++!"), Some("c".to_string()));
        assert_eq!(svc.stem("Rust-Lang"), svc.stem("rust-lang"));
        assert_eq!(svc.stem("!!!"), None);
    }

    #[test]
    fn save_deduplicates_stems_across_inflections() {
        let (svc, agent) = service();
        let saved = svc
            .save(&agent, "notes", &kw(&["game", "games", "Gaming"]), None, None)
            .unwrap();
        // "game"/"games" stem together; "gaming" stems to "game" as well
        // under the English stemmer.
        assert_eq!(saved.keywords, vec!["game"]);
    }

    #[test]
    fn search_matches_inflected_forms() {
        let (svc, agent) = service();
        svc.save(&agent, "snake game devlog", &kw(&["game", "snake"]), None, None)
            .unwrap();
        let hits = svc.search(&agent, &kw(&["Games"]), None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matches, 1);
    }

    #[test]
    fn search_ranking_follows_match_count() {
        let (svc, agent) = service();
        svc.save(&agent, "m1", &kw(&["game", "snake"]), None, None).unwrap();
        svc.save(&agent, "m2", &kw(&["game", "engine"]), None, None).unwrap();
        svc.save(&agent, "m3", &kw(&["project"]), None, None).unwrap();

        let hits = svc
            .search(&agent, &kw(&["game", "project"]), None)
            .unwrap();
        assert_eq!(hits.len(), 3);
        // Every hit intersects at least once; ties break by recency.
        assert!(hits.iter().all(|h| h.matches >= 1));
        assert!(hits[0].matches >= hits[1].matches);
        assert!(hits[1].matches >= hits[2].matches);
    }

    #[test]
    fn save_validates_sizes() {
        let (svc, agent) = service();
        let err = svc.save(&agent, "", &[], None, None).unwrap_err();
        assert_eq!(err.kind(), "bad-request");

        let big = "x".repeat(MAX_CONTENT_BYTES + 1);
        let err = svc.save(&agent, &big, &[], None, None).unwrap_err();
        assert_eq!(err.kind(), "bad-request");

        let many: Vec<String> = (0..=MAX_KEYWORDS).map(|i| format!("k{i}")).collect();
        let err = svc.save(&agent, "ok", &many, None, None).unwrap_err();
        assert_eq!(err.kind(), "bad-request");
    }

    #[test]
    fn get_by_ids_enforces_cap() {
        let (svc, agent) = service();
        let err = svc.get_by_ids(&agent, &[]).unwrap_err();
        assert_eq!(err.kind(), "bad-request");

        let too_many: Vec<i64> = (1..=21).collect();
        let err = svc.get_by_ids(&agent, &too_many).unwrap_err();
        assert_eq!(err.kind(), "bad-request");
    }

    #[test]
    fn search_limit_is_clamped() {
        let (svc, agent) = service();
        for i in 0..5 {
            svc.save(&agent, &format!("m{i}"), &kw(&["tag"]), None, None)
                .unwrap();
        }
        let hits = svc.search(&agent, &kw(&["tag"]), Some(2)).unwrap();
        assert_eq!(hits.len(), 2);
        // A limit of 0 is bumped to 1 rather than rejected.
        let hits = svc.search(&agent, &kw(&["tag"]), Some(0)).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
