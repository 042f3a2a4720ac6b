// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Long-lived tool sessions.
//!
//! A session binds a client to one agent.  The persisted row is
//! authoritative; the in-memory half (tool registry + event channel) is a
//! cache that is lazily rebuilt after a restart.  Reconstruction is
//! single-flight per session id: concurrent arrivals share one rebuild
//! through a `OnceCell` completion handle, so at most one transport ever
//! exists per id.
//!
//! Limits: at most [`MAX_SESSIONS`] live in memory; sessions idle past
//! [`SESSION_TTL`] are closed by a sweeper that runs every
//! [`SWEEP_INTERVAL`].  `touch` updates the in-memory clock immediately but
//! persists at most once per [`TOUCH_DEBOUNCE`] per session.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{broadcast, Mutex, OnceCell};
use tracing::{debug, info, warn};

use agentgate_store::{new_id, AgentRow, GateError, Result, SessionRow, Store};

use crate::{build_registry, deps::ToolDeps, registry::ToolRegistry, ToolCall, ToolOutput, ToolSchema};

pub const MAX_SESSIONS: usize = 1000;
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const TOUCH_DEBOUNCE: Duration = Duration::from_secs(30);

/// The in-memory half of a session.
///
/// Event subscribers must hold only the `broadcast::Receiver`, not the entry
/// itself: when the manager drops the last `Arc`, the sender closes and
/// every open notification stream terminates.
pub struct SessionEntry {
    pub session_id: String,
    pub agent_name: String,
    registry: ToolRegistry,
    last_seen: StdMutex<Instant>,
    last_persisted: StdMutex<Instant>,
    event_tx: broadcast::Sender<Value>,
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("session_id", &self.session_id)
            .field("agent_name", &self.agent_name)
            .finish()
    }
}

impl SessionEntry {
    fn new(session_id: String, agent_name: String, registry: ToolRegistry) -> Self {
        let now = Instant::now();
        let (event_tx, _) = broadcast::channel(64);
        Self {
            session_id,
            agent_name,
            registry,
            last_seen: StdMutex::new(now),
            last_persisted: StdMutex::new(now),
            event_tx,
        }
    }

    /// Subscribe to server→client notifications for this session.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.event_tx.subscribe()
    }

    /// Push a notification; dropped when no stream is attached.
    pub fn push_event(&self, event: Value) {
        let _ = self.event_tx.send(event);
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    fn idle_for(&self) -> Duration {
        self.last_seen.lock().expect("session clock poisoned").elapsed()
    }
}

#[derive(Clone)]
pub struct SessionManager {
    deps: ToolDeps,
    sessions: Arc<Mutex<HashMap<String, Arc<SessionEntry>>>>,
    /// Single-flight reconstruction handles, keyed by session id and removed
    /// once the rebuild resolves.
    rebuilding: Arc<Mutex<HashMap<String, Arc<OnceCell<Option<Arc<SessionEntry>>>>>>>,
}

impl SessionManager {
    pub fn new(deps: ToolDeps) -> Self {
        Self {
            deps,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            rebuilding: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn store(&self) -> &Arc<Store> {
        &self.deps.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Open a fresh session for the agent.
    pub async fn initialize(&self, agent: &AgentRow) -> Result<Arc<SessionEntry>> {
        let mut sessions = self.sessions.lock().await;
        if sessions.len() >= MAX_SESSIONS {
            return Err(GateError::ServiceUnavailable(format!(
                "session limit reached ({MAX_SESSIONS})"
            )));
        }
        let session_id = new_id();
        self.store().insert_session(&session_id, &agent.name)?;
        let registry = build_registry(&self.deps, agent);
        let entry = Arc::new(SessionEntry::new(
            session_id.clone(),
            agent.name.clone(),
            registry,
        ));
        sessions.insert(session_id.clone(), entry.clone());
        info!(session = %session_id, agent = %agent.name, "session opened");
        Ok(entry)
    }

    /// Resolve an existing session id for the given agent, lazily rebuilding
    /// the in-memory half from the persisted row when necessary.
    pub async fn resume(&self, session_id: &str, agent: &AgentRow) -> Result<Arc<SessionEntry>> {
        if let Some(entry) = self.sessions.lock().await.get(session_id).cloned() {
            return self.bind_checked(entry, agent);
        }

        // Single-flight: every concurrent arrival for this id awaits the
        // same OnceCell; exactly one runs the rebuild.
        let cell = {
            let mut rebuilding = self.rebuilding.lock().await;
            rebuilding
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let rebuilt = cell
            .get_or_init(|| self.reconstruct(session_id.to_string()))
            .await
            .clone();
        self.rebuilding.lock().await.remove(session_id);

        match rebuilt {
            Some(entry) => self.bind_checked(entry, agent),
            None => Err(GateError::NotFound(format!("session {session_id}"))),
        }
    }

    /// The actual rebuild: returns `None` when there is nothing valid to
    /// rebuild (no row, or the bound agent no longer exists).
    async fn reconstruct(&self, session_id: String) -> Option<Arc<SessionEntry>> {
        let row: SessionRow = self.store().session(&session_id).ok().flatten()?;
        let agent = self.store().agent_by_name(&row.agent_name).ok().flatten()?;
        if !agent.enabled {
            return None;
        }

        let registry = build_registry(&self.deps, &agent);
        let entry = Arc::new(SessionEntry::new(
            session_id.clone(),
            agent.name.clone(),
            registry,
        ));

        let mut sessions = self.sessions.lock().await;
        // A racing initialize could have filled the slot; the map wins.
        let entry = sessions
            .entry(session_id.clone())
            .or_insert_with(|| entry.clone())
            .clone();
        drop(sessions);

        let _ = self.store().touch_session(&session_id);
        info!(session = %session_id, agent = %entry.agent_name, "session reconstructed");
        Some(entry)
    }

    fn bind_checked(&self, entry: Arc<SessionEntry>, agent: &AgentRow) -> Result<Arc<SessionEntry>> {
        if !entry.agent_name.eq_ignore_ascii_case(&agent.name) {
            return Err(GateError::Forbidden(
                "session belongs to a different agent".into(),
            ));
        }
        self.touch(&entry);
        Ok(entry)
    }

    // ── Touch / debounce ─────────────────────────────────────────────────────

    /// Update the in-memory clock now; persist at most once per
    /// [`TOUCH_DEBOUNCE`].
    pub fn touch(&self, entry: &SessionEntry) {
        *entry.last_seen.lock().expect("session clock poisoned") = Instant::now();
        let mut last_persisted = entry
            .last_persisted
            .lock()
            .expect("session clock poisoned");
        if last_persisted.elapsed() >= TOUCH_DEBOUNCE {
            *last_persisted = Instant::now();
            if let Err(e) = self.store().touch_session(&entry.session_id) {
                warn!(session = %entry.session_id, error = %e, "session touch failed");
            }
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Execute a tool call in the session.  The agent binding is re-read so
    /// a disabled or deleted agent loses access immediately.
    pub async fn dispatch(&self, entry: &SessionEntry, call: &ToolCall) -> ToolOutput {
        let agent = match self.store().agent_by_name(&entry.agent_name) {
            Ok(Some(agent)) if agent.enabled => agent,
            Ok(_) => {
                return ToolOutput::err(&GateError::Forbidden(
                    "agent is disabled or gone".into(),
                ))
            }
            Err(e) => return ToolOutput::err(&e),
        };
        self.touch(entry);
        debug!(session = %entry.session_id, tool = %call.name, "dispatching tool call");
        entry.registry.execute(&agent, call).await
    }

    // ── Administrative teardown ──────────────────────────────────────────────

    /// Close one session: drop the transport, forget the memory entry,
    /// delete the row.
    pub async fn kill(&self, session_id: &str) -> Result<bool> {
        let removed = self.sessions.lock().await.remove(session_id);
        let had_row = self.store().delete_session(session_id)?;
        if removed.is_some() || had_row {
            info!(session = %session_id, "session killed");
        }
        Ok(removed.is_some() || had_row)
    }

    /// Close every session bound to the agent.
    pub async fn kill_agent(&self, agent_name: &str) -> Result<usize> {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, entry| !entry.agent_name.eq_ignore_ascii_case(agent_name));
        drop(sessions);
        let n = self.store().delete_agent_sessions(agent_name)?;
        info!(agent = %agent_name, count = n, "agent sessions killed");
        Ok(n)
    }

    // ── Sweeper ──────────────────────────────────────────────────────────────

    /// One sweep pass: evict idle memory entries and delete their rows, plus
    /// rows orphaned by a previous process.  Rows whose memory entry is
    /// still live are skipped — the debounce can leave their persisted
    /// last-seen stale.
    pub async fn sweep(&self) {
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| entry.idle_for() >= SESSION_TTL)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        let live: Vec<String> = sessions.keys().cloned().collect();
        drop(sessions);

        for id in &expired {
            if let Err(e) = self.store().delete_session(id) {
                warn!(session = %id, error = %e, "session row delete failed");
            }
        }

        let cutoff = (chrono::Utc::now()
            - chrono::Duration::from_std(SESSION_TTL).expect("ttl fits"))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
        match self.store().sessions_seen_before(&cutoff) {
            Ok(rows) => {
                for row in rows {
                    if live.contains(&row.session_id) {
                        continue;
                    }
                    let _ = self.store().delete_session(&row.session_id);
                    debug!(session = %row.session_id, "stale session row swept");
                }
            }
            Err(e) => warn!(error = %e, "session sweep query failed"),
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "idle sessions swept");
        }
    }

    /// Run the sweeper until the process exits.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.sweep().await;
            }
        })
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use agentgate_agents::{BroadcastService, MementoService, MessageService};
    use agentgate_notify::Notifier;
    use agentgate_queue::{Executor, QueueService};
    use agentgate_services::{AccessResolver, BlockedPaths, CredentialVault, ReadProxy};
    use agentgate_store::{NewAgent, Settings, Store};

    use super::SessionManager;
    use crate::{ToolCall, ToolDeps};

    fn deps() -> ToolDeps {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let settings = Settings::new(store.clone());
        let notifier = Notifier::new(100);
        let resolver = AccessResolver::new(store.clone());
        let vault = CredentialVault::new(store.clone());
        let executor = Executor::new(vault.clone());
        let blocked = Arc::new(BlockedPaths::default());
        ToolDeps {
            store: store.clone(),
            queue: QueueService::new(
                store.clone(),
                resolver.clone(),
                executor,
                notifier.clone(),
                settings.clone(),
            ),
            messages: MessageService::new(store.clone(), notifier.clone(), settings.clone()),
            broadcasts: BroadcastService::new(store.clone(), notifier.clone(), settings),
            mementos: MementoService::new(store.clone()),
            proxy: ReadProxy::new(vault, resolver.clone(), blocked),
            resolver,
        }
    }

    fn add_agent(store: &Store, name: &str) -> agentgate_store::AgentRow {
        store
            .insert_agent(NewAgent {
                name: name.into(),
                key_hash: format!("h-{name}"),
                key_prefix: "agk_test".into(),
                bio: None,
                webhook_url: None,
                webhook_token: None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn initialize_persists_and_registers() {
        let deps = deps();
        let agent = add_agent(&deps.store, "alice");
        let manager = SessionManager::new(deps.clone());

        let entry = manager.initialize(&agent).await.unwrap();
        assert_eq!(manager.active_count().await, 1);
        assert!(deps.store.session(&entry.session_id).unwrap().is_some());

        // Fixed families are always present; no credentials → no category tools.
        let names: Vec<String> = entry.schemas().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["mementos", "messages", "queue", "services"]);
    }

    #[tokio::test]
    async fn category_tools_follow_accessible_services() {
        let deps = deps();
        deps.store
            .upsert_credential("github", "personal", &json!({"token": "t"}))
            .unwrap();
        deps.store
            .upsert_credential("brave", "default", &json!({"api_key": "k"}))
            .unwrap();
        let agent = add_agent(&deps.store, "alice");
        let manager = SessionManager::new(deps);

        let entry = manager.initialize(&agent).await.unwrap();
        let names: Vec<String> = entry.schemas().iter().map(|s| s.name.clone()).collect();
        assert!(names.contains(&"code".to_string()));
        assert!(names.contains(&"search".to_string()));
        assert!(!names.contains(&"social".to_string()));
    }

    #[tokio::test]
    async fn resume_rebuilds_after_restart() {
        let deps = deps();
        let agent = add_agent(&deps.store, "alice");

        // First manager opens the session, then "the process restarts":
        // a second manager shares the store but has empty memory.
        let first = SessionManager::new(deps.clone());
        let entry = first.initialize(&agent).await.unwrap();
        let session_id = entry.session_id.clone();

        let second = SessionManager::new(deps);
        assert_eq!(second.active_count().await, 0);
        let rebuilt = second.resume(&session_id, &agent).await.unwrap();
        assert_eq!(rebuilt.agent_name, "alice");
        assert_eq!(second.active_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_resume_yields_one_transport() {
        let deps = deps();
        let agent = add_agent(&deps.store, "alice");
        let first = SessionManager::new(deps.clone());
        let session_id = first.initialize(&agent).await.unwrap().session_id.clone();

        let second = SessionManager::new(deps);
        let (a, b) = tokio::join!(
            second.resume(&session_id, &agent),
            second.resume(&session_id, &agent),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b), "both arrivals must share one entry");
        assert_eq!(second.active_count().await, 1);
    }

    #[tokio::test]
    async fn resume_with_wrong_agent_is_forbidden() {
        let deps = deps();
        let alice = add_agent(&deps.store, "alice");
        let mallory = add_agent(&deps.store, "mallory");
        let manager = SessionManager::new(deps);

        let entry = manager.initialize(&alice).await.unwrap();
        let err = manager
            .resume(&entry.session_id, &mallory)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[tokio::test]
    async fn resume_unknown_session_is_not_found() {
        let deps = deps();
        let agent = add_agent(&deps.store, "alice");
        let manager = SessionManager::new(deps);
        let err = manager.resume("no-such-id", &agent).await.unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn kill_removes_memory_and_row() {
        let deps = deps();
        let agent = add_agent(&deps.store, "alice");
        let manager = SessionManager::new(deps.clone());
        let entry = manager.initialize(&agent).await.unwrap();
        let id = entry.session_id.clone();
        drop(entry);

        assert!(manager.kill(&id).await.unwrap());
        assert_eq!(manager.active_count().await, 0);
        assert!(deps.store.session(&id).unwrap().is_none());
        assert!(!manager.kill(&id).await.unwrap());
    }

    #[tokio::test]
    async fn dispatch_rechecks_agent_enabled() {
        let deps = deps();
        let agent = add_agent(&deps.store, "alice");
        let manager = SessionManager::new(deps.clone());
        let entry = manager.initialize(&agent).await.unwrap();

        deps.store.set_agent_enabled("alice", false).unwrap();
        let out = manager
            .dispatch(
                &entry,
                &ToolCall {
                    name: "services".into(),
                    args: json!({"action": "whoami"}),
                },
            )
            .await;
        assert!(out.is_error);
        assert_eq!(out.content["error"]["error"], "forbidden");
    }

    #[tokio::test]
    async fn dispatch_runs_whoami() {
        let deps = deps();
        let agent = add_agent(&deps.store, "alice");
        let manager = SessionManager::new(deps);
        let entry = manager.initialize(&agent).await.unwrap();

        let out = manager
            .dispatch(
                &entry,
                &ToolCall {
                    name: "services".into(),
                    args: json!({"action": "whoami"}),
                },
            )
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content["name"], "alice");
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let deps = deps();
        let agent = add_agent(&deps.store, "alice");
        let manager = SessionManager::new(deps);
        let entry = manager.initialize(&agent).await.unwrap();

        let mut rx = entry.subscribe();
        entry.push_event(json!({ "hello": "world" }));
        let event = rx.recv().await.unwrap();
        assert_eq!(event["hello"], "world");
    }

    #[tokio::test]
    async fn sweep_keeps_fresh_sessions() {
        let deps = deps();
        let agent = add_agent(&deps.store, "alice");
        let manager = SessionManager::new(deps.clone());
        let entry = manager.initialize(&agent).await.unwrap();
        drop(entry);

        manager.sweep().await;
        assert_eq!(manager.active_count().await, 1);
        assert_eq!(deps.store.list_sessions().unwrap().len(), 1);
    }
}
