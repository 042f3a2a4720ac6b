// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Queue lifecycle orchestration.
//!
//! ```text
//!                      ┌──────────► rejected
//!                      │
//!   submit ──► pending ┼──────────► withdrawn
//!                      │
//!                      └► approved ──► executing ──► completed
//!                                          │
//!                                          └───────► failed
//! ```
//!
//! The store's conditional updates arbitrate every transition; this service
//! adds validation, bypass, execution, and notification on top.

use std::sync::Arc;

use tracing::{error, info, warn};

use agentgate_config::service;
use agentgate_notify::{Notifier, NotifyEvent};
use agentgate_services::AccessResolver;
use agentgate_store::{
    AgentRow, GateError, QueueStatus, Result, Settings, Store, WarningRow, WriteRequest,
};

use crate::{executor::Executor, view::{QueueView, SubmitOutcome}};

const ALLOWED_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

#[derive(Clone)]
pub struct QueueService {
    store: Arc<Store>,
    resolver: AccessResolver,
    executor: Executor,
    notifier: Notifier,
    settings: Settings,
}

impl QueueService {
    pub fn new(
        store: Arc<Store>,
        resolver: AccessResolver,
        executor: Executor,
        notifier: Notifier,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            resolver,
            executor,
            notifier,
            settings,
        }
    }

    // ── Submit ───────────────────────────────────────────────────────────────

    /// Validate and persist a write batch.  Under bypass the entry executes
    /// inline and the terminal view is returned in the same call.
    pub async fn submit(
        &self,
        agent: &AgentRow,
        service_key: &str,
        account: &str,
        mut requests: Vec<WriteRequest>,
        comment: &str,
    ) -> Result<SubmitOutcome> {
        let def = service(service_key)
            .filter(|def| def.write_capable)
            .ok_or_else(|| {
                GateError::BadRequest(format!("invalid service for writes: {service_key}"))
            })?;

        if self.store.credential(def.db_key, account)?.is_none() {
            return Err(GateError::NotFound(format!(
                "account not configured: {service_key}/{account}"
            )));
        }

        self.resolver.check(def.db_key, account, &agent.name)?;

        if requests.is_empty() {
            return Err(GateError::BadRequest("requests must not be empty".into()));
        }
        if comment.trim().is_empty() {
            return Err(GateError::BadRequest("comment is required".into()));
        }
        for request in &mut requests {
            if request.path.trim().is_empty() {
                return Err(GateError::BadRequest(
                    "every request needs a string path".into(),
                ));
            }
            let method = request.method.to_ascii_uppercase();
            if !ALLOWED_METHODS.contains(&method.as_str()) {
                return Err(GateError::BadRequest(format!(
                    "method not allowed in queue: {}",
                    request.method
                )));
            }
            request.method = method;
        }

        let entry = self.store.insert_queue_entry(
            def.key,
            account,
            &requests,
            comment,
            &agent.name,
        )?;
        info!(id = %entry.id, service = def.key, %account, agent = %agent.name, "queue entry submitted");

        if self
            .resolver
            .bypasses_approval(def.db_key, account, &agent.name)?
        {
            info!(id = %entry.id, agent = %agent.name, "bypass enabled, executing inline");
            self.store.approve_entry(&entry.id, true)?;
            let view = self.execute_entry(&entry.id).await?;
            return Ok(SubmitOutcome {
                id: view.id.clone(),
                status: view.status,
                message: format!("executed immediately ({})", view.status.as_str()),
                bypassed: true,
                results: view.results,
            });
        }

        Ok(SubmitOutcome {
            id: entry.id,
            status: QueueStatus::Pending,
            message: "queued for human approval".into(),
            bypassed: false,
            results: None,
        })
    }

    // ── Review operations ────────────────────────────────────────────────────

    /// Human approval.  The batch executes on a spawned task; the returned
    /// handle lets callers that care (the CLI) await the terminal view,
    /// while fire-and-forget callers just drop it.
    pub fn approve(&self, id: &str) -> Result<tokio::task::JoinHandle<Result<QueueView>>> {
        let entry = self
            .store
            .queue_entry(id)?
            .ok_or_else(|| GateError::NotFound(format!("queue entry {id}")))?;
        if !self.store.approve_entry(id, false)? {
            return Err(GateError::IllegalState(format!(
                "cannot approve a {} entry",
                entry.status.as_str()
            )));
        }
        info!(%id, "queue entry approved");
        let service = self.clone();
        let id = id.to_string();
        Ok(tokio::spawn(async move {
            let result = service.execute_entry(&id).await;
            if let Err(e) = &result {
                error!(%id, error = %e, "queue execution failed");
            }
            result
        }))
    }

    pub fn reject(&self, id: &str, reason: &str) -> Result<()> {
        let entry = self
            .store
            .queue_entry(id)?
            .ok_or_else(|| GateError::NotFound(format!("queue entry {id}")))?;
        if !self.store.reject_entry(id, reason)? {
            return Err(GateError::IllegalState(format!(
                "cannot reject a {} entry",
                entry.status.as_str()
            )));
        }
        info!(%id, %reason, "queue entry rejected");
        self.notify_submitter(&entry.submitted_by, id, "rejected");
        Ok(())
    }

    /// Agent-initiated withdrawal of their own pending entry.
    pub fn withdraw(
        &self,
        agent: &AgentRow,
        service_key: &str,
        account: &str,
        id: &str,
        reason: Option<&str>,
    ) -> Result<QueueView> {
        if !self.settings.agent_withdraw_enabled() {
            return Err(GateError::Forbidden(
                "agent withdrawal is disabled".into(),
            ));
        }
        let entry = self.entry_scoped(id, service_key, account)?;
        if !entry.submitted_by.eq_ignore_ascii_case(&agent.name) {
            return Err(GateError::Forbidden(
                "only the submitting agent may withdraw an entry".into(),
            ));
        }
        if !self.store.withdraw_entry(id, &entry.submitted_by, reason)? {
            return Err(GateError::IllegalState(format!(
                "cannot withdraw a {} entry",
                entry.status.as_str()
            )));
        }
        info!(%id, agent = %agent.name, "queue entry withdrawn");
        self.view(id)
    }

    // ── Warnings ─────────────────────────────────────────────────────────────

    /// Peer warning on a pending entry.  Does not change queue state; the
    /// submitter is notified best-effort.
    pub async fn warn(&self, agent: &AgentRow, id: &str, message: &str) -> Result<i64> {
        let entry = self
            .store
            .queue_entry(id)?
            .ok_or_else(|| GateError::NotFound(format!("queue entry {id}")))?;
        if entry.submitted_by.eq_ignore_ascii_case(&agent.name) {
            return Err(GateError::BadRequest(
                "cannot warn on your own queue entry".into(),
            ));
        }
        if message.trim().is_empty() {
            return Err(GateError::BadRequest("warning message is required".into()));
        }
        let warning_id = self.store.insert_warning(id, &agent.name, message)?;
        info!(%id, warned_by = %agent.name, "queue warning recorded");

        if let Ok(Some(submitter)) = self.store.agent_by_name(&entry.submitted_by) {
            let text = format!(
                "{} flagged your pending request {id}: {message}",
                agent.name
            );
            self.notifier
                .notify(
                    &submitter,
                    NotifyEvent::QueueWarning {
                        queue_id: id.to_string(),
                        warned_by: agent.name.clone(),
                    },
                    &text,
                )
                .await;
        }
        Ok(warning_id)
    }

    pub fn warnings(&self, agent: &AgentRow, id: &str) -> Result<Vec<WarningRow>> {
        // Existence check doubles as visibility: shared visibility off hides
        // other agents' entries entirely.
        self.visible_entry(agent, id)?;
        self.store.warnings_for(id)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn status(&self, agent: &AgentRow, service_key: &str, account: &str, id: &str) -> Result<QueueView> {
        let entry = self.entry_scoped(id, service_key, account)?;
        self.check_visibility(agent, &entry.submitted_by, id)?;
        Ok(entry.into())
    }

    /// Listing, visibility per the shared-queue-visibility setting.
    pub fn list(
        &self,
        agent: &AgentRow,
        service_account: Option<(&str, &str)>,
    ) -> Result<Vec<QueueView>> {
        let submitted_by = if self.settings.shared_queue_visibility() {
            None
        } else {
            Some(agent.name.as_str())
        };
        let entries = self.store.list_queue_entries(submitted_by, service_account)?;
        Ok(entries.into_iter().map(QueueView::from).collect())
    }

    pub fn view(&self, id: &str) -> Result<QueueView> {
        self.store
            .queue_entry(id)?
            .map(QueueView::from)
            .ok_or_else(|| GateError::NotFound(format!("queue entry {id}")))
    }

    // ── Execution ────────────────────────────────────────────────────────────

    /// approved → executing → terminal.  Used inline by the bypass path and
    /// from a spawned task by the normal approval path.
    pub async fn execute_entry(&self, id: &str) -> Result<QueueView> {
        if !self.store.begin_execution(id)? {
            return Err(GateError::IllegalState(format!(
                "entry {id} is not approved"
            )));
        }
        let entry = self
            .store
            .queue_entry(id)?
            .ok_or_else(|| GateError::NotFound(format!("queue entry {id}")))?;

        let (status, results) = self.executor.run(&entry).await;
        self.store.finish_execution(id, status, &results)?;
        info!(%id, status = status.as_str(), results = results.len(), "queue entry executed");

        self.notify_submitter(&entry.submitted_by, id, status.as_str());
        self.view(id)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn entry_scoped(
        &self,
        id: &str,
        service_key: &str,
        account: &str,
    ) -> Result<agentgate_store::QueueEntryRow> {
        let entry = self
            .store
            .queue_entry(id)?
            .ok_or_else(|| GateError::NotFound(format!("queue entry {id}")))?;
        if entry.service != service_key || entry.account_name != account {
            return Err(GateError::NotFound(format!(
                "queue entry {id} does not belong to {service_key}/{account}"
            )));
        }
        Ok(entry)
    }

    fn visible_entry(&self, agent: &AgentRow, id: &str) -> Result<()> {
        let entry = self
            .store
            .queue_entry(id)?
            .ok_or_else(|| GateError::NotFound(format!("queue entry {id}")))?;
        self.check_visibility(agent, &entry.submitted_by, id)
    }

    fn check_visibility(&self, agent: &AgentRow, submitted_by: &str, id: &str) -> Result<()> {
        if self.settings.shared_queue_visibility()
            || submitted_by.eq_ignore_ascii_case(&agent.name)
        {
            Ok(())
        } else {
            // Not-found rather than forbidden: entry ids stay unguessable.
            Err(GateError::NotFound(format!("queue entry {id}")))
        }
    }

    fn notify_submitter(&self, submitter: &str, id: &str, status: &str) {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let submitter = submitter.to_string();
        let id = id.to_string();
        let status = status.to_string();
        tokio::spawn(async move {
            match store.agent_by_name(&submitter) {
                Ok(Some(agent)) => {
                    let text = format!("your queued request {id} is now {status}");
                    notifier
                        .notify(
                            &agent,
                            NotifyEvent::QueueResolved {
                                queue_id: id,
                                status,
                            },
                            &text,
                        )
                        .await;
                }
                Ok(None) => {}
                Err(e) => warn!(%submitter, error = %e, "submitter lookup failed"),
            }
        });
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
