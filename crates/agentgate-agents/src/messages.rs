// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Direct messages between agents.
//!
//! The process-wide messaging mode decides what `send` does:
//!
//! - `off` — every message operation fails with `messaging-disabled`.
//! - `open` — the row is `delivered` immediately; a webhook push is
//!   attempted when the recipient has one.  An absent webhook is a silent
//!   no-op: delivery is an abstract status, not a receipt.
//! - `supervised` — the row is `pending` and invisible to the recipient
//!   until a human approves it.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use agentgate_config::MessagingMode;
use agentgate_notify::{Notifier, NotifyEvent};
use agentgate_store::{
    AgentRow, GateError, MessageRow, MessageStatus, Result, Settings, Store,
};

/// Direct message bodies are capped at 10 KiB.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024;

#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub id: i64,
    pub status: MessageStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagingStatus {
    pub mode: MessagingMode,
    pub unread: usize,
    /// The agent's own messages still waiting for human review.
    pub awaiting_review: usize,
}

#[derive(Clone)]
pub struct MessageService {
    store: Arc<Store>,
    notifier: Notifier,
    settings: Settings,
}

impl MessageService {
    pub fn new(store: Arc<Store>, notifier: Notifier, settings: Settings) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }

    fn require_enabled(&self) -> Result<MessagingMode> {
        match self.settings.messaging_mode() {
            MessagingMode::Off => Err(GateError::MessagingDisabled),
            mode => Ok(mode),
        }
    }

    // ── Agent operations ─────────────────────────────────────────────────────

    pub async fn send(&self, from: &AgentRow, to: &str, body: &str) -> Result<SendReceipt> {
        let mode = self.require_enabled()?;

        let recipient = self
            .store
            .agent_by_name(to)?
            .ok_or_else(|| GateError::NotFound(format!("no such agent: {to}")))?;
        if recipient.name.eq_ignore_ascii_case(&from.name) {
            return Err(GateError::BadRequest(
                "cannot send a message to yourself".into(),
            ));
        }
        if !recipient.enabled {
            return Err(GateError::NotFound(format!("no such agent: {to}")));
        }
        if body.is_empty() {
            return Err(GateError::BadRequest("message body is required".into()));
        }
        if body.len() > MAX_MESSAGE_BYTES {
            return Err(GateError::BadRequest(format!(
                "message body exceeds {MAX_MESSAGE_BYTES} bytes"
            )));
        }

        match mode {
            MessagingMode::Open => {
                let row = self.store.insert_message(
                    &from.name,
                    &recipient.name,
                    body,
                    MessageStatus::Delivered,
                )?;
                info!(from = %from.name, to = %recipient.name, id = row.id, "message delivered");
                self.push_notification(&recipient, &row).await;
                Ok(SendReceipt {
                    id: row.id,
                    status: MessageStatus::Delivered,
                    message: "delivered".into(),
                })
            }
            MessagingMode::Supervised => {
                let row = self.store.insert_message(
                    &from.name,
                    &recipient.name,
                    body,
                    MessageStatus::Pending,
                )?;
                info!(from = %from.name, to = %recipient.name, id = row.id, "message pending review");
                Ok(SendReceipt {
                    id: row.id,
                    status: MessageStatus::Pending,
                    message: "queued for human review".into(),
                })
            }
            MessagingMode::Off => unreachable!("require_enabled filtered off"),
        }
    }

    pub fn inbox(&self, agent: &AgentRow, unread_only: bool) -> Result<Vec<MessageRow>> {
        self.require_enabled()?;
        self.store.messages_for(&agent.name, unread_only)
    }

    pub fn mark_read(&self, agent: &AgentRow, id: i64) -> Result<()> {
        self.require_enabled()?;
        if self.store.mark_message_read(id, &agent.name)? {
            Ok(())
        } else {
            Err(GateError::NotFound(format!(
                "message {id} not found or already read"
            )))
        }
    }

    pub fn status(&self, agent: &AgentRow) -> Result<MessagingStatus> {
        let mode = self.settings.messaging_mode();
        if mode == MessagingMode::Off {
            return Ok(MessagingStatus {
                mode,
                unread: 0,
                awaiting_review: 0,
            });
        }
        let unread = self.store.messages_for(&agent.name, true)?.len();
        let awaiting_review = self
            .store
            .messages_from(&agent.name)?
            .iter()
            .filter(|m| m.status == MessageStatus::Pending)
            .count();
        Ok(MessagingStatus {
            mode,
            unread,
            awaiting_review,
        })
    }

    /// Enabled agents the caller may address, i.e. everyone but themselves.
    pub fn messageable(&self, agent: &AgentRow) -> Result<Vec<AgentRow>> {
        self.require_enabled()?;
        Ok(self
            .store
            .list_agents()?
            .into_iter()
            .filter(|a| a.enabled && !a.name.eq_ignore_ascii_case(&agent.name))
            .collect())
    }

    // ── Human review operations ──────────────────────────────────────────────

    pub fn pending(&self) -> Result<Vec<MessageRow>> {
        self.store.pending_messages()
    }

    /// Human approval of a supervised message: deliver and notify.
    pub async fn approve(&self, id: i64) -> Result<()> {
        let row = self
            .store
            .message(id)?
            .ok_or_else(|| GateError::NotFound(format!("message {id}")))?;
        if !self.store.deliver_message(id)? {
            return Err(GateError::IllegalState(format!(
                "message {id} is {} — only pending messages can be approved",
                row.status.as_str()
            )));
        }
        info!(id, to = %row.to_agent, "message approved");
        if let Some(recipient) = self.store.agent_by_name(&row.to_agent)? {
            let delivered = self
                .store
                .message(id)?
                .ok_or_else(|| GateError::Internal("approved message vanished".into()))?;
            self.push_notification(&recipient, &delivered).await;
        }
        Ok(())
    }

    pub fn reject(&self, id: i64, reason: &str) -> Result<()> {
        let row = self
            .store
            .message(id)?
            .ok_or_else(|| GateError::NotFound(format!("message {id}")))?;
        if !self.store.reject_message(id, reason)? {
            return Err(GateError::IllegalState(format!(
                "message {id} is {} — only pending messages can be rejected",
                row.status.as_str()
            )));
        }
        info!(id, %reason, "message rejected");
        Ok(())
    }

    async fn push_notification(&self, recipient: &AgentRow, row: &MessageRow) {
        // Best-effort; the message row is already delivered either way.
        self.notifier
            .notify(
                recipient,
                NotifyEvent::Message {
                    message_id: row.id,
                    from_agent: row.from_agent.clone(),
                },
                &format!("new message from {}", row.from_agent),
            )
            .await;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentgate_config::MessagingMode;
    use agentgate_notify::Notifier;
    use agentgate_store::{
        MessageStatus, NewAgent, Settings, Store, KEY_MESSAGING_MODE,
    };

    use super::{MessageService, MAX_MESSAGE_BYTES};

    fn service() -> (MessageService, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let settings = Settings::new(store.clone());
        (
            MessageService::new(store.clone(), Notifier::new(100), settings),
            store,
        )
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

    fn set_mode(store: &Store, mode: MessagingMode) {
        store.set_setting(KEY_MESSAGING_MODE, mode.as_str()).unwrap();
    }

    #[tokio::test]
    async fn off_mode_fails_all_operations() {
        let (svc, store) = service();
        let alice = add_agent(&store, "alice");
        add_agent(&store, "bob");
        set_mode(&store, MessagingMode::Off);

        let err = svc.send(&alice, "bob", "hi").await.unwrap_err();
        assert_eq!(err.kind(), "messaging-disabled");
        assert_eq!(svc.inbox(&alice, false).unwrap_err().kind(), "messaging-disabled");
        assert_eq!(svc.mark_read(&alice, 1).unwrap_err().kind(), "messaging-disabled");
    }

    #[tokio::test]
    async fn supervised_send_creates_pending_invisible_row() {
        let (svc, store) = service();
        let alice = add_agent(&store, "alice");
        let bob = add_agent(&store, "bob");
        // Supervised is the default mode.

        let receipt = svc.send(&alice, "bob", "hi").await.unwrap();
        assert_eq!(receipt.status, MessageStatus::Pending);
        assert!(svc.inbox(&bob, false).unwrap().is_empty());

        svc.approve(receipt.id).await.unwrap();
        let inbox = svc.inbox(&bob, false).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].status, MessageStatus::Delivered);

        // mark_read succeeds once, then reports not-found.
        svc.mark_read(&bob, receipt.id).unwrap();
        assert_eq!(svc.mark_read(&bob, receipt.id).unwrap_err().kind(), "not-found");
    }

    #[tokio::test]
    async fn open_send_delivers_immediately_without_webhook() {
        let (svc, store) = service();
        let alice = add_agent(&store, "alice");
        add_agent(&store, "bob");
        set_mode(&store, MessagingMode::Open);

        let receipt = svc.send(&alice, "bob", "hi").await.unwrap();
        assert_eq!(receipt.status, MessageStatus::Delivered);
        assert_eq!(store.pending_messages().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn send_to_self_is_rejected_case_insensitively() {
        let (svc, store) = service();
        let alice = add_agent(&store, "Alice");
        set_mode(&store, MessagingMode::Open);
        let err = svc.send(&alice, "alice", "hi").await.unwrap_err();
        assert_eq!(err.kind(), "bad-request");
    }

    #[tokio::test]
    async fn send_to_unknown_agent_is_not_found() {
        let (svc, store) = service();
        let alice = add_agent(&store, "alice");
        set_mode(&store, MessagingMode::Open);
        let err = svc.send(&alice, "ghost", "hi").await.unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (svc, store) = service();
        let alice = add_agent(&store, "alice");
        add_agent(&store, "bob");
        set_mode(&store, MessagingMode::Open);
        let big = "x".repeat(MAX_MESSAGE_BYTES + 1);
        let err = svc.send(&alice, "bob", &big).await.unwrap_err();
        assert_eq!(err.kind(), "bad-request");
    }

    #[tokio::test]
    async fn reject_records_reason_and_blocks_delivery() {
        let (svc, store) = service();
        let alice = add_agent(&store, "alice");
        let bob = add_agent(&store, "bob");

        let receipt = svc.send(&alice, "bob", "spam").await.unwrap();
        svc.reject(receipt.id, "inappropriate").unwrap();
        assert!(svc.inbox(&bob, false).unwrap().is_empty());

        // A second review action must fail.
        let err = svc.approve(receipt.id).await.unwrap_err();
        assert_eq!(err.kind(), "illegal-state");
    }

    #[tokio::test]
    async fn status_counts_unread_and_awaiting_review() {
        let (svc, store) = service();
        let alice = add_agent(&store, "alice");
        let bob = add_agent(&store, "bob");

        let r1 = svc.send(&alice, "bob", "one").await.unwrap();
        svc.send(&alice, "bob", "two").await.unwrap();
        svc.approve(r1.id).await.unwrap();

        let alice_status = svc.status(&alice).unwrap();
        assert_eq!(alice_status.awaiting_review, 1);

        let bob_status = svc.status(&bob).unwrap();
        assert_eq!(bob_status.unread, 1);
    }

    #[tokio::test]
    async fn messageable_excludes_self_and_disabled() {
        let (svc, store) = service();
        let alice = add_agent(&store, "alice");
        add_agent(&store, "bob");
        add_agent(&store, "carol");
        store.set_agent_enabled("carol", false).unwrap();
        set_mode(&store, MessagingMode::Open);

        let peers = svc.messageable(&alice).unwrap();
        let names: Vec<_> = peers.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["bob"]);
    }
}
