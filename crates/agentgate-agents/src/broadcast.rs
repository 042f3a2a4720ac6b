// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Broadcasts: one message fanned out to every enabled agent with a webhook,
//! in parallel, each delivery bounded by the notifier's timeout.  The parent
//! row records the audience size; one child row per target records the
//! outcome.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::info;

use agentgate_config::MessagingMode;
use agentgate_notify::{Notifier, NotifyEvent, Outcome};
use agentgate_store::{
    AgentRow, BroadcastRecipientRow, BroadcastRow, DeliveryStatus, GateError, Result, Settings,
    Store,
};

use crate::messages::MAX_MESSAGE_BYTES;

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastOutcome {
    pub id: i64,
    pub total_recipients: i64,
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct BroadcastService {
    store: Arc<Store>,
    notifier: Notifier,
    settings: Settings,
}

impl BroadcastService {
    pub fn new(store: Arc<Store>, notifier: Notifier, settings: Settings) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }

    pub async fn broadcast(&self, from: &AgentRow, body: &str) -> Result<BroadcastOutcome> {
        if self.settings.messaging_mode() == MessagingMode::Off {
            return Err(GateError::MessagingDisabled);
        }
        if body.is_empty() {
            return Err(GateError::BadRequest("broadcast body is required".into()));
        }
        if body.len() > MAX_MESSAGE_BYTES {
            return Err(GateError::BadRequest(format!(
                "broadcast body exceeds {MAX_MESSAGE_BYTES} bytes"
            )));
        }

        let recipients: Vec<AgentRow> = self
            .store
            .agents_with_webhooks()?
            .into_iter()
            .filter(|a| !a.name.eq_ignore_ascii_case(&from.name))
            .collect();

        let row = self
            .store
            .insert_broadcast(&from.name, body, recipients.len() as i64)?;
        info!(
            id = row.id,
            from = %from.name,
            recipients = recipients.len(),
            "broadcast fan-out starting"
        );

        let deliveries = recipients.iter().map(|recipient| {
            let notifier = self.notifier.clone();
            let event = NotifyEvent::Broadcast {
                broadcast_id: row.id,
                from_agent: from.name.clone(),
            };
            let text = format!("broadcast from {}: {body}", from.name);
            async move {
                let outcome = notifier.notify(recipient, event, &text).await;
                (recipient.name.clone(), outcome)
            }
        });
        let outcomes = join_all(deliveries).await;

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Outcome::Delivered => {
                    self.store
                        .record_broadcast_recipient(row.id, &name, DeliveryStatus::Delivered, None)?;
                    delivered.push(name);
                }
                Outcome::NoWebhook => {
                    // Audience selection filters webhookless agents; a webhook
                    // removed mid-flight counts as a failed delivery.
                    self.store.record_broadcast_recipient(
                        row.id,
                        &name,
                        DeliveryStatus::Failed,
                        Some("no webhook configured"),
                    )?;
                    failed.push(name);
                }
                Outcome::Failed(error) => {
                    self.store.record_broadcast_recipient(
                        row.id,
                        &name,
                        DeliveryStatus::Failed,
                        Some(&error),
                    )?;
                    failed.push(name);
                }
            }
        }

        info!(
            id = row.id,
            delivered = delivered.len(),
            failed = failed.len(),
            "broadcast fan-out finished"
        );
        Ok(BroadcastOutcome {
            id: row.id,
            total_recipients: row.total_recipients,
            delivered,
            failed,
        })
    }

    /// The caller's own broadcasts, newest first.
    pub fn list(&self, agent: &AgentRow, limit: i64) -> Result<Vec<BroadcastRow>> {
        self.store.broadcasts_from(&agent.name, limit.clamp(1, 100))
    }

    /// One broadcast with its per-recipient outcomes, sender-scoped.
    pub fn get(
        &self,
        agent: &AgentRow,
        id: i64,
    ) -> Result<(BroadcastRow, Vec<BroadcastRecipientRow>)> {
        let row = self
            .store
            .broadcast(id)?
            .filter(|b| b.from_agent.eq_ignore_ascii_case(&agent.name))
            .ok_or_else(|| GateError::NotFound(format!("broadcast {id}")))?;
        let recipients = self.store.broadcast_recipients(id)?;
        Ok((row, recipients))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
