// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Best-effort outbound webhook delivery.
//!
//! Every notification is a JSON POST to the recipient agent's configured
//! webhook URL with the agent's webhook token as bearer (when present) and a
//! hard per-call timeout.  Nothing here ever raises: a failed delivery is
//! logged and reported as an [`Outcome`], and the caller decides whether the
//! outcome matters (broadcasts record it, direct messages ignore it —
//! delivery is an abstract status, not a receipt).

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use agentgate_store::AgentRow;

/// Human summaries are clipped to this many characters before sending.
const MAX_SUMMARY_CHARS: usize = 500;

/// What a notification is about.  Serialized as the `type` field plus
/// event-specific payload fields.
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    /// A direct message was delivered to the agent.
    Message {
        message_id: i64,
        from_agent: String,
    },
    /// Another agent flagged the recipient's pending queue entry.
    QueueWarning {
        queue_id: String,
        warned_by: String,
    },
    /// A queue entry submitted by the recipient reached a terminal state.
    QueueResolved {
        queue_id: String,
        status: String,
    },
    /// A broadcast from another agent.
    Broadcast {
        broadcast_id: i64,
        from_agent: String,
    },
    /// An inbound third-party event fanned out to all agents.
    ServiceEvent {
        service: String,
        event: String,
        data: Value,
    },
}

impl NotifyEvent {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::QueueWarning { .. } => "queue_warning",
            Self::QueueResolved { .. } => "queue_resolved",
            Self::Broadcast { .. } => "broadcast",
            Self::ServiceEvent { .. } => "service_event",
        }
    }

    fn fields(&self) -> Value {
        match self {
            Self::Message {
                message_id,
                from_agent,
            } => json!({ "message_id": message_id, "from": from_agent }),
            Self::QueueWarning { queue_id, warned_by } => {
                json!({ "queue_id": queue_id, "warned_by": warned_by })
            }
            Self::QueueResolved { queue_id, status } => {
                json!({ "queue_id": queue_id, "status": status })
            }
            Self::Broadcast {
                broadcast_id,
                from_agent,
            } => json!({ "broadcast_id": broadcast_id, "from": from_agent }),
            Self::ServiceEvent {
                service,
                event,
                data,
            } => json!({ "service": service, "event": event, "data": data }),
        }
    }
}

/// Delivery outcome for one webhook call.
#[derive(Debug, Clone)]
pub enum Outcome {
    Delivered,
    /// The agent has no webhook URL — not an error.
    NoWebhook,
    Failed(String),
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Shared notifier.  Cheap to clone; the reqwest client pools connections.
#[derive(Clone)]
pub struct Notifier {
    http: reqwest::Client,
    timeout: Duration,
}

impl Notifier {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            // Per-request timeout is applied in notify(); the client-level
            // timeout is a backstop for connection establishment.
            http: reqwest::Client::builder()
                .user_agent("agentgate/1.2")
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Deliver `event` to `agent`'s webhook.  `text` is the human summary,
    /// clipped to 500 characters.  Never raises.
    pub async fn notify(&self, agent: &AgentRow, event: NotifyEvent, text: &str) -> Outcome {
        let Some(url) = agent.webhook_url.as_deref().filter(|u| !u.is_empty()) else {
            return Outcome::NoWebhook;
        };

        let mut payload = json!({
            "type": event.type_name(),
            "text": clip(text, MAX_SUMMARY_CHARS),
            "mode": "now",
        });
        if let (Value::Object(dst), Value::Object(src)) = (&mut payload, event.fields()) {
            for (k, v) in src {
                dst.entry(k).or_insert(v);
            }
        }

        let mut req = self.http.post(url).timeout(self.timeout).json(&payload);
        if let Some(token) = agent.webhook_token.as_deref().filter(|t| !t.is_empty()) {
            req = req.bearer_auth(token);
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(agent = %agent.name, "webhook delivered");
                Outcome::Delivered
            }
            Ok(resp) => {
                let status = resp.status();
                warn!(agent = %agent.name, %status, "webhook rejected");
                Outcome::Failed(format!("status {status}"))
            }
            Err(e) => {
                warn!(agent = %agent.name, error = %e, "webhook delivery failed");
                Outcome::Failed(e.to_string())
            }
        }
    }
}

/// Character-boundary-safe clipping.
fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
