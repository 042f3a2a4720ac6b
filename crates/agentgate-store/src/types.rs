// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Row types for every persisted entity.
//!
//! Status enums carry their own `as_str`/`parse` pairs; the store never
//! writes a status string that did not come from one of these enums, so a
//! parse failure on read indicates a corrupted database and surfaces as an
//! internal error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Agents ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AgentRow {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// First characters of the raw key, kept for display only.
    pub key_prefix: String,
    pub bio: Option<String>,
    pub webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub webhook_token: Option<String>,
    pub enabled: bool,
    /// When true, read-proxy responses skip the per-service simplifier.
    pub raw_results: bool,
    pub created_at: String,
}

/// Insert payload for a new agent.  The raw key never touches the store;
/// only its hash and display prefix do.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub bio: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
}

// ── Credentials ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub service: String,
    pub account_name: String,
    /// Opaque provider bag: tokens, expiry, client id/secret, instance,
    /// domain, identifier…  The vault owns its interpretation.
    pub data: serde_json::Value,
}

// ── Access control ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    All,
    Allowlist,
    Denylist,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Allowlist => "allowlist",
            Self::Denylist => "denylist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "allowlist" => Some(Self::Allowlist),
            "denylist" => Some(Self::Denylist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessPolicyRow {
    pub service: String,
    pub account_name: String,
    pub mode: AccessMode,
    pub agents: Vec<String>,
}

// ── Queue ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Approved,
    Executing,
    Completed,
    Failed,
    Rejected,
    Withdrawn,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "executing" => Some(Self::Executing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Rejected | Self::Withdrawn
        )
    }
}

/// One upstream call inside a queue entry's batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// When true, `body` is a base64 string decoded to raw bytes before
    /// sending (binary uploads).
    #[serde(default, rename = "binaryBase64", skip_serializing_if = "std::ops::Not::not")]
    pub binary_base64: bool,
}

/// Outcome of one upstream call, aligned by index with the entry's requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestResult {
    pub ok: bool,
    pub status: u16,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct QueueEntryRow {
    pub id: String,
    pub service: String,
    pub account_name: String,
    pub requests: Vec<WriteRequest>,
    pub comment: String,
    pub submitted_by: String,
    pub submitted_at: String,
    pub status: QueueStatus,
    pub reviewed_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<String>,
    pub results: Option<Vec<RequestResult>>,
    pub auto_approved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarningRow {
    pub id: i64,
    pub queue_id: String,
    pub warned_by: String,
    pub message: String,
    pub created_at: String,
}

// ── Messaging ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Rejected,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub from_agent: String,
    pub to_agent: String,
    pub body: String,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastRow {
    pub id: i64,
    pub from_agent: String,
    pub body: String,
    pub total_recipients: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastRecipientRow {
    pub broadcast_id: i64,
    pub to_agent: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Mementos ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MementoRow {
    pub id: i64,
    pub agent_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub content: String,
    pub created_at: String,
}

/// Search hit: memento metadata plus how many distinct stems matched.
#[derive(Debug, Clone, Serialize)]
pub struct MementoHit {
    pub id: i64,
    pub preview: String,
    pub matches: i64,
    pub created_at: String,
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub session_id: String,
    pub agent_name: String,
    pub created_at: String,
    pub last_seen: String,
}

// ── Inbound webhook log ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogRow {
    pub id: i64,
    pub source: String,
    pub event: String,
    pub delivery_id: Option<String>,
    pub status: String,
    pub detail: Option<String>,
    pub created_at: String,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
