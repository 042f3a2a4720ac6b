// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Serialize;

use agentgate_store::{QueueEntryRow, QueueStatus, RequestResult};

/// The wire view of a queue entry, returned by status, list, and withdraw.
#[derive(Debug, Clone, Serialize)]
pub struct QueueView {
    pub id: String,
    pub service: String,
    pub account: String,
    pub status: QueueStatus,
    pub comment: String,
    pub request_count: usize,
    pub submitted_by: String,
    pub submitted_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RequestResult>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_approved: bool,
}

impl From<QueueEntryRow> for QueueView {
    fn from(row: QueueEntryRow) -> Self {
        Self {
            id: row.id,
            service: row.service,
            account: row.account_name,
            status: row.status,
            comment: row.comment,
            request_count: row.requests.len(),
            submitted_by: row.submitted_by,
            submitted_at: row.submitted_at,
            reviewed_at: row.reviewed_at,
            rejection_reason: row.rejection_reason,
            completed_at: row.completed_at,
            results: row.results,
            auto_approved: row.auto_approved,
        }
    }
}

/// What a submit call returns: the pending acknowledgement, or — on the
/// bypass fast path — the full terminal view.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub id: String,
    pub status: QueueStatus,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bypassed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RequestResult>>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_view_omits_empty_fields() {
        let row = QueueEntryRow {
            id: "q-1".into(),
            service: "github".into(),
            account_name: "personal".into(),
            requests: vec![],
            comment: "c".into(),
            submitted_by: "alice".into(),
            submitted_at: "2026-01-01 00:00:00".into(),
            status: QueueStatus::Pending,
            reviewed_at: None,
            rejection_reason: None,
            completed_at: None,
            results: None,
            auto_approved: false,
        };
        let json = serde_json::to_value(QueueView::from(row)).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("results").is_none());
        assert!(json.get("auto_approved").is_none());
        assert!(json.get("reviewed_at").is_none());
    }

    #[test]
    fn submit_outcome_shows_bypassed_only_when_true() {
        let outcome = SubmitOutcome {
            id: "q-1".into(),
            status: QueueStatus::Pending,
            message: "queued".into(),
            bypassed: false,
            results: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("bypassed").is_none());

        let outcome = SubmitOutcome {
            bypassed: true,
            status: QueueStatus::Completed,
            ..outcome
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["bypassed"], true);
    }
}
