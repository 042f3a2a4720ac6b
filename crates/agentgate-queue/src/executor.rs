// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Deterministic replay of an approved entry's request batch.
//!
//! Requests execute strictly in index order and stop at the first element
//! whose upstream response is not 2xx.  The result array stays aligned with
//! the request array up to and including the failing element.  Failures to
//! obtain a token are synthesized as 401 results without touching upstream;
//! transport failures are synthesized as 502.

use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, warn};

use agentgate_config::{service, ServiceDef};
use agentgate_services::{resolve_base_url, CredentialVault};
use agentgate_store::{QueueEntryRow, QueueStatus, RequestResult, WriteRequest};

#[derive(Clone)]
pub struct Executor {
    vault: CredentialVault,
    http: reqwest::Client,
}

impl Executor {
    pub fn new(vault: CredentialVault) -> Self {
        Self {
            vault,
            http: reqwest::Client::builder()
                .user_agent("agentgate/1.2")
                .build()
                .unwrap_or_default(),
        }
    }

    /// Run the entry's batch.  Returns the terminal status and the aligned
    /// results (truncated at the first failure).
    pub async fn run(&self, entry: &QueueEntryRow) -> (QueueStatus, Vec<RequestResult>) {
        let Some(def) = service(&entry.service) else {
            // Submit validation makes this unreachable; degrade gracefully.
            return (
                QueueStatus::Failed,
                vec![synthetic(500, &format!("unknown service: {}", entry.service))],
            );
        };

        let mut results = Vec::with_capacity(entry.requests.len());
        for (index, request) in entry.requests.iter().enumerate() {
            let result = self.run_one(def, &entry.account_name, request).await;
            let ok = result.ok;
            debug!(
                entry = %entry.id,
                index,
                status = result.status,
                ok,
                "executed queue request"
            );
            results.push(result);
            if !ok {
                warn!(entry = %entry.id, index, "batch stopped on first failure");
                break;
            }
        }

        let status = if results.iter().all(|r| r.ok) && results.len() == entry.requests.len() {
            QueueStatus::Completed
        } else {
            QueueStatus::Failed
        };
        (status, results)
    }

    /// One upstream call.  The credential vault is consulted per call so a
    /// token that expires mid-batch refreshes transparently.
    async fn run_one(&self, def: &ServiceDef, account: &str, request: &WriteRequest) -> RequestResult {
        let auth = match self.vault.auth_spec(def, account).await {
            Ok(auth) => auth,
            Err(e) => return synthetic(401, &e.to_string()),
        };
        let data = match self.vault.credential_data(def, account) {
            Ok(data) => data,
            Err(e) => return synthetic(401, &e.to_string()),
        };
        let base = match resolve_base_url(def, &data) {
            Ok(base) => base,
            Err(e) => return synthetic(401, &e.to_string()),
        };

        let url = format!("{base}/{}", request.path.trim_start_matches('/'));
        let method: reqwest::Method = match request.method.parse() {
            Ok(m) => m,
            Err(_) => return synthetic(400, &format!("bad method: {}", request.method)),
        };

        let mut req = auth.apply(self.http.request(method, &url));
        if let Some(headers) = &request.headers {
            for (name, value) in headers {
                req = req.header(name, value);
            }
        }

        if request.binary_base64 {
            let Some(encoded) = request.body.as_ref().and_then(Value::as_str) else {
                return synthetic(400, "binaryBase64 requires a base64 string body");
            };
            let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(bytes) => bytes,
                Err(e) => return synthetic(400, &format!("invalid base64 body: {e}")),
            };
            let has_content_type = request
                .headers
                .as_ref()
                .is_some_and(|h| h.keys().any(|k| k.eq_ignore_ascii_case("content-type")));
            if !has_content_type {
                req = req.header(reqwest::header::CONTENT_TYPE, "application/octet-stream");
            }
            req = req.body(bytes);
        } else if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return synthetic(502, &format!("upstream request failed: {e}")),
        };

        let status = resp.status().as_u16();
        let ok = resp.status().is_success();
        let text = resp.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        RequestResult { ok, status, body }
    }
}

fn synthetic(status: u16, message: &str) -> RequestResult {
    RequestResult {
        ok: false,
        status,
        body: json!({ "error": message }),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use agentgate_services::CredentialVault;
    use agentgate_store::{QueueStatus, Store, WriteRequest};

    use super::{synthetic, Executor};

    fn entry_for(service: &str, requests: Vec<WriteRequest>) -> agentgate_store::QueueEntryRow {
        agentgate_store::QueueEntryRow {
            id: "q-1".into(),
            service: service.into(),
            account_name: "personal".into(),
            requests,
            comment: "c".into(),
            submitted_by: "alice".into(),
            submitted_at: "2026-01-01 00:00:00".into(),
            status: QueueStatus::Executing,
            reviewed_at: None,
            rejection_reason: None,
            completed_at: None,
            results: None,
            auto_approved: false,
        }
    }

    fn post(path: &str) -> WriteRequest {
        WriteRequest {
            method: "POST".into(),
            path: path.into(),
            body: Some(json!({"k": "v"})),
            headers: None,
            binary_base64: false,
        }
    }

    #[test]
    fn synthetic_results_are_failures() {
        let r = synthetic(401, "no token");
        assert!(!r.ok);
        assert_eq!(r.status, 401);
        assert_eq!(r.body["error"], "no token");
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_touching_upstream() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let executor = Executor::new(CredentialVault::new(store));
        let entry = entry_for("github", vec![post("/repos/o/r/issues"), post("/second")]);

        let (status, results) = executor.run(&entry).await;
        assert_eq!(status, QueueStatus::Failed);
        // Stop-on-first-failure: the second request never ran.
        assert_eq!(results.len(), 1);
        assert!(!results[0].ok);
        assert_eq!(results[0].status, 401);
    }

    #[tokio::test]
    async fn invalid_base64_body_is_a_local_400() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store
            .upsert_credential("github", "personal", &json!({"token": "t"}))
            .unwrap();
        let executor = Executor::new(CredentialVault::new(store));
        let entry = entry_for(
            "github",
            vec![WriteRequest {
                method: "POST".into(),
                path: "/upload".into(),
                body: Some(json!("!!! not base64 !!!")),
                headers: None,
                binary_base64: true,
            }],
        );

        let (status, results) = executor.run(&entry).await;
        assert_eq!(status, QueueStatus::Failed);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, 400);
    }

    #[tokio::test]
    async fn unknown_service_degrades_to_single_failure() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let executor = Executor::new(CredentialVault::new(store));
        let entry = entry_for("myspace", vec![post("/x")]);
        let (status, results) = executor.run(&entry).await;
        assert_eq!(status, QueueStatus::Failed);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, 500);
    }
}
