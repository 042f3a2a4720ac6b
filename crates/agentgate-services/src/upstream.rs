// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Upstream URL and auth plumbing shared by the read proxy and the write
//! executor, plus the read proxy itself.
//!
//! Reads pass the upstream status and body through verbatim — the gateway
//! adds nothing and strips nothing.  Only transport-level failures become
//! gateway errors.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use agentgate_config::{service, ServiceDef};
use agentgate_store::{GateError, Result};

use crate::{blocked::BlockedPaths, resolver::AccessResolver, vault::CredentialVault};

/// A ready-to-apply upstream authorization.
#[derive(Debug, Clone)]
pub enum AuthSpec {
    Bearer(String),
    Basic { user: String, pass: String },
    Header { name: &'static str, value: String },
    /// Query-string credentials (google_search).
    Query(Vec<(String, String)>),
}

impl AuthSpec {
    pub fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Bearer(token) => req.bearer_auth(token),
            Self::Basic { user, pass } => req.basic_auth(user, Some(pass)),
            Self::Header { name, value } => req.header(*name, value),
            Self::Query(params) => req.query(params),
        }
    }
}

/// Resolve the upstream base URL for a service, consulting the credential
/// bag for per-account bases (mastodon instance, jira domain).
pub fn resolve_base_url(def: &ServiceDef, data: &Value) -> Result<String> {
    if let Some(base) = def.base_url {
        return Ok(base.to_string());
    }
    match def.key {
        "mastodon" => {
            let instance = data
                .get("instance")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    GateError::Unauthorized("mastodon credential has no instance".into())
                })?;
            let with_scheme = if instance.starts_with("http://") || instance.starts_with("https://")
            {
                instance.to_string()
            } else {
                format!("https://{instance}")
            };
            Ok(with_scheme.trim_end_matches('/').to_string())
        }
        "jira" => {
            let domain = data
                .get("domain")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| GateError::Unauthorized("jira credential has no domain".into()))?;
            if domain.starts_with("http://") || domain.starts_with("https://") {
                Ok(domain.trim_end_matches('/').to_string())
            } else if domain.contains('.') {
                Ok(format!("https://{domain}"))
            } else {
                Ok(format!("https://{domain}.atlassian.net"))
            }
        }
        other => Err(GateError::Internal(format!(
            "service {other} has no base url"
        ))),
    }
}

/// Upstream response carried through verbatim.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// The read side of the gateway: authenticated GET passthrough.
#[derive(Clone)]
pub struct ReadProxy {
    vault: CredentialVault,
    resolver: AccessResolver,
    blocked: Arc<BlockedPaths>,
    http: reqwest::Client,
}

impl ReadProxy {
    pub fn new(vault: CredentialVault, resolver: AccessResolver, blocked: Arc<BlockedPaths>) -> Self {
        Self {
            vault,
            resolver,
            blocked,
            http: reqwest::Client::builder()
                .user_agent("agentgate/1.2")
                .build()
                .unwrap_or_default(),
        }
    }

    /// Proxy a GET to `{base}/{path}?{query}` for the given agent.
    pub async fn get(
        &self,
        agent: &str,
        service_key: &str,
        account: &str,
        path: &str,
        query: Option<&str>,
    ) -> Result<UpstreamResponse> {
        let def = service(service_key)
            .ok_or_else(|| GateError::NotFound(format!("unknown service: {service_key}")))?;

        self.resolver.check(def.db_key, account, agent)?;

        if self.blocked.is_blocked(service_key, path) {
            return Err(GateError::Forbidden(format!(
                "path is blocked for {service_key}: {path}"
            )));
        }

        let data = self.vault.credential_data(def, account)?;
        let base = resolve_base_url(def, &data)?;
        let auth = self.vault.auth_spec(def, account).await?;

        let mut url = format!("{base}/{}", path.trim_start_matches('/'));
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        debug!(%agent, service = service_key, %account, %url, "proxying read");

        let resp = auth
            .apply(self.http.get(&url))
            .send()
            .await
            .map_err(|e| GateError::Internal(format!("upstream request failed: {e}")))?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|e| GateError::Internal(format!("upstream body read failed: {e}")))?
            .to_vec();

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
