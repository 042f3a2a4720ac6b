// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Credential vault: per-(service, account) token storage with
//! refresh-on-read semantics.
//!
//! The credential row's `data` bag is provider-shaped:
//!
//! | provider | fields |
//! |---|---|
//! | github | `token` |
//! | mastodon | `access_token`, `instance` |
//! | jira | `email`, `api_token`, `domain` |
//! | brave | `api_key` |
//! | google_search | `api_key`, `cx` |
//! | calendar / youtube | `refresh_token`, `client_id`, `client_secret`, `access_token?`, `expires_at?` |
//! | reddit / fitbit | same as above, refresh uses basic auth and rotates the refresh token |
//! | linkedin | same as google, refresh via linkedin token endpoint |
//! | bluesky | `identifier`, `app_password`, `accessJwt?`, `session_created_at?` |
//!
//! `expires_at` and `session_created_at` are unix seconds.  Refreshed tokens
//! are persisted before the spec is returned, so a crash between refresh and
//! use never loses a rotated refresh token.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use agentgate_config::{ServiceAuth, ServiceDef};
use agentgate_store::{GateError, Result, Store};

use crate::upstream::AuthSpec;

/// Refreshed tokens are considered expired this many seconds early.
const TOKEN_EXPIRY_SAFETY_SECS: i64 = 60;

/// Bluesky sessions are treated as valid for 90 minutes from creation.
/// The provider claims 120; the margin absorbs clock skew and long batches.
const BLUESKY_SESSION_SECS: i64 = 90 * 60;

#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<Store>,
    http: reqwest::Client,
}

impl CredentialVault {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            http: reqwest::Client::builder()
                .user_agent("agentgate/1.2")
                .build()
                .unwrap_or_default(),
        }
    }

    /// The credential bag for (service, account), or `NotFound`.
    pub fn credential_data(&self, def: &ServiceDef, account: &str) -> Result<Value> {
        self.store
            .credential(def.db_key, account)?
            .map(|row| row.data)
            .ok_or_else(|| {
                GateError::NotFound(format!(
                    "account {account} is not configured for {}",
                    def.key
                ))
            })
    }

    /// Produce a ready-to-apply auth spec, refreshing upstream tokens when
    /// the stored ones are expired.
    pub async fn auth_spec(&self, def: &ServiceDef, account: &str) -> Result<AuthSpec> {
        let data = self.credential_data(def, account)?;
        match def.auth {
            ServiceAuth::Token => {
                let token = str_field(&data, "access_token")
                    .or_else(|| str_field(&data, "token"))
                    .ok_or_else(|| missing(def, account, "token"))?;
                Ok(AuthSpec::Bearer(token))
            }
            ServiceAuth::Basic => {
                let email = str_field(&data, "email").ok_or_else(|| missing(def, account, "email"))?;
                let api_token = str_field(&data, "api_token")
                    .ok_or_else(|| missing(def, account, "api_token"))?;
                Ok(AuthSpec::Basic {
                    user: email,
                    pass: api_token,
                })
            }
            ServiceAuth::ApiKey => {
                let api_key =
                    str_field(&data, "api_key").ok_or_else(|| missing(def, account, "api_key"))?;
                if def.key == "google_search" {
                    let cx = str_field(&data, "cx").unwrap_or_default();
                    Ok(AuthSpec::Query(vec![
                        ("key".to_string(), api_key),
                        ("cx".to_string(), cx),
                    ]))
                } else {
                    Ok(AuthSpec::Header {
                        name: "X-Subscription-Token",
                        value: api_key,
                    })
                }
            }
            ServiceAuth::OAuth => self.oauth_token(def, account, data).await.map(AuthSpec::Bearer),
            ServiceAuth::AppPassword => {
                self.bluesky_jwt(def, account, data).await.map(AuthSpec::Bearer)
            }
        }
    }

    // ── OAuth refresh ────────────────────────────────────────────────────────

    async fn oauth_token(&self, def: &ServiceDef, account: &str, data: Value) -> Result<String> {
        if let Some(token) = str_field(&data, "access_token") {
            let expires_at = data.get("expires_at").and_then(Value::as_i64).unwrap_or(0);
            if chrono::Utc::now().timestamp() < expires_at {
                return Ok(token);
            }
        }
        self.refresh_oauth(def, account, data).await
    }

    async fn refresh_oauth(&self, def: &ServiceDef, account: &str, mut data: Value) -> Result<String> {
        let refresh_token = str_field(&data, "refresh_token")
            .ok_or_else(|| expired(def, account, "no refresh token stored"))?;
        let client_id = str_field(&data, "client_id")
            .ok_or_else(|| expired(def, account, "no client_id stored"))?;
        let client_secret = str_field(&data, "client_secret").unwrap_or_default();

        // Provider conventions: google and linkedin take client credentials
        // in the form body; reddit and fitbit demand HTTP basic auth.
        let (token_url, use_basic) = match def.key {
            "calendar" | "youtube" => ("https://oauth2.googleapis.com/token", false),
            "reddit" => ("https://www.reddit.com/api/v1/access_token", true),
            "linkedin" => ("https://www.linkedin.com/oauth/v2/accessToken", false),
            "fitbit" => ("https://api.fitbit.com/oauth2/token", true),
            other => {
                return Err(GateError::Internal(format!(
                    "service {other} has no refresh flow"
                )))
            }
        };

        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token),
        ];
        let mut req = self.http.post(token_url);
        if use_basic {
            req = req.basic_auth(&client_id, Some(&client_secret));
        } else {
            form.push(("client_id".to_string(), client_id));
            form.push(("client_secret".to_string(), client_secret));
        }

        debug!(service = def.key, %account, "refreshing oauth token");
        let issued_at = chrono::Utc::now().timestamp();
        let resp = req
            .form(&form)
            .send()
            .await
            .map_err(|e| expired(def, account, &format!("token endpoint unreachable: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(expired(
                def,
                account,
                &format!("token endpoint returned {status}"),
            ));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| expired(def, account, &format!("bad token response: {e}")))?;

        let access_token = str_field(&body, "access_token")
            .ok_or_else(|| expired(def, account, "token response had no access_token"))?;
        let expires_in = body.get("expires_in").and_then(Value::as_i64).unwrap_or(3600);

        if let Value::Object(bag) = &mut data {
            bag.insert("access_token".into(), json!(access_token));
            bag.insert(
                "expires_at".into(),
                json!(issued_at + expires_in - TOKEN_EXPIRY_SAFETY_SECS),
            );
            // Some providers rotate the refresh token on every exchange.
            if let Some(rotated) = str_field(&body, "refresh_token") {
                bag.insert("refresh_token".into(), json!(rotated));
            }
        }
        self.store.upsert_credential(def.db_key, account, &data)?;
        info!(service = def.key, %account, "oauth token refreshed");
        Ok(access_token)
    }

    // ── Bluesky app-password sessions ────────────────────────────────────────

    async fn bluesky_jwt(&self, def: &ServiceDef, account: &str, mut data: Value) -> Result<String> {
        if let Some(jwt) = str_field(&data, "accessJwt") {
            let created = data
                .get("session_created_at")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if chrono::Utc::now().timestamp() - created < BLUESKY_SESSION_SECS {
                return Ok(jwt);
            }
        }

        let identifier = str_field(&data, "identifier")
            .ok_or_else(|| expired(def, account, "no identifier stored"))?;
        let password = str_field(&data, "app_password")
            .ok_or_else(|| expired(def, account, "no app password stored"))?;

        debug!(%account, "creating bluesky session");
        let resp = self
            .http
            .post("https://bsky.social/xrpc/com.atproto.server.createSession")
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await
            .map_err(|e| expired(def, account, &format!("createSession unreachable: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(expired(def, account, &format!("createSession returned {status}")));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| expired(def, account, &format!("bad session response: {e}")))?;
        let jwt = str_field(&body, "accessJwt")
            .ok_or_else(|| expired(def, account, "session response had no accessJwt"))?;

        if let Value::Object(bag) = &mut data {
            bag.insert("accessJwt".into(), json!(jwt));
            if let Some(refresh) = str_field(&body, "refreshJwt") {
                bag.insert("refreshJwt".into(), json!(refresh));
            }
            if let Some(did) = str_field(&body, "did") {
                bag.insert("did".into(), json!(did));
            }
            bag.insert(
                "session_created_at".into(),
                json!(chrono::Utc::now().timestamp()),
            );
        }
        self.store.upsert_credential(def.db_key, account, &data)?;
        info!(%account, "bluesky session created");
        Ok(jwt)
    }
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn missing(def: &ServiceDef, account: &str, field: &str) -> GateError {
    GateError::Unauthorized(format!(
        "credential for {}/{account} has no {field}",
        def.key
    ))
}

fn expired(def: &ServiceDef, account: &str, detail: &str) -> GateError {
    GateError::Unauthorized(format!(
        "no valid token for {}/{account}: {detail}",
        def.key
    ))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use agentgate_config::service;
    use agentgate_store::Store;

    use super::CredentialVault;
    use crate::upstream::AuthSpec;

    fn vault_with(store: Store) -> CredentialVault {
        CredentialVault::new(Arc::new(store))
    }

    #[tokio::test]
    async fn github_static_token_becomes_bearer() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_credential("github", "personal", &json!({"token": "ghp_abc"}))
            .unwrap();
        let vault = vault_with(store);
        let spec = vault
            .auth_spec(service("github").unwrap(), "personal")
            .await
            .unwrap();
        assert!(matches!(spec, AuthSpec::Bearer(t) if t == "ghp_abc"));
    }

    #[tokio::test]
    async fn jira_uses_basic_auth() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_credential(
                "jira",
                "work",
                &json!({"email": "me@example.com", "api_token": "tok", "domain": "acme"}),
            )
            .unwrap();
        let vault = vault_with(store);
        let spec = vault.auth_spec(service("jira").unwrap(), "work").await.unwrap();
        assert!(matches!(spec, AuthSpec::Basic { user, .. } if user == "me@example.com"));
    }

    #[tokio::test]
    async fn brave_uses_subscription_header() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_credential("brave", "default", &json!({"api_key": "bk"}))
            .unwrap();
        let vault = vault_with(store);
        let spec = vault
            .auth_spec(service("brave").unwrap(), "default")
            .await
            .unwrap();
        assert!(matches!(
            spec,
            AuthSpec::Header { name: "X-Subscription-Token", value } if value == "bk"
        ));
    }

    #[tokio::test]
    async fn google_search_uses_query_params() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_credential("google_search", "default", &json!({"api_key": "k", "cx": "c"}))
            .unwrap();
        let vault = vault_with(store);
        let spec = vault
            .auth_spec(service("google_search").unwrap(), "default")
            .await
            .unwrap();
        match spec {
            AuthSpec::Query(params) => {
                assert!(params.contains(&("key".to_string(), "k".to_string())));
                assert!(params.contains(&("cx".to_string(), "c".to_string())));
            }
            other => panic!("expected query auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let vault = vault_with(Store::open_in_memory().unwrap());
        let err = vault
            .auth_spec(service("github").unwrap(), "nobody")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn calendar_reads_under_google_calendar_db_key() {
        let store = Store::open_in_memory().unwrap();
        // A token valid far into the future skips the refresh path entirely.
        store
            .upsert_credential(
                "google_calendar",
                "personal",
                &json!({"access_token": "ya29", "expires_at": 9_999_999_999i64}),
            )
            .unwrap();
        let vault = vault_with(store);
        let spec = vault
            .auth_spec(service("calendar").unwrap(), "personal")
            .await
            .unwrap();
        assert!(matches!(spec, AuthSpec::Bearer(t) if t == "ya29"));
    }

    #[tokio::test]
    async fn fresh_bluesky_session_is_reused() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_credential(
                "bluesky",
                "alice",
                &json!({
                    "identifier": "alice.bsky.social",
                    "app_password": "xxxx",
                    "accessJwt": "jwt-fresh",
                    "session_created_at": chrono::Utc::now().timestamp(),
                }),
            )
            .unwrap();
        let vault = vault_with(store);
        let spec = vault
            .auth_spec(service("bluesky").unwrap(), "alice")
            .await
            .unwrap();
        assert!(matches!(spec, AuthSpec::Bearer(t) if t == "jwt-fresh"));
    }

    #[tokio::test]
    async fn expired_oauth_without_refresh_token_is_unauthorized() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_credential(
                "reddit",
                "me",
                &json!({"access_token": "old", "expires_at": 0}),
            )
            .unwrap();
        let vault = vault_with(store);
        let err = vault
            .auth_spec(service("reddit").unwrap(), "me")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
    }
}
