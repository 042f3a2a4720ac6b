// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The fixed upstream service registry.
//!
//! Keys are stable identifiers and cannot be renamed without a data
//! migration — queue entries, credentials, and access policies all reference
//! services by key.  `calendar` is the public key for the Google Calendar
//! service; its rows are stored under the db key `google_calendar`.

use serde::Serialize;

/// Tool category a service belongs to.  One category tool is registered per
/// category the agent can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Code,
    Social,
    Personal,
    Search,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Social => "social",
            Self::Personal => "personal",
            Self::Search => "search",
        }
    }
}

/// How the upstream authenticates requests.  The credential vault maps each
/// style to a concrete header (and refresh flow where applicable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAuth {
    /// Static bearer token from the credential row (github, mastodon).
    Token,
    /// OAuth access token with refresh-token exchange on expiry
    /// (calendar, youtube, reddit, linkedin, fitbit).
    OAuth,
    /// Bluesky app-password session (accessJwt, recreated when stale).
    AppPassword,
    /// HTTP basic auth from email + API token (jira).
    Basic,
    /// API key in a provider-specific header or query parameter
    /// (brave, google_search).
    ApiKey,
}

/// One upstream service known to the gateway.
#[derive(Debug, Clone, Copy)]
pub struct ServiceDef {
    /// Public key used in URLs and tool arguments.
    pub key: &'static str,
    /// Storage key; differs from `key` only for `calendar`.
    pub db_key: &'static str,
    pub category: ServiceCategory,
    pub auth: ServiceAuth,
    /// Static upstream base URL.  `None` means the base is derived from the
    /// credential row (mastodon instance, jira domain).
    pub base_url: Option<&'static str>,
    /// Whether queue submissions are accepted for this service.
    pub write_capable: bool,
}

const REGISTRY: &[ServiceDef] = &[
    ServiceDef {
        key: "github",
        db_key: "github",
        category: ServiceCategory::Code,
        auth: ServiceAuth::Token,
        base_url: Some("https://api.github.com"),
        write_capable: true,
    },
    ServiceDef {
        key: "bluesky",
        db_key: "bluesky",
        category: ServiceCategory::Social,
        auth: ServiceAuth::AppPassword,
        base_url: Some("https://bsky.social"),
        write_capable: true,
    },
    ServiceDef {
        key: "reddit",
        db_key: "reddit",
        category: ServiceCategory::Social,
        auth: ServiceAuth::OAuth,
        base_url: Some("https://oauth.reddit.com"),
        write_capable: true,
    },
    ServiceDef {
        key: "mastodon",
        db_key: "mastodon",
        category: ServiceCategory::Social,
        auth: ServiceAuth::Token,
        base_url: None,
        write_capable: true,
    },
    ServiceDef {
        key: "calendar",
        db_key: "google_calendar",
        category: ServiceCategory::Personal,
        auth: ServiceAuth::OAuth,
        base_url: Some("https://www.googleapis.com/calendar/v3"),
        write_capable: true,
    },
    ServiceDef {
        key: "youtube",
        db_key: "youtube",
        category: ServiceCategory::Social,
        auth: ServiceAuth::OAuth,
        base_url: Some("https://www.googleapis.com/youtube/v3"),
        write_capable: true,
    },
    ServiceDef {
        key: "linkedin",
        db_key: "linkedin",
        category: ServiceCategory::Social,
        auth: ServiceAuth::OAuth,
        base_url: Some("https://api.linkedin.com"),
        write_capable: true,
    },
    ServiceDef {
        key: "jira",
        db_key: "jira",
        category: ServiceCategory::Code,
        auth: ServiceAuth::Basic,
        base_url: None,
        write_capable: true,
    },
    ServiceDef {
        key: "fitbit",
        db_key: "fitbit",
        category: ServiceCategory::Personal,
        auth: ServiceAuth::OAuth,
        base_url: Some("https://api.fitbit.com"),
        write_capable: true,
    },
    ServiceDef {
        key: "brave",
        db_key: "brave",
        category: ServiceCategory::Search,
        auth: ServiceAuth::ApiKey,
        base_url: Some("https://api.search.brave.com/res/v1"),
        write_capable: false,
    },
    ServiceDef {
        key: "google_search",
        db_key: "google_search",
        category: ServiceCategory::Search,
        auth: ServiceAuth::ApiKey,
        base_url: Some("https://www.googleapis.com/customsearch/v1"),
        write_capable: false,
    },
];

/// All registered services in registry order.
pub fn services() -> &'static [ServiceDef] {
    REGISTRY
}

/// Look up a service by its public key.
pub fn service(key: &str) -> Option<&'static ServiceDef> {
    REGISTRY.iter().find(|s| s.key == key)
}

/// The write-capable subset, i.e. services the queue accepts.
pub fn write_services() -> impl Iterator<Item = &'static ServiceDef> {
    REGISTRY.iter().filter(|s| s.write_capable)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
