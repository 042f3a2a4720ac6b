// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-service blocked read paths.
//!
//! Agents proxy reads with the human's own credentials, so a handful of
//! privacy-sensitive endpoints stay off limits: private conversations,
//! account deletion, admin surfaces.  The built-ins below carry that intent;
//! operators extend (never shrink) the list via `proxy.blocked_paths` in the
//! config file.

use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

struct ServicePatterns {
    service: &'static str,
    patterns: &'static [&'static str],
}

const BUILTIN: &[ServicePatterns] = &[
    ServicePatterns {
        service: "github",
        patterns: &["^/notifications/threads", "^/user/emails"],
    },
    ServicePatterns {
        service: "bluesky",
        patterns: &[
            "^/xrpc/chat\\.bsky\\.convo\\.",
            "^/xrpc/com\\.atproto\\.server\\.deleteAccount",
        ],
    },
    ServicePatterns {
        service: "reddit",
        patterns: &["^/message/", "^/api/v1/me/prefs"],
    },
    ServicePatterns {
        service: "mastodon",
        patterns: &["^/api/v1/conversations", "^/api/v1/admin/"],
    },
    ServicePatterns {
        service: "linkedin",
        patterns: &["^/v2/messages"],
    },
    ServicePatterns {
        service: "jira",
        patterns: &["^/rest/api/[23]/user/delete"],
    },
];

/// Compiled denylist, built once at startup.
pub struct BlockedPaths {
    by_service: HashMap<String, Vec<Regex>>,
}

impl BlockedPaths {
    /// Compile built-ins plus config extensions.  Invalid configured patterns
    /// are skipped with a warning rather than failing startup.
    pub fn new(extra: &HashMap<String, Vec<String>>) -> Self {
        let mut by_service: HashMap<String, Vec<Regex>> = HashMap::new();
        for sp in BUILTIN {
            let compiled = sp
                .patterns
                .iter()
                .map(|p| Regex::new(p).expect("builtin blocked pattern must compile"))
                .collect();
            by_service.insert(sp.service.to_string(), compiled);
        }
        for (service, patterns) in extra {
            let bucket = by_service.entry(service.clone()).or_default();
            for pattern in patterns {
                match Regex::new(pattern) {
                    Ok(re) => bucket.push(re),
                    Err(e) => {
                        warn!(%service, %pattern, error = %e, "ignoring invalid blocked-path pattern");
                    }
                }
            }
        }
        Self { by_service }
    }

    /// True when the path is off limits for the service.  Paths are matched
    /// with a leading slash.
    pub fn is_blocked(&self, service_key: &str, path: &str) -> bool {
        let normalized = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        self.by_service
            .get(service_key)
            .map(|patterns| patterns.iter().any(|re| re.is_match(&normalized)))
            .unwrap_or(false)
    }
}

impl Default for BlockedPaths {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
