// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    3050
}

fn default_webhook_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port.  Overridden by the `PORT` environment variable.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the SQLite database.  Overridden by
    /// `AGENTGATE_DATA_DIR`.  Default: `~/.agentgate/`.
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-call timeout for outbound webhook deliveries, in milliseconds.
    /// Overridden by `AGENTGATE_WEBHOOK_TIMEOUT_MS`.
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Additional blocked read-path patterns per service key.  Each entry is
    /// a regular expression matched against the upstream path.  These extend
    /// the built-in denylist (DM endpoints, account deletion, admin routes);
    /// they cannot remove built-ins.
    ///
    /// ```yaml
    /// proxy:
    ///   blocked_paths:
    ///     github: ["^/user/emails"]
    ///     mastodon: ["^/api/v1/filters"]
    /// ```
    #[serde(default)]
    pub blocked_paths: HashMap<String, Vec<String>>,
}

impl Config {
    /// Resolved data directory: config value, else `~/.agentgate/`.
    pub fn data_dir(&self) -> PathBuf {
        self.server.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".agentgate")
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_3050() {
        assert_eq!(Config::default().server.port, 3050);
    }

    #[test]
    fn default_webhook_timeout_is_10s() {
        assert_eq!(Config::default().webhooks.timeout_ms, 10_000);
    }

    #[test]
    fn data_dir_defaults_under_home() {
        let cfg = Config::default();
        assert!(cfg.data_dir().ends_with(".agentgate"));
    }

    #[test]
    fn yaml_roundtrip_preserves_blocked_paths() {
        let yaml = r#"
proxy:
  blocked_paths:
    github: ["^/user/emails"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            cfg.proxy.blocked_paths.get("github").unwrap(),
            &vec!["^/user/emails".to_string()]
        );
    }

    #[test]
    fn empty_yaml_parses_to_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.server.port, 3050);
        assert!(cfg.proxy.blocked_paths.is_empty());
    }
}
