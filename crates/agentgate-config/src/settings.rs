// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Process-wide posture for agent-to-agent messaging.
///
/// Persisted in the settings table under `messaging_mode`; `supervised` is
/// the boot default so a fresh install never delivers unreviewed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagingMode {
    /// All message operations fail.
    Off,
    /// Messages are queued pending human approval.
    #[default]
    Supervised,
    /// Messages deliver immediately.
    Open,
}

impl MessagingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Supervised => "supervised",
            Self::Open => "open",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::Off),
            "supervised" => Some(Self::Supervised),
            "open" => Some(Self::Open),
            _ => None,
        }
    }
}
