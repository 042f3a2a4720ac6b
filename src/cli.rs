// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "agentgate",
    about = "Human-in-the-loop write-mediation gateway for autonomous agents",
    version
)]
pub struct Cli {
    /// Explicit config file (YAML)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway (the default when no subcommand is given)
    Serve,
    /// Manage agents and their bearer keys
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Manage upstream credentials
    Credential {
        #[command(subcommand)]
        command: CredentialCommands,
    },
    /// Manage access policies and bypass flags
    Access {
        #[command(subcommand)]
        command: AccessCommands,
    },
    /// Review the approval queue (the human side of the loop)
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Review supervised agent messages
    Messages {
        #[command(subcommand)]
        command: MessageCommands,
    },
    /// Read and write runtime settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Inspect and kill tool sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Inspect inbound webhook activity
    Webhooks {
        #[command(subcommand)]
        command: WebhookCommands,
    },
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Create an agent; prints the bearer key exactly once
    Add {
        name: String,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        webhook_url: Option<String>,
        #[arg(long)]
        webhook_token: Option<String>,
    },
    List,
    Enable { name: String },
    Disable { name: String },
    /// Update (or clear) the agent's notification webhook
    SetWebhook {
        name: String,
        #[arg(long)]
        webhook_url: Option<String>,
        #[arg(long)]
        webhook_token: Option<String>,
    },
    /// Remove the agent row; history referencing the name survives
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum CredentialCommands {
    /// Set the credential bag for (service, account); data is a JSON object
    Set {
        service: String,
        account: String,
        #[arg(long)]
        data: String,
    },
    List,
    Delete { service: String, account: String },
}

#[derive(Subcommand)]
pub enum AccessCommands {
    /// Set the policy mode for (service, account)
    Set {
        service: String,
        account: String,
        #[arg(long, value_parser = ["all", "allowlist", "denylist"])]
        mode: String,
        /// Comma-separated agent names for allowlist/denylist modes
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,
    },
    /// Toggle the per-agent approval bypass
    Bypass {
        service: String,
        account: String,
        agent: String,
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List entries, optionally filtered by status
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Approve a pending entry and execute it immediately
    Approve { id: String },
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Delete a terminal entry (warnings cascade)
    Purge { id: String },
}

#[derive(Subcommand)]
pub enum MessageCommands {
    /// List messages awaiting review
    Pending,
    Approve { id: i64 },
    Reject {
        id: i64,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    Get { key: String },
    Set { key: String, value: String },
    /// Remove a key, falling back to its built-in default
    Unset { key: String },
    List,
}

#[derive(Subcommand)]
pub enum SessionCommands {
    List,
    Kill { session_id: String },
    /// Kill every session bound to an agent
    KillAgent { agent: String },
}

#[derive(Subcommand)]
pub enum WebhookCommands {
    /// Show recent inbound webhook delivery decisions
    Log {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}
