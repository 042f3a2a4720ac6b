// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use rand::RngCore;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agentgate_config::MessagingMode;
use agentgate_gateway::{hash_key, serve, AppState};
use agentgate_store::{AccessMode, NewAgent, QueueStatus, Store};

use cli::{
    AccessCommands, AgentCommands, Cli, Commands, CredentialCommands, MessageCommands,
    QueueCommands, SessionCommands, SettingsCommands, WebhookCommands,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = agentgate_config::load(cli.config.as_deref())?;
    let db_path = config.data_dir().join(agentgate_store::DB_FILE);
    let store = Arc::new(Store::open(&db_path).context("opening database")?);
    let state = AppState::new(&config, store);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(state, config.server.port).await,
        Commands::Agent { command } => agent_cmd(&state, command),
        Commands::Credential { command } => credential_cmd(&state, command),
        Commands::Access { command } => access_cmd(&state, command),
        Commands::Queue { command } => queue_cmd(&state, command).await,
        Commands::Messages { command } => messages_cmd(&state, command).await,
        Commands::Settings { command } => settings_cmd(&state, command),
        Commands::Sessions { command } => sessions_cmd(&state, command).await,
        Commands::Webhooks { command } => webhooks_cmd(&state, command),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

// ── Agents ────────────────────────────────────────────────────────────────────

/// Raw keys look like `agk_<48 hex chars>`; only the hash is stored.
fn generate_key() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("agk_{}", hex::encode(bytes))
}

fn agent_cmd(state: &AppState, command: AgentCommands) -> anyhow::Result<()> {
    match command {
        AgentCommands::Add {
            name,
            bio,
            webhook_url,
            webhook_token,
        } => {
            let raw_key = generate_key();
            let agent = state.store.insert_agent(NewAgent {
                name,
                key_hash: hash_key(&raw_key),
                key_prefix: raw_key[..12].to_string(),
                bio,
                webhook_url,
                webhook_token,
            })?;
            println!("Agent created: {}", agent.name);
            println!();
            println!("Bearer key (shown once — save it now!):");
            println!("  {raw_key}");
            println!();
            println!("Usage:  Authorization: Bearer {raw_key}");
            Ok(())
        }
        AgentCommands::List => {
            for agent in state.store.list_agents()? {
                println!(
                    "{:<24} {:<10} key={}…  webhook={}",
                    agent.name,
                    if agent.enabled { "enabled" } else { "disabled" },
                    agent.key_prefix,
                    agent.webhook_url.as_deref().unwrap_or("-"),
                );
            }
            Ok(())
        }
        AgentCommands::Enable { name } => {
            if state.store.set_agent_enabled(&name, true)? {
                println!("✓ {name} enabled");
            } else {
                bail!("no such agent: {name}");
            }
            Ok(())
        }
        AgentCommands::Disable { name } => {
            if state.store.set_agent_enabled(&name, false)? {
                println!("✓ {name} disabled");
            } else {
                bail!("no such agent: {name}");
            }
            Ok(())
        }
        AgentCommands::SetWebhook {
            name,
            webhook_url,
            webhook_token,
        } => {
            if state.store.update_agent_webhook(
                &name,
                webhook_url.as_deref(),
                webhook_token.as_deref(),
            )? {
                println!(
                    "✓ webhook for {name}: {}",
                    webhook_url.as_deref().unwrap_or("(cleared)")
                );
            } else {
                bail!("no such agent: {name}");
            }
            Ok(())
        }
        AgentCommands::Delete { name } => {
            if state.store.delete_agent(&name)? {
                println!("✓ {name} deleted (history preserved)");
            } else {
                bail!("no such agent: {name}");
            }
            Ok(())
        }
    }
}

// ── Credentials ───────────────────────────────────────────────────────────────

fn credential_cmd(state: &AppState, command: CredentialCommands) -> anyhow::Result<()> {
    match command {
        CredentialCommands::Set {
            service,
            account,
            data,
        } => {
            let def = agentgate_config::service(&service)
                .with_context(|| format!("unknown service: {service}"))?;
            let data: serde_json::Value =
                serde_json::from_str(&data).context("parsing --data as JSON")?;
            state.store.upsert_credential(def.db_key, &account, &data)?;
            println!("✓ credential stored for {service}/{account}");
            Ok(())
        }
        CredentialCommands::List => {
            for (service, account) in state.store.list_credentials()? {
                println!("{service:<20} {account}");
            }
            Ok(())
        }
        CredentialCommands::Delete { service, account } => {
            let def = agentgate_config::service(&service)
                .with_context(|| format!("unknown service: {service}"))?;
            if state.store.delete_credential(def.db_key, &account)? {
                println!("✓ credential removed for {service}/{account}");
            } else {
                bail!("no credential for {service}/{account}");
            }
            Ok(())
        }
    }
}

// ── Access control ────────────────────────────────────────────────────────────

fn access_cmd(state: &AppState, command: AccessCommands) -> anyhow::Result<()> {
    match command {
        AccessCommands::Set {
            service,
            account,
            mode,
            agents,
        } => {
            let def = agentgate_config::service(&service)
                .with_context(|| format!("unknown service: {service}"))?;
            let mode = AccessMode::parse(&mode).context("invalid mode")?;
            state
                .store
                .set_access_policy(def.db_key, &account, mode, &agents)?;
            println!("✓ {service}/{account}: mode={} agents={agents:?}", mode.as_str());
            Ok(())
        }
        AccessCommands::Bypass {
            service,
            account,
            agent,
            state: flag,
        } => {
            let def = agentgate_config::service(&service)
                .with_context(|| format!("unknown service: {service}"))?;
            let on = flag == "on";
            state
                .store
                .set_bypass_auth(def.db_key, &account, &agent, on)?;
            println!(
                "✓ bypass {} for {agent} on {service}/{account}",
                if on { "enabled" } else { "disabled" }
            );
            Ok(())
        }
    }
}

// ── Queue review ──────────────────────────────────────────────────────────────

async fn queue_cmd(state: &AppState, command: QueueCommands) -> anyhow::Result<()> {
    match command {
        QueueCommands::List { status } => {
            let entries = match status.as_deref() {
                Some(status) => {
                    let status = QueueStatus::parse(status)
                        .with_context(|| format!("invalid status: {status}"))?;
                    state.store.queue_entries_with_status(status)?
                }
                None => state.store.list_queue_entries(None, None)?,
            };
            for entry in entries {
                println!(
                    "{}  {:<10} {}/{} by {} — {} request(s): {}",
                    entry.id,
                    entry.status.as_str(),
                    entry.service,
                    entry.account_name,
                    entry.submitted_by,
                    entry.requests.len(),
                    entry.comment,
                );
                for warning in state.store.warnings_for(&entry.id)? {
                    println!("    ⚠ {}: {}", warning.warned_by, warning.message);
                }
            }
            Ok(())
        }
        QueueCommands::Approve { id } => {
            // Await the execution handle so the terminal view prints before
            // the process exits.
            let handle = state.queue.approve(&id)?;
            let view = handle.await.context("execution task panicked")??;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        QueueCommands::Reject { id, reason } => {
            state.queue.reject(&id, &reason)?;
            println!("✓ {id} rejected");
            Ok(())
        }
        QueueCommands::Purge { id } => {
            if state.store.purge_queue_entry(&id)? {
                println!("✓ {id} purged");
            } else {
                bail!("entry {id} is missing or not in a terminal state");
            }
            Ok(())
        }
    }
}

// ── Message review ────────────────────────────────────────────────────────────

async fn messages_cmd(state: &AppState, command: MessageCommands) -> anyhow::Result<()> {
    match command {
        MessageCommands::Pending => {
            for msg in state.messages.pending()? {
                println!(
                    "{:<6} {} → {}: {}",
                    msg.id, msg.from_agent, msg.to_agent, msg.body
                );
            }
            Ok(())
        }
        MessageCommands::Approve { id } => {
            state.messages.approve(id).await?;
            println!("✓ message {id} delivered");
            Ok(())
        }
        MessageCommands::Reject { id, reason } => {
            state.messages.reject(id, &reason)?;
            println!("✓ message {id} rejected");
            Ok(())
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

fn settings_cmd(state: &AppState, command: SettingsCommands) -> anyhow::Result<()> {
    match command {
        SettingsCommands::Get { key } => {
            match state.store.setting(&key)? {
                Some(value) => println!("{value}"),
                None => println!("(unset)"),
            }
            Ok(())
        }
        SettingsCommands::Set { key, value } => {
            // Validate the well-known keys so a typo cannot silently turn
            // supervision off.
            if key == agentgate_store::KEY_MESSAGING_MODE
                && MessagingMode::parse(&value).is_none()
            {
                bail!("messaging_mode must be one of: off, supervised, open");
            }
            state.store.set_setting(&key, &value)?;
            println!("✓ {key} = {value}");
            Ok(())
        }
        SettingsCommands::Unset { key } => {
            if state.store.delete_setting(&key)? {
                println!("✓ {key} unset");
            } else {
                bail!("{key} was not set");
            }
            Ok(())
        }
        SettingsCommands::List => {
            for (key, value) in state.store.list_settings()? {
                println!("{key:<32} {value}");
            }
            Ok(())
        }
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────────

async fn sessions_cmd(state: &AppState, command: SessionCommands) -> anyhow::Result<()> {
    match command {
        SessionCommands::List => {
            for session in state.store.list_sessions()? {
                println!(
                    "{}  {:<24} last seen {}",
                    session.session_id, session.agent_name, session.last_seen
                );
            }
            Ok(())
        }
        SessionCommands::Kill { session_id } => {
            if state.sessions.kill(&session_id).await? {
                println!("✓ session {session_id} killed");
            } else {
                bail!("no such session: {session_id}");
            }
            Ok(())
        }
        SessionCommands::KillAgent { agent } => {
            let n = state.sessions.kill_agent(&agent).await?;
            println!("✓ {n} session(s) killed for {agent}");
            Ok(())
        }
    }
}

// ── Webhook log ───────────────────────────────────────────────────────────────

fn webhooks_cmd(state: &AppState, command: WebhookCommands) -> anyhow::Result<()> {
    match command {
        WebhookCommands::Log { limit } => {
            for row in state.store.recent_webhook_log(limit)? {
                println!(
                    "{}  {:<8} {:<24} {:<10} {}",
                    row.created_at,
                    row.source,
                    row.event,
                    row.status,
                    row.detail.as_deref().unwrap_or("-"),
                );
            }
            Ok(())
        }
    }
}
