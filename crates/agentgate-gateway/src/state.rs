// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use agentgate_agents::{BroadcastService, MementoService, MessageService};
use agentgate_config::Config;
use agentgate_notify::Notifier;
use agentgate_queue::{Executor, QueueService};
use agentgate_services::{AccessResolver, BlockedPaths, CredentialVault, ReadProxy};
use agentgate_store::{Settings, Store};
use agentgate_tools::{SessionManager, ToolDeps};

/// Shared application state threaded through every handler.
///
/// Construction wires the whole dependency graph once; everything inside is
/// `Arc`-backed and cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub settings: Settings,
    pub notifier: Notifier,
    pub queue: QueueService,
    pub messages: MessageService,
    pub broadcasts: BroadcastService,
    pub mementos: MementoService,
    pub proxy: ReadProxy,
    pub resolver: AccessResolver,
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<Store>) -> Self {
        let settings = Settings::new(store.clone());
        let notifier = Notifier::new(config.webhooks.timeout_ms);
        let resolver = AccessResolver::new(store.clone());
        let vault = CredentialVault::new(store.clone());
        let blocked = Arc::new(BlockedPaths::new(&config.proxy.blocked_paths));
        let proxy = ReadProxy::new(vault.clone(), resolver.clone(), blocked);
        let executor = Executor::new(vault);

        let queue = QueueService::new(
            store.clone(),
            resolver.clone(),
            executor,
            notifier.clone(),
            settings.clone(),
        );
        let messages = MessageService::new(store.clone(), notifier.clone(), settings.clone());
        let broadcasts = BroadcastService::new(store.clone(), notifier.clone(), settings.clone());
        let mementos = MementoService::new(store.clone());

        let sessions = SessionManager::new(ToolDeps {
            store: store.clone(),
            queue: queue.clone(),
            messages: messages.clone(),
            broadcasts: broadcasts.clone(),
            mementos: mementos.clone(),
            proxy: proxy.clone(),
            resolver: resolver.clone(),
        });

        Self {
            store,
            settings,
            notifier,
            queue,
            messages,
            broadcasts,
            mementos,
            proxy,
            resolver,
            sessions,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentgate_config::Config;
    use agentgate_store::Store;

    use super::AppState;

    #[test]
    fn state_wires_up_from_defaults() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let state = AppState::new(&Config::default(), store);
        let _clone = state.clone();
    }
}
