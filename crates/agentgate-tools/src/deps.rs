// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use agentgate_agents::{BroadcastService, MementoService, MessageService};
use agentgate_queue::QueueService;
use agentgate_services::{AccessResolver, ReadProxy};
use agentgate_store::Store;

/// Everything the tool families need, threaded through one cheap-to-clone
/// bundle instead of a growing parameter list.
#[derive(Clone)]
pub struct ToolDeps {
    pub store: Arc<Store>,
    pub queue: QueueService,
    pub messages: MessageService,
    pub broadcasts: BroadcastService,
    pub mementos: MementoService,
    pub proxy: ReadProxy,
    pub resolver: AccessResolver,
}
