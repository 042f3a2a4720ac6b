// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The HTTP edge of the gateway.
//!
//! Every request enters here: bearer-authenticated `/api/...` routes (read
//! proxy, queue, messaging, mementos, discovery), the HMAC-verified inbound
//! webhook endpoint, and the tool-session endpoint speaking MCP
//! streamable-HTTP (`POST` messages, `GET` notification stream, `DELETE`
//! terminate, session id in the `Mcp-Session-Id` header).

mod auth;
mod error;
mod mcp;
mod routes;
mod server;
mod state;
mod webhooks;

pub use auth::hash_key;
pub use server::{app, serve};
pub use state::AppState;
