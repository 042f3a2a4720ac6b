// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::net::SocketAddr;

use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{routes, state::AppState};

/// The complete route table with tracing attached.  Exposed so tests can
/// drive the edge on an ephemeral listener.
pub fn app(state: AppState) -> axum::Router {
    routes::router(state).layer(TraceLayer::new_for_http())
}

/// Start the HTTP edge and block until shutdown.
///
/// Spawns the session sweeper before binding; the server itself runs until
/// the process is terminated.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    state.sessions.spawn_sweeper();

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "agentgate listening");
    axum::serve(listener, app).await?;
    Ok(())
}
