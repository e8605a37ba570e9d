// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP event ingress and WebSocket broadcast hub.
//!
//! The binary crate wires a concrete [`RequestDispatcher`] from the
//! watchers and correlation state, then calls [`serve`].

mod app;
mod error;
mod health;
mod hub;
mod receiver;
mod security;

pub use app::{router, AppState};
pub use error::ServerError;
pub use health::HealthMetrics;
pub use hub::{Hub, RequestDispatcher, MAX_CLIENTS};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Bind `addr` and serve the ingress router until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Listen { addr, source })?;
    tracing::info!(%addr, "event ingress listening");

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|source| ServerError::Listen { addr, source })?;
    Ok(())
}
