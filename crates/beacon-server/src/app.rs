// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Router wiring: `POST /event`, `GET /health`, WebSocket upgrade at `/`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use beacon_correlate::{SubagentMapper, ToolCallTracker};
use beacon_core::RateLimiter;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::health::HealthMetrics;
use crate::hub::{handle_socket, Hub, RequestDispatcher};
use crate::receiver::{event_handler, health_handler};

/// Shared state reachable from every axum handler.
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub tool_calls: Arc<ToolCallTracker>,
    pub subagents: Arc<SubagentMapper>,
    pub hub: Arc<Hub>,
    pub health: Arc<HealthMetrics>,
    pub dispatcher: Arc<dyn RequestDispatcher>,
    pub shutdown: tokio_util::sync::CancellationToken,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/event", post(event_handler))
        .route("/health", get(health_handler))
        .route("/", get(ws_upgrade_handler))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    if !crate::hub::admit_handshake(origin, peer, &state.hub) {
        return axum::http::StatusCode::FORBIDDEN.into_response();
    }

    let hub = Arc::clone(&state.hub);
    let dispatcher = Arc::clone(&state.dispatcher);
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, dispatcher, shutdown))
}
