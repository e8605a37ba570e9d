// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod config;
mod dispatcher;
mod logging;

use std::net::SocketAddr;
use std::sync::Arc;

use beacon_core::RateLimiter;
use beacon_correlate::{SubagentMapper, ToolCallTracker};
use beacon_server::{AppState, HealthMetrics, Hub, RequestDispatcher};
use beacon_watchers::{PlanWatcher, TeamTaskWatcher, TranscriptWatcher};
use dispatcher::Dispatcher;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let config = config::Config::from_env();
    let shutdown = CancellationToken::new();

    let rate_limiter = RateLimiter::with_receiver_defaults();
    let tool_calls = ToolCallTracker::with_defaults();
    let subagents = SubagentMapper::new();
    let hub = Hub::new(config.static_port);
    let health = Arc::new(HealthMetrics::new());

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();

    let plans = PlanWatcher::new(config.plans_root.clone(), event_tx.clone());
    let team_tasks = TeamTaskWatcher::new(
        config.teams_root.clone(),
        config.tasks_root.clone(),
        event_tx.clone(),
    );
    let transcripts = TranscriptWatcher::new(
        config.projects_root.clone(),
        config.thinking_poll_interval,
        event_tx.clone(),
    );
    drop(event_tx);

    let dispatcher: Arc<dyn RequestDispatcher> = Arc::new(Dispatcher {
        plans: Arc::clone(&plans),
        team_tasks: Arc::clone(&team_tasks),
        transcripts: Arc::clone(&transcripts),
        subagents: Arc::clone(&subagents),
    });

    let state = Arc::new(AppState {
        rate_limiter: Arc::clone(&rate_limiter),
        tool_calls: Arc::clone(&tool_calls),
        subagents: Arc::clone(&subagents),
        hub: Arc::clone(&hub),
        health,
        dispatcher,
        shutdown: shutdown.clone(),
    });

    // Watchers never talk to the hub directly; everything they emit lands
    // on this channel and gets assigned a `seq` here.
    {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                hub.broadcast(event);
            }
        });
    }

    rate_limiter.spawn_sweeper(shutdown.clone());
    tool_calls.spawn_sweeper(shutdown.clone());
    tokio::spawn(Arc::clone(&plans).run(shutdown.clone()));
    tokio::spawn(Arc::clone(&team_tasks).run(shutdown.clone()));
    tokio::spawn(Arc::clone(&transcripts).run(shutdown.clone()));
    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.http_port));
    beacon_server::serve(addr, state, shutdown).await?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C on non-Unix) and cancels `shutdown`,
/// which unwinds every ticker, watcher, and the HTTP listener in turn.
async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c, shutting down");
    }
    shutdown.cancel();
}
