// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Filesystem watchers: transcripts, plans, and team/task configuration.
//!
//! Each watcher owns its tracked state exclusively; the rest of the system
//! only ever reads it through the events the watcher emits, or through the
//! narrow read-only accessors each watcher exposes for client requests and
//! connect-time snapshots.

mod plan;
mod team_task;
mod transcript;

pub use plan::PlanWatcher;
pub use team_task::TeamTaskWatcher;
pub use transcript::TranscriptWatcher;

use beacon_types::Event;

/// Everything a watcher emits is handed off on this channel; the broadcast
/// hub owns the receiving end and assigns each event its `seq`.
pub type EventSink = tokio::sync::mpsc::UnboundedSender<Event>;

fn emit(sink: &EventSink, event: Event) {
    if sink.send(event).is_err() {
        tracing::debug!("event sink closed; dropping watcher event");
    }
}

/// How often a watcher re-checks for its root directory's appearance when
/// it was missing at startup.
pub(crate) const ROOT_WAIT_POLL: std::time::Duration = std::time::Duration::from_secs(5);
