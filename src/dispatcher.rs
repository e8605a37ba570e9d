// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wires the watchers and the Subagent Mapper into the Hub's
//! [`RequestDispatcher`]: connect-time snapshots and `plan_request` replies.

use std::path::PathBuf;
use std::sync::Arc;

use beacon_correlate::SubagentMapper;
use beacon_server::RequestDispatcher;
use beacon_types::{ClientRequest, Event};
use beacon_watchers::{PlanWatcher, TeamTaskWatcher, TranscriptWatcher};

pub struct Dispatcher {
    pub plans: Arc<PlanWatcher>,
    pub team_tasks: Arc<TeamTaskWatcher>,
    pub transcripts: Arc<TranscriptWatcher>,
    pub subagents: Arc<SubagentMapper>,
}

impl RequestDispatcher for Dispatcher {
    fn connect_snapshot(&self) -> Vec<Event> {
        let mut events = self.transcripts.session_start_snapshot();

        let mappings = self.subagents.all();
        if !mappings.is_empty() {
            events.push(Event::SubagentMapping {
                timestamp: chrono::Utc::now(),
                mappings,
            });
        }

        let plan_list = self.plans.plan_list_event();
        if let Event::PlanList { ref plans, .. } = plan_list {
            if !plans.is_empty() {
                events.push(plan_list.clone());
            }
        }
        if let Some(recent) = self.plans.most_recent_plan_event() {
            events.push(recent);
        }

        events.extend(self.team_tasks.snapshot_events());
        events
    }

    fn handle_request(&self, request: ClientRequest) -> Option<Event> {
        match request {
            ClientRequest::PlanRequest { path } => {
                let path = PathBuf::from(path);
                let event = self.plans.plan_content_event(&path);
                if event.is_none() {
                    tracing::warn!(path = %path.display(), "plan_request for unknown or out-of-root path");
                }
                event
            }
        }
    }
}
