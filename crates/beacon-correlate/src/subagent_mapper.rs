// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Bidirectional agent/session index with cancellable delayed removal.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beacon_types::{AgentStatus, SubagentMappingEntry};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// How long a stopped subagent's mapping entry lingers before removal,
/// unless cancelled by a re-register or a session cleanup.
pub const REMOVAL_DELAY: Duration = Duration::from_secs(5 * 60);

struct AgentRecord {
    parent_session_id: String,
    name: String,
    start_time: DateTime<Utc>,
    status: AgentStatus,
    end_time: Option<DateTime<Utc>>,
    removal: Option<CancellationToken>,
}

impl AgentRecord {
    fn to_entry(&self, agent_id: &str) -> SubagentMappingEntry {
        SubagentMappingEntry {
            agent_id: agent_id.to_string(),
            parent_session_id: self.parent_session_id.clone(),
            name: self.name.clone(),
            start_time: self.start_time,
            status: self.status,
            end_time: self.end_time,
        }
    }
}

#[derive(Default)]
struct Inner {
    agents: HashMap<String, AgentRecord>,
    sessions: HashMap<String, HashSet<String>>,
}

/// Tracks which session each live subagent belongs to. Every mutating
/// operation holds a single internal lock; no other component's lock is
/// ever acquired while holding it.
pub struct SubagentMapper {
    inner: Mutex<Inner>,
}

impl SubagentMapper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Insert or replace an agent's mapping. If `agent_id` was already
    /// tracked and pending removal, the pending timer is cancelled and the
    /// record is replaced with status reset to `running`.
    pub fn register(&self, agent_id: &str, session_id: &str, name: &str, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().expect("subagent mapper mutex poisoned");
        if let Some(existing) = inner.agents.get(agent_id) {
            if let Some(token) = &existing.removal {
                token.cancel();
            }
            // Re-registering under a different session moves it in the
            // reverse index too.
            if existing.parent_session_id != session_id {
                if let Some(set) = inner.sessions.get_mut(&existing.parent_session_id) {
                    set.remove(agent_id);
                }
            }
        }
        inner.agents.insert(
            agent_id.to_string(),
            AgentRecord {
                parent_session_id: session_id.to_string(),
                name: name.to_string(),
                start_time: now,
                status: AgentStatus::Running,
                end_time: None,
                removal: None,
            },
        );
        inner
            .sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(agent_id.to_string());
    }

    /// Transition `agent_id` to a terminal status and schedule its removal
    /// after [`REMOVAL_DELAY`]. No-op if `agent_id` isn't tracked.
    pub fn stop(self: &Arc<Self>, agent_id: &str, status: AgentStatus, now: DateTime<Utc>) {
        let token = {
            let mut inner = self.inner.lock().expect("subagent mapper mutex poisoned");
            let Some(record) = inner.agents.get_mut(agent_id) else {
                return;
            };
            record.status = status;
            record.end_time = Some(now);
            let token = CancellationToken::new();
            record.removal = Some(token.clone());
            token
        };

        let mapper = Arc::clone(self);
        let agent_id = agent_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(agent_id = %agent_id, "pending subagent removal cancelled");
                }
                _ = tokio::time::sleep(REMOVAL_DELAY) => {
                    mapper.remove(&agent_id);
                }
            }
        });
    }

    fn remove(&self, agent_id: &str) {
        let mut inner = self.inner.lock().expect("subagent mapper mutex poisoned");
        if let Some(record) = inner.agents.remove(agent_id) {
            if let Some(set) = inner.sessions.get_mut(&record.parent_session_id) {
                set.remove(agent_id);
                if set.is_empty() {
                    inner.sessions.remove(&record.parent_session_id);
                }
            }
        }
    }

    /// Cancel every pending removal for `session_id`'s agents and drop them
    /// immediately, then drop the (now empty) session entry.
    pub fn session_cleanup(&self, session_id: &str) {
        let mut inner = self.inner.lock().expect("subagent mapper mutex poisoned");
        if let Some(agent_ids) = inner.sessions.remove(session_id) {
            for agent_id in agent_ids {
                if let Some(record) = inner.agents.remove(&agent_id) {
                    if let Some(token) = record.removal {
                        token.cancel();
                    }
                }
            }
        }
    }

    pub fn parent_of(&self, agent_id: &str) -> Option<String> {
        let inner = self.inner.lock().expect("subagent mapper mutex poisoned");
        inner.agents.get(agent_id).map(|r| r.parent_session_id.clone())
    }

    pub fn by_id(&self, agent_id: &str) -> Option<SubagentMappingEntry> {
        let inner = self.inner.lock().expect("subagent mapper mutex poisoned");
        inner.agents.get(agent_id).map(|r| r.to_entry(agent_id))
    }

    pub fn by_session(&self, session_id: &str) -> Vec<SubagentMappingEntry> {
        let inner = self.inner.lock().expect("subagent mapper mutex poisoned");
        let Some(ids) = inner.sessions.get(session_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|aid| inner.agents.get(aid).map(|r| r.to_entry(aid)))
            .collect()
    }

    pub fn all(&self) -> Vec<SubagentMappingEntry> {
        let inner = self.inner.lock().expect("subagent mapper mutex poisoned");
        inner
            .agents
            .iter()
            .map(|(aid, r)| r.to_entry(aid))
            .collect()
    }
}
