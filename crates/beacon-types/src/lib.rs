// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Wire event model for the observability hub.
//!
//! # Why a tagged sum, not one struct with everything optional
//!
//! Every event variant has its own required/optional fields. A single
//! struct with all fields `Option<T>` would accept `tool_start` with no
//! `toolName` and `plan_update` with a `toolCallId` — losing the invariants
//! the rest of the system depends on. [`Event`] is instead one Rust enum
//! per recognized `type`, and [`Event::from_json`] is the only place where
//! untyped JSON becomes a typed value.

mod ids;
mod validate;

pub use ids::{valid_id, MAX_ID_LEN};
pub use validate::{validate_event_json, ValidationError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a subagent or tool call as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Success,
    Failure,
    Cancelled,
}

/// Status of a task in a team's task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

/// Status reported by `agent_stop` (a subset of [`AgentStatus`] — an agent
/// never stops as `running`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Success,
    Failure,
    Cancelled,
}

impl From<StopStatus> for AgentStatus {
    fn from(s: StopStatus) -> Self {
        match s {
            StopStatus::Success => AgentStatus::Success,
            StopStatus::Failure => AgentStatus::Failure,
            StopStatus::Cancelled => AgentStatus::Cancelled,
        }
    }
}

/// One member of a `team_update` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "agentType")]
    pub agent_type: String,
    pub status: String,
}

/// One task in a `task_update` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "activeForm",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_form: Option<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default, rename = "blockedBy")]
    pub blocked_by: Vec<String>,
}

/// One entry in a `plan_list` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanListEntry {
    pub path: String,
    pub filename: String,
    #[serde(rename = "lastModified")]
    pub last_modified: i64,
}

/// One entry in a `subagent_mapping` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentMappingEntry {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "parentSessionId")]
    pub parent_session_id: String,
    pub name: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    pub status: AgentStatus,
    #[serde(default, rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// Connection lifecycle status reported in a `connection_status` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnStatus {
    Connected,
    Disconnected,
}

/// The tagged sum of every event recognized by the hub.
///
/// `type` on the wire is the serde tag; every other field is `camelCase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ToolStart {
        timestamp: DateTime<Utc>,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<String>,
        #[serde(default, rename = "sessionId", skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, rename = "agentId", skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
    },
    ToolEnd {
        timestamp: DateTime<Utc>,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(default, rename = "durationMs", skip_serializing_if = "Option::is_none")]
        duration_ms: Option<i64>,
    },
    Thinking {
        timestamp: DateTime<Utc>,
        content: String,
        #[serde(default, rename = "sessionId", skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, rename = "agentId", skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    AgentStart {
        timestamp: DateTime<Utc>,
        #[serde(rename = "agentId")]
        agent_id: String,
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default, rename = "agentName", skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
        #[serde(
            default,
            rename = "parentAgentId",
            skip_serializing_if = "Option::is_none"
        )]
        parent_agent_id: Option<String>,
    },
    AgentStop {
        timestamp: DateTime<Utc>,
        #[serde(rename = "agentId")]
        agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<StopStatus>,
    },
    SessionStart {
        timestamp: DateTime<Utc>,
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(
            default,
            rename = "workingDirectory",
            skip_serializing_if = "Option::is_none"
        )]
        working_directory: Option<String>,
    },
    SessionStop {
        timestamp: DateTime<Utc>,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    PlanUpdate {
        timestamp: DateTime<Utc>,
        path: String,
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(
            default,
            rename = "lastModified",
            skip_serializing_if = "Option::is_none"
        )]
        last_modified: Option<i64>,
    },
    PlanDelete {
        timestamp: DateTime<Utc>,
        path: String,
        filename: String,
    },
    PlanList {
        timestamp: DateTime<Utc>,
        plans: Vec<PlanListEntry>,
    },
    TeamUpdate {
        timestamp: DateTime<Utc>,
        team: String,
        members: Vec<TeamMember>,
    },
    TaskUpdate {
        timestamp: DateTime<Utc>,
        #[serde(rename = "teamId")]
        team_id: String,
        tasks: Vec<TaskItem>,
    },
    SubagentMapping {
        timestamp: DateTime<Utc>,
        mappings: Vec<SubagentMappingEntry>,
    },
    ConnectionStatus {
        timestamp: DateTime<Utc>,
        status: ConnStatus,
        #[serde(rename = "serverVersion")]
        server_version: String,
        #[serde(rename = "clientCount")]
        client_count: usize,
    },
}

impl Event {
    /// The wire discriminator (`type`) for this event, e.g. `"tool_start"`.
    pub fn tag(&self) -> &'static str {
        match self {
            Event::ToolStart { .. } => "tool_start",
            Event::ToolEnd { .. } => "tool_end",
            Event::Thinking { .. } => "thinking",
            Event::AgentStart { .. } => "agent_start",
            Event::AgentStop { .. } => "agent_stop",
            Event::SessionStart { .. } => "session_start",
            Event::SessionStop { .. } => "session_stop",
            Event::PlanUpdate { .. } => "plan_update",
            Event::PlanDelete { .. } => "plan_delete",
            Event::PlanList { .. } => "plan_list",
            Event::TeamUpdate { .. } => "team_update",
            Event::TaskUpdate { .. } => "task_update",
            Event::SubagentMapping { .. } => "subagent_mapping",
            Event::ConnectionStatus { .. } => "connection_status",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::ToolStart { timestamp, .. }
            | Event::ToolEnd { timestamp, .. }
            | Event::Thinking { timestamp, .. }
            | Event::AgentStart { timestamp, .. }
            | Event::AgentStop { timestamp, .. }
            | Event::SessionStart { timestamp, .. }
            | Event::SessionStop { timestamp, .. }
            | Event::PlanUpdate { timestamp, .. }
            | Event::PlanDelete { timestamp, .. }
            | Event::PlanList { timestamp, .. }
            | Event::TeamUpdate { timestamp, .. }
            | Event::TaskUpdate { timestamp, .. }
            | Event::SubagentMapping { timestamp, .. }
            | Event::ConnectionStatus { timestamp, .. } => *timestamp,
        }
    }
}

/// The envelope every message pushed to a client is wrapped in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: Event,
    pub seq: u64,
}

/// Client-to-server requests. Currently only plan content fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    PlanRequest { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trips_through_json() {
        let ev = Event::ToolStart {
            timestamp: Utc::now(),
            tool_name: "Bash".into(),
            input: Some("ls".into()),
            session_id: None,
            agent_id: None,
            tool_call_id: "c1".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "tool_start");
        assert_eq!(json["toolCallId"], "c1");
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.tag(), "tool_start");
    }

    #[test]
    fn envelope_carries_seq() {
        let ev = Event::SessionStop {
            timestamp: Utc::now(),
            session_id: "s1".into(),
        };
        let env = Envelope { event: ev, seq: 7 };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["seq"], 7);
    }
}
