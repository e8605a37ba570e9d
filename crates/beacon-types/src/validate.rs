// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Pre-parse validation of raw event JSON.
//!
//! This runs before the JSON is deserialized into the typed [`crate::Event`]
//! sum, so that malformed ID fields and unrecognized discriminators fail
//! with the same `400`-shaped error regardless of which variant they would
//! otherwise have matched.

use crate::ids::valid_id;
use serde_json::Value;
use thiserror::Error;

/// Every event tag the hub recognizes.
const RECOGNIZED_TAGS: &[&str] = &[
    "tool_start",
    "tool_end",
    "thinking",
    "agent_start",
    "agent_stop",
    "session_start",
    "session_stop",
    "plan_update",
    "plan_delete",
    "plan_list",
    "team_update",
    "task_update",
    "subagent_mapping",
    "connection_status",
];

const ID_FIELDS: &[&str] = &["sessionId", "agentId", "toolCallId"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("event is not a JSON object")]
    NotAnObject,
    #[error("missing or unrecognized \"type\"")]
    UnrecognizedType,
    #[error("missing or non-string \"timestamp\"")]
    MissingTimestamp,
    #[error("invalid \"{0}\": must match ^[A-Za-z0-9._-]+$ and be <=256 chars")]
    InvalidId(&'static str),
}

/// Validate discriminator, timestamp shape, and ID field shapes.
///
/// Does not validate variant-specific required fields (e.g. that
/// `tool_start` carries a `toolCallId`) — that is enforced by
/// [`crate::Event`]'s `Deserialize` impl on the subsequent parse.
pub fn validate_event_json(value: &Value) -> Result<(), ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let tag = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ValidationError::UnrecognizedType)?;
    if !RECOGNIZED_TAGS.contains(&tag) {
        return Err(ValidationError::UnrecognizedType);
    }

    if !matches!(obj.get("timestamp"), Some(Value::String(_))) {
        return Err(ValidationError::MissingTimestamp);
    }

    for field in ID_FIELDS {
        if let Some(v) = obj.get(*field) {
            let s = v.as_str().ok_or(ValidationError::InvalidId(field))?;
            if !valid_id(s) {
                return Err(ValidationError::InvalidId(field));
            }
        }
    }

    Ok(())
}
