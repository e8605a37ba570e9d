// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Polls team and task configuration directories, synthesizing
//! `team_update` / `task_update` events (including empty-list removal
//! signals).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beacon_types::{Event, TaskItem, TaskStatus, TeamMember};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{emit, EventSink};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

struct TeamRecord {
    hash: String,
    detected_at: DateTime<Utc>,
}

/// Watches `~/.claude/teams/` and `~/.claude/tasks/`, each independently.
pub struct TeamTaskWatcher {
    teams_root: PathBuf,
    tasks_root: PathBuf,
    tracked_teams: Mutex<HashMap<String, TeamRecord>>,
    tracked_task_dirs: Mutex<HashMap<String, String>>,
    sink: EventSink,
}

impl TeamTaskWatcher {
    pub fn new(teams_root: PathBuf, tasks_root: PathBuf, sink: EventSink) -> Arc<Self> {
        Arc::new(Self {
            teams_root,
            tasks_root,
            tracked_teams: Mutex::new(HashMap::new()),
            tracked_task_dirs: Mutex::new(HashMap::new()),
            sink,
        })
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("team/task watcher shutting down");
                    return;
                }
                _ = ticker.tick() => self.poll_once(),
            }
        }
    }

    fn poll_once(&self) {
        self.poll_teams();
        self.poll_tasks();
    }

    /// Current team/task state as fresh events, for the connect-time
    /// snapshot. Reads straight from disk rather than tracked state, so it
    /// never perturbs dedup hashes or `detectedAt` timestamps.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();

        for (name, dir) in Self::subdirectories(&self.teams_root) {
            let Ok(content) = std::fs::read_to_string(dir.join("config.json")) else {
                continue;
            };
            let Ok(parsed) = serde_json::from_str::<Value>(&content) else {
                continue;
            };
            let members = parsed
                .get("members")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(member_from_json).collect())
                .unwrap_or_default();
            events.push(Event::TeamUpdate {
                timestamp: Utc::now(),
                team: name,
                members,
            });
        }

        for (team_id, dir) in Self::subdirectories(&self.tasks_root) {
            let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
                .map(|rd| {
                    rd.flatten()
                        .map(|e| e.path())
                        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                        .collect()
                })
                .unwrap_or_default();
            files.sort();
            let tasks: Vec<TaskItem> = files
                .iter()
                .filter_map(|path| std::fs::read_to_string(path).ok())
                .filter_map(|content| serde_json::from_str::<Value>(&content).ok())
                .filter_map(|v| task_from_json(&v))
                .collect();
            events.push(Event::TaskUpdate {
                timestamp: Utc::now(),
                team_id,
                tasks,
            });
        }

        events
    }

    fn subdirectories(root: &std::path::Path) -> Vec<(String, PathBuf)> {
        if !root.exists() {
            return Vec::new();
        }
        let Ok(entries) = std::fs::read_dir(root) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .filter(|e| beacon_core::within(&e.path(), root))
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| (name.to_string(), e.path()))
            })
            .collect()
    }

    fn poll_teams(&self) {
        let observed = Self::subdirectories(&self.teams_root);
        let mut seen_names = Vec::new();

        for (name, dir) in &observed {
            seen_names.push(name.clone());
            let config_path = dir.join("config.json");
            let Ok(content) = std::fs::read_to_string(&config_path) else {
                continue;
            };
            let content_hash = beacon_core::hash(&content);

            let (changed, detected_at) = {
                let mut tracked = self.tracked_teams.lock().expect("team watcher mutex poisoned");
                match tracked.get(name) {
                    Some(r) if r.hash == content_hash => (false, r.detected_at),
                    Some(r) => (true, r.detected_at),
                    None => (true, Utc::now()),
                }
            };
            if !changed {
                continue;
            }

            let Ok(parsed) = serde_json::from_str::<Value>(&content) else {
                tracing::warn!(team = name, "failed to parse team config.json; skipping");
                continue;
            };
            let members = parsed
                .get("members")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(member_from_json)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            self.tracked_teams.lock().expect("team watcher mutex poisoned").insert(
                name.clone(),
                TeamRecord {
                    hash: content_hash,
                    detected_at,
                },
            );

            emit(
                &self.sink,
                Event::TeamUpdate {
                    timestamp: Utc::now(),
                    team: name.clone(),
                    members,
                },
            );
        }

        let gone: Vec<String> = {
            let tracked = self.tracked_teams.lock().expect("team watcher mutex poisoned");
            tracked
                .keys()
                .filter(|k| !seen_names.contains(k))
                .cloned()
                .collect()
        };
        for name in gone {
            self.tracked_teams.lock().expect("team watcher mutex poisoned").remove(&name);
            emit(
                &self.sink,
                Event::TeamUpdate {
                    timestamp: Utc::now(),
                    team: name,
                    members: Vec::new(),
                },
            );
        }
    }

    fn poll_tasks(&self) {
        let observed = Self::subdirectories(&self.tasks_root);
        let mut seen_names = Vec::new();

        for (team_id, dir) in &observed {
            seen_names.push(team_id.clone());
            let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
                .map(|rd| {
                    rd.flatten()
                        .map(|e| e.path())
                        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                        .collect()
                })
                .unwrap_or_default();
            files.sort();

            let mut parts: Vec<String> = Vec::new();
            let mut contents: Vec<(String, String)> = Vec::new();
            for path in &files {
                let Ok(content) = std::fs::read_to_string(path) else {
                    continue;
                };
                let filename = path.file_name().unwrap().to_string_lossy().to_string();
                parts.push(filename.clone());
                parts.push(content.clone());
                contents.push((filename, content));
            }
            let content_hash = beacon_core::hash_parts(parts);

            let changed = {
                let mut tracked = self
                    .tracked_task_dirs
                    .lock()
                    .expect("task watcher mutex poisoned");
                let changed = tracked.get(team_id) != Some(&content_hash);
                tracked.insert(team_id.clone(), content_hash);
                changed
            };
            if !changed {
                continue;
            }

            let tasks: Vec<TaskItem> = contents
                .iter()
                .filter_map(|(_, content)| {
                    serde_json::from_str::<Value>(content)
                        .ok()
                        .and_then(|v| task_from_json(&v))
                })
                .collect();

            emit(
                &self.sink,
                Event::TaskUpdate {
                    timestamp: Utc::now(),
                    team_id: team_id.clone(),
                    tasks,
                },
            );
        }

        let gone: Vec<String> = {
            let tracked = self
                .tracked_task_dirs
                .lock()
                .expect("task watcher mutex poisoned");
            tracked
                .keys()
                .filter(|k| !seen_names.contains(k))
                .cloned()
                .collect()
        };
        for team_id in gone {
            self.tracked_task_dirs
                .lock()
                .expect("task watcher mutex poisoned")
                .remove(&team_id);
            emit(
                &self.sink,
                Event::TaskUpdate {
                    timestamp: Utc::now(),
                    team_id,
                    tasks: Vec::new(),
                },
            );
        }
    }
}

fn member_from_json(v: &Value) -> Option<TeamMember> {
    let obj = v.as_object()?;
    let name = obj.get("name")?.as_str()?.to_string();
    let str_field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    Some(TeamMember {
        name,
        agent_id: str_field("agentId"),
        agent_type: str_field("agentType"),
        status: str_field("status"),
    })
}

fn task_from_json(v: &Value) -> Option<TaskItem> {
    let obj = v.as_object()?;
    let id = obj.get("id")?.as_str()?.to_string();
    let subject = beacon_core::sanitize(obj.get("subject")?.as_str()?);
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(beacon_core::sanitize);
    let active_form = obj
        .get("activeForm")
        .and_then(Value::as_str)
        .map(|s| s.to_string());
    let status = match obj.get("status").and_then(Value::as_str) {
        Some("in_progress") => TaskStatus::InProgress,
        Some("completed") => TaskStatus::Completed,
        _ => TaskStatus::Pending,
    };
    let owner = obj.get("owner").and_then(Value::as_str).map(|s| s.to_string());
    let strings = |key: &str| -> Vec<String> {
        obj.get(key)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    };
    Some(TaskItem {
        id,
        subject,
        description,
        active_form,
        status,
        owner,
        blocks: strings("blocks"),
        blocked_by: strings("blockedBy"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn new_watcher(teams: PathBuf, tasks: PathBuf) -> (Arc<TeamTaskWatcher>, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (TeamTaskWatcher::new(teams, tasks, tx), rx)
    }

    #[test]
    fn emits_team_update_on_new_config() {
        let teams = tempfile::tempdir().unwrap();
        let tasks = tempfile::tempdir().unwrap();
        let team_dir = teams.path().join("alpha");
        fs::create_dir_all(&team_dir).unwrap();
        fs::write(
            team_dir.join("config.json"),
            r#"{"members":[{"name":"explorer"}]}"#,
        )
        .unwrap();

        let (watcher, mut rx) = new_watcher(teams.path().to_path_buf(), tasks.path().to_path_buf());
        watcher.poll_once();
        let event = rx.try_recv().unwrap();
        let Event::TeamUpdate { team, members, .. } = event else {
            panic!("expected TeamUpdate");
        };
        assert_eq!(team, "alpha");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "explorer");
        assert_eq!(members[0].agent_id, "");
    }

    #[test]
    fn emits_removal_signal_when_team_dir_disappears() {
        let teams = tempfile::tempdir().unwrap();
        let tasks = tempfile::tempdir().unwrap();
        let team_dir = teams.path().join("alpha");
        fs::create_dir_all(&team_dir).unwrap();
        fs::write(team_dir.join("config.json"), r#"{"members":[]}"#).unwrap();

        let (watcher, mut rx) = new_watcher(teams.path().to_path_buf(), tasks.path().to_path_buf());
        watcher.poll_once();
        rx.try_recv().unwrap();

        fs::remove_dir_all(&team_dir).unwrap();
        watcher.poll_once();
        let Event::TeamUpdate { members, .. } = rx.try_recv().unwrap() else {
            panic!("expected TeamUpdate");
        };
        assert!(members.is_empty());
    }

    #[test]
    fn emits_task_update_with_normalized_status() {
        let teams = tempfile::tempdir().unwrap();
        let tasks = tempfile::tempdir().unwrap();
        let task_dir = tasks.path().join("alpha");
        fs::create_dir_all(&task_dir).unwrap();
        fs::write(
            task_dir.join("1.json"),
            r#"{"id":"1","subject":"write tests","status":"weird"}"#,
        )
        .unwrap();

        let (watcher, mut rx) = new_watcher(teams.path().to_path_buf(), tasks.path().to_path_buf());
        watcher.poll_once();
        let Event::TaskUpdate { tasks, team_id, .. } = rx.try_recv().unwrap() else {
            panic!("expected TaskUpdate");
        };
        assert_eq!(team_id, "alpha");
        assert_eq!(tasks[0].status, TaskStatus::Pending);
    }

    #[test]
    fn snapshot_events_reads_current_disk_state_without_touching_tracked_hashes() {
        let teams = tempfile::tempdir().unwrap();
        let tasks = tempfile::tempdir().unwrap();
        let team_dir = teams.path().join("alpha");
        fs::create_dir_all(&team_dir).unwrap();
        fs::write(
            team_dir.join("config.json"),
            r#"{"members":[{"name":"explorer"}]}"#,
        )
        .unwrap();

        let (watcher, _rx) = new_watcher(teams.path().to_path_buf(), tasks.path().to_path_buf());
        let events = watcher.snapshot_events();
        assert_eq!(events.len(), 1);
        let Event::TeamUpdate { team, members, .. } = &events[0] else {
            panic!("expected TeamUpdate");
        };
        assert_eq!(team, "alpha");
        assert_eq!(members.len(), 1);
        assert!(watcher.tracked_teams.lock().unwrap().is_empty());
    }

    #[test]
    fn task_hash_is_order_sensitive_over_whole_directory() {
        let teams = tempfile::tempdir().unwrap();
        let tasks = tempfile::tempdir().unwrap();
        let task_dir = tasks.path().join("alpha");
        fs::create_dir_all(&task_dir).unwrap();
        fs::write(task_dir.join("1.json"), r#"{"id":"1","subject":"a"}"#).unwrap();
        fs::write(task_dir.join("2.json"), r#"{"id":"2","subject":"b"}"#).unwrap();

        let (watcher, mut rx) = new_watcher(teams.path().to_path_buf(), tasks.path().to_path_buf());
        watcher.poll_once();
        rx.try_recv().unwrap();
        watcher.poll_once();
        assert!(rx.try_recv().is_err(), "unchanged directory must not re-emit");
    }
}
