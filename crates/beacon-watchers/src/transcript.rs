// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tails assistant transcript JSONL files and extracts `thinking` blocks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beacon_types::Event;
use chrono::{DateTime, Utc};
use notify::{RecursiveMode, Watcher};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{emit, EventSink, ROOT_WAIT_POLL};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);

struct FileState {
    last_size: u64,
    last_line_count: usize,
}

/// Decode a project directory's basename back into a working-directory
/// path. Lossy: a working directory that itself contains a dash cannot be
/// told apart from a path separator by this transform.
pub fn decode_working_directory(project_dir_name: &str) -> String {
    project_dir_name.replace('-', "/")
}

fn extract_thinking_blocks(v: &Value) -> Vec<String> {
    let mut out = Vec::new();
    for candidate in [v.pointer("/message/content"), v.pointer("/event/message/content")]
        .into_iter()
        .flatten()
    {
        let Some(arr) = candidate.as_array() else {
            continue;
        };
        for item in arr {
            if item.get("type").and_then(Value::as_str) == Some("thinking") {
                if let Some(text) = item.get("thinking").and_then(Value::as_str) {
                    out.push(text.to_string());
                }
            }
        }
    }
    out
}

/// Tails every `.jsonl` file under a `~/.claude/projects/`-shaped root,
/// including the `<session>/subagents/*.jsonl` sidecar tree.
pub struct TranscriptWatcher {
    root: PathBuf,
    poll_interval: Duration,
    tracked_files: Mutex<HashMap<PathBuf, FileState>>,
    sessions: Mutex<HashMap<String, Option<String>>>,
    sink: EventSink,
}

impl TranscriptWatcher {
    pub fn new(root: PathBuf, poll_interval: Duration, sink: EventSink) -> Arc<Self> {
        let clamped = poll_interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        Arc::new(Self {
            root,
            poll_interval: clamped,
            tracked_files: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            sink,
        })
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        while !self.root.exists() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(ROOT_WAIT_POLL) => {}
            }
        }
        self.scan();

        let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let _watcher = {
            let tx = notify_tx.clone();
            match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if res.is_ok() {
                    let _ = tx.send(());
                }
            }) {
                Ok(mut watcher) => {
                    if let Err(e) = watcher.watch(&self.root, RecursiveMode::Recursive) {
                        tracing::error!(error = %e, "failed to watch transcripts root");
                    }
                    Some(watcher)
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to start transcript directory watcher; falling back to polling only");
                    None
                }
            }
        };

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("transcript watcher shutting down");
                    return;
                }
                _ = ticker.tick() => self.poll_tick(),
                Some(()) = notify_rx.recv() => self.scan(),
            }
        }
    }

    /// Discover project directories, bootstrap their transcripts and
    /// subagent sidecars, and drop tracked files rooted under a project
    /// directory that disappeared.
    fn scan(&self) {
        let Ok(project_dirs) = std::fs::read_dir(&self.root) else {
            return;
        };
        let mut seen_projects = Vec::new();

        for proj_entry in project_dirs.flatten() {
            let proj_path = proj_entry.path();
            if !proj_path.is_dir() {
                continue;
            }
            let Some(proj_name) = proj_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            seen_projects.push(proj_path.clone());
            let working_directory = decode_working_directory(proj_name);

            let Ok(entries) = std::fs::read_dir(&proj_path) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                    self.register_file(&path);
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        self.sessions
                            .lock()
                            .expect("transcript watcher mutex poisoned")
                            .entry(stem.to_string())
                            .or_insert_with(|| Some(working_directory.clone()));
                    }
                } else if path.is_dir() {
                    let subagents_dir = path.join("subagents");
                    if let Ok(sub_entries) = std::fs::read_dir(&subagents_dir) {
                        for sub in sub_entries.flatten() {
                            let sub_path = sub.path();
                            if sub_path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                                self.register_file(&sub_path);
                            }
                        }
                    }
                }
            }
        }

        let mut tracked = self
            .tracked_files
            .lock()
            .expect("transcript watcher mutex poisoned");
        tracked.retain(|path, _| seen_projects.iter().any(|p| path.starts_with(p)));
    }

    fn register_file(&self, path: &Path) {
        self.tracked_files
            .lock()
            .expect("transcript watcher mutex poisoned")
            .entry(path.to_path_buf())
            .or_insert(FileState {
                last_size: 0,
                last_line_count: 0,
            });
    }

    fn poll_tick(&self) {
        let paths: Vec<PathBuf> = self
            .tracked_files
            .lock()
            .expect("transcript watcher mutex poisoned")
            .keys()
            .cloned()
            .collect();
        for path in paths {
            self.process_growth(&path);
        }
    }

    fn process_growth(&self, path: &Path) {
        let size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => {
                self.tracked_files
                    .lock()
                    .expect("transcript watcher mutex poisoned")
                    .remove(path);
                return;
            }
        };

        let (last_size, last_line_count) = {
            let tracked = self
                .tracked_files
                .lock()
                .expect("transcript watcher mutex poisoned");
            match tracked.get(path) {
                Some(s) => (s.last_size, s.last_line_count),
                None => return,
            }
        };
        if size <= last_size {
            return;
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            return;
        };
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = last_line_count.min(lines.len());
        for line in &lines[start..] {
            self.process_line(line);
        }

        if let Some(state) = self
            .tracked_files
            .lock()
            .expect("transcript watcher mutex poisoned")
            .get_mut(path)
        {
            state.last_size = size;
            state.last_line_count = lines.len();
        }
    }

    fn process_line(&self, line: &str) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            return;
        };
        if !value.is_object() {
            return;
        }
        for text in extract_thinking_blocks(&value) {
            self.emit_thinking(&value, text);
        }
    }

    fn emit_thinking(&self, line: &Value, text: String) {
        let session_id = line.get("sessionId").and_then(Value::as_str).map(str::to_string);
        let agent_id = line.get("agentId").and_then(Value::as_str).map(str::to_string);
        let timestamp = line
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        emit(
            &self.sink,
            Event::Thinking {
                timestamp,
                content: beacon_core::sanitize(&text),
                session_id,
                agent_id,
            },
        );
    }

    /// `session_start` events for every known session, used to populate the
    /// connect-time snapshot.
    pub fn session_start_snapshot(&self) -> Vec<Event> {
        let sessions = self.sessions.lock().expect("transcript watcher mutex poisoned");
        sessions
            .iter()
            .map(|(session_id, working_directory)| Event::SessionStart {
                timestamp: Utc::now(),
                session_id: session_id.clone(),
                working_directory: working_directory.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn new_watcher(root: PathBuf) -> (Arc<TranscriptWatcher>, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (TranscriptWatcher::new(root, Duration::from_millis(500), tx), rx)
    }

    #[test]
    fn decodes_working_directory_from_project_name() {
        assert_eq!(decode_working_directory("-home-user-project"), "/home/user/project");
    }

    #[test]
    fn extracts_direct_thinking_block() {
        let line = serde_json::json!({
            "sessionId": "s1",
            "timestamp": "2026-01-01T00:00:00Z",
            "message": {"content": [{"type": "thinking", "thinking": "pondering"}]}
        });
        assert_eq!(extract_thinking_blocks(&line), vec!["pondering".to_string()]);
    }

    #[test]
    fn extracts_sidecar_wrapped_thinking_block() {
        let line = serde_json::json!({
            "event": {"message": {"content": [{"type": "thinking", "thinking": "nested"}]}}
        });
        assert_eq!(extract_thinking_blocks(&line), vec!["nested".to_string()]);
    }

    #[test]
    fn ignores_non_thinking_content_blocks() {
        let line = serde_json::json!({
            "message": {"content": [{"type": "text", "text": "hello"}]}
        });
        assert!(extract_thinking_blocks(&line).is_empty());
    }

    #[test]
    fn bootstraps_existing_transcripts_and_tracks_new_lines() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("-home-user-proj");
        fs::create_dir_all(&project).unwrap();
        let transcript = project.join("session1.jsonl");
        fs::write(
            &transcript,
            "{\"sessionId\":\"session1\",\"message\":{\"content\":[{\"type\":\"thinking\",\"thinking\":\"first\"}]}}\n",
        )
        .unwrap();

        let (watcher, mut rx) = new_watcher(root.path().to_path_buf());
        watcher.scan();
        watcher.poll_tick();
        let Event::Thinking { content, session_id, .. } = rx.try_recv().unwrap() else {
            panic!("expected Thinking event");
        };
        assert_eq!(content, "first");
        assert_eq!(session_id.as_deref(), Some("session1"));

        let snapshot = watcher.session_start_snapshot();
        assert_eq!(snapshot.len(), 1);

        // Append a second line; only the new line should be processed.
        let mut f = fs::OpenOptions::new().append(true).open(&transcript).unwrap();
        use std::io::Write;
        writeln!(
            f,
            "{{\"sessionId\":\"session1\",\"message\":{{\"content\":[{{\"type\":\"thinking\",\"thinking\":\"second\"}}]}}}}"
        )
        .unwrap();
        watcher.poll_tick();
        let Event::Thinking { content, .. } = rx.try_recv().unwrap() else {
            panic!("expected Thinking event");
        };
        assert_eq!(content, "second");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn tracks_subagent_sidecar_files() {
        let root = tempfile::tempdir().unwrap();
        let project = root.path().join("-home-user-proj");
        let subagents = project.join("session1").join("subagents");
        fs::create_dir_all(&subagents).unwrap();
        fs::write(subagents.join("agent1.jsonl"), "").unwrap();

        let (watcher, _rx) = new_watcher(root.path().to_path_buf());
        watcher.scan();
        assert_eq!(watcher.tracked_files.lock().unwrap().len(), 1);
    }

    #[test]
    fn clamps_poll_interval_to_documented_bounds() {
        let root = tempfile::tempdir().unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let too_fast = TranscriptWatcher::new(root.path().to_path_buf(), Duration::from_millis(1), tx.clone());
        assert_eq!(too_fast.poll_interval, MIN_POLL_INTERVAL);
        let too_slow = TranscriptWatcher::new(root.path().to_path_buf(), Duration::from_secs(60), tx);
        assert_eq!(too_slow.poll_interval, MAX_POLL_INTERVAL);
    }
}
