// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Environment-variable-driven configuration. No CLI flags — see §6.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HTTP_PORT: u16 = 3355;
const DEFAULT_STATIC_PORT: u16 = 3356;
const DEFAULT_THINKING_POLL_MS: u64 = 1000;
const MIN_THINKING_POLL_MS: u64 = 100;
const MAX_THINKING_POLL_MS: u64 = 10_000;

pub struct Config {
    pub http_port: u16,
    pub static_port: u16,
    pub projects_root: PathBuf,
    pub plans_root: PathBuf,
    pub teams_root: PathBuf,
    pub tasks_root: PathBuf,
    pub thinking_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let claude_dir = home.join(".claude");

        let static_port = std::env::var("BEACON_STATIC_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_STATIC_PORT);

        let thinking_poll_ms = std::env::var("THINKING_POLL_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_THINKING_POLL_MS)
            .clamp(MIN_THINKING_POLL_MS, MAX_THINKING_POLL_MS);

        Self {
            http_port: DEFAULT_HTTP_PORT,
            static_port,
            projects_root: claude_dir.join("projects"),
            plans_root: claude_dir.join("plans"),
            teams_root: claude_dir.join("teams"),
            tasks_root: claude_dir.join("tasks"),
            thinking_poll_interval: Duration::from_millis(thinking_poll_ms),
        }
    }
}
