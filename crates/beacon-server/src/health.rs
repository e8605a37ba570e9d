// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Process-lifetime event counters surfaced via `GET /health`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct HealthMetrics {
    started_at: Instant,
    total: AtomicU64,
    by_type: Mutex<HashMap<String, u64>>,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_ms: u64,
    pub connections: usize,
    pub events_received: u64,
    pub events_by_type: HashMap<String, u64>,
    pub timestamp: chrono::DateTime<Utc>,
}

impl HealthMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total: AtomicU64::new(0),
            by_type: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_event(&self, tag: &str) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let mut by_type = self.by_type.lock().expect("health metrics mutex poisoned");
        *by_type.entry(tag.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self, connections: usize) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            version: VERSION,
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
            connections,
            events_received: self.total.load(Ordering::Relaxed),
            events_by_type: self.by_type.lock().expect("health metrics mutex poisoned").clone(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self::new()
    }
}
