// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Capacity-capped, TTL-swept tracking of in-flight tool calls, used to
//! backfill `tool_end.durationMs` when the caller didn't supply one.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Default cap on in-flight entries.
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Default max age before a sweep evicts an entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct Inner {
    starts: HashMap<String, Instant>,
    order: VecDeque<String>,
}

pub struct ToolCallTracker {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl ToolCallTracker {
    pub fn new(capacity: usize, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            capacity,
            ttl,
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Record a `tool_start`. Overwrites (with a warning) if `tool_call_id`
    /// is already tracked; evicts the oldest entry first if at capacity.
    pub fn start(&self, tool_call_id: &str, now: Instant) {
        let mut inner = self.inner.lock().expect("tool call tracker mutex poisoned");
        if inner.starts.contains_key(tool_call_id) {
            tracing::warn!(tool_call_id, "duplicate tool_start; overwriting start time");
        } else {
            if inner.starts.len() >= self.capacity {
                Self::evict_oldest(&mut inner);
            }
            inner.order.push_back(tool_call_id.to_string());
        }
        inner.starts.insert(tool_call_id.to_string(), now);
    }

    fn evict_oldest(inner: &mut Inner) {
        while let Some(oldest) = inner.order.pop_front() {
            if inner.starts.remove(&oldest).is_some() {
                break;
            }
        }
    }

    /// Consume the tracked start time for `tool_call_id` (if any) and
    /// return the elapsed milliseconds to backfill. Returns `None` if no
    /// start was tracked, or if the computed duration would be negative
    /// (clock skew guard) — in which case the entry is still removed.
    pub fn end(&self, tool_call_id: &str, now: Instant) -> Option<i64> {
        let mut inner = self.inner.lock().expect("tool call tracker mutex poisoned");
        let start = inner.starts.remove(tool_call_id)?;
        match now.checked_duration_since(start) {
            Some(elapsed) => Some(elapsed.as_millis() as i64),
            None => {
                tracing::warn!(
                    tool_call_id,
                    "tool_end predates tracked tool_start; skipping duration backfill"
                );
                None
            }
        }
    }

    /// Drop entries older than the tracker's TTL.
    pub fn sweep(&self, now: Instant) {
        let mut inner = self.inner.lock().expect("tool call tracker mutex poisoned");
        let ttl = self.ttl;
        let stale: Vec<String> = inner
            .starts
            .iter()
            .filter(|(_, &started)| now.saturating_duration_since(started) > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            inner.starts.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("tool call tracker mutex poisoned").starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spawn_sweeper(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("tool call tracker sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        tracker.sweep(Instant::now());
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backfills_duration_on_matching_end() {
        let tracker = ToolCallTracker::new(10, DEFAULT_TTL);
        let t0 = Instant::now();
        tracker.start("c1", t0);
        let t1 = t0 + Duration::from_millis(200);
        let duration = tracker.end("c1", t1).unwrap();
        assert!((190..=250).contains(&duration));
        assert!(tracker.is_empty());
    }

    #[test]
    fn end_without_start_returns_none() {
        let tracker = ToolCallTracker::new(10, DEFAULT_TTL);
        assert_eq!(tracker.end("missing", Instant::now()), None);
    }

    #[test]
    fn negative_duration_is_guarded() {
        let tracker = ToolCallTracker::new(10, DEFAULT_TTL);
        let t0 = Instant::now() + Duration::from_secs(10);
        tracker.start("c1", t0);
        let earlier = t0 - Duration::from_secs(1);
        assert_eq!(tracker.end("c1", earlier), None);
        // entry still consumed even though duration was skipped
        assert!(tracker.is_empty());
    }

    #[test]
    fn evicts_oldest_entry_at_capacity() {
        let tracker = ToolCallTracker::new(2, DEFAULT_TTL);
        let t0 = Instant::now();
        tracker.start("c1", t0);
        tracker.start("c2", t0);
        tracker.start("c3", t0); // evicts c1
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.end("c1", t0), None);
        assert!(tracker.end("c2", t0).is_some());
    }

    #[test]
    fn sweep_drops_entries_older_than_ttl() {
        let tracker = ToolCallTracker::new(10, Duration::from_millis(50));
        let t0 = Instant::now();
        tracker.start("c1", t0);
        let later = t0 + Duration::from_millis(100);
        tracker.sweep(later);
        assert!(tracker.is_empty());
    }

    #[test]
    fn duplicate_start_overwrites_without_growing() {
        let tracker = ToolCallTracker::new(10, DEFAULT_TTL);
        let t0 = Instant::now();
        tracker.start("c1", t0);
        let t1 = t0 + Duration::from_millis(50);
        tracker.start("c1", t1);
        assert_eq!(tracker.len(), 1);
        let duration = tracker.end("c1", t1 + Duration::from_millis(10)).unwrap();
        assert!(duration < 50);
    }
}
