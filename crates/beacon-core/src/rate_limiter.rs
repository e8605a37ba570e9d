// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-key sliding-window rate limiting with a cancellable sweeper.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

struct Entry {
    hits: VecDeque<Instant>,
    last_access: Instant,
}

/// Outcome of a [`RateLimiter::check`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: usize,
    pub retry_after_secs: u64,
}

/// Per-key sliding-window counter. Entries whose last access is stale are
/// periodically evicted by a spawned sweeper task so long-lived deployments
/// don't accumulate one entry per ever-seen key forever.
pub struct RateLimiter {
    state: Mutex<HashMap<String, Entry>>,
    max: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HashMap::new()),
            max,
            window,
        })
    }

    /// Defaults used by the Event Receiver: 100 requests / 1 s window.
    pub fn with_receiver_defaults() -> Arc<Self> {
        Self::new(100, Duration::from_secs(1))
    }

    pub fn check(&self, key: &str, now: Instant) -> Decision {
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        let entry = state.entry(key.to_string()).or_insert_with(|| Entry {
            hits: VecDeque::new(),
            last_access: now,
        });

        while let Some(&oldest) = entry.hits.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                entry.hits.pop_front();
            } else {
                break;
            }
        }

        entry.last_access = now;

        if entry.hits.len() < self.max {
            entry.hits.push_back(now);
            Decision {
                allowed: true,
                remaining: self.max - entry.hits.len(),
                retry_after_secs: 0,
            }
        } else {
            let oldest = *entry.hits.front().expect("len == max > 0 implies front exists");
            let free_at = oldest + self.window;
            let retry = free_at.saturating_duration_since(now);
            let retry_secs = retry.as_secs() + u64::from(retry.subsec_nanos() > 0);
            Decision {
                allowed: false,
                remaining: 0,
                retry_after_secs: retry_secs.max(1),
            }
        }
    }

    /// Drop entries whose last access is older than 10x the window. Called
    /// by the spawned sweeper; exposed separately so tests can drive it
    /// without waiting on a real ticker.
    pub fn sweep(&self, now: Instant) {
        let stale_after = self.window * 10;
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        state.retain(|_, entry| now.saturating_duration_since(entry.last_access) < stale_after);
    }

    pub fn tracked_keys(&self) -> usize {
        self.state.lock().expect("rate limiter mutex poisoned").len()
    }

    /// Spawn the periodic sweeper (default cadence: every 60 s). The
    /// returned task exits as soon as `cancel` is triggered.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("rate limiter sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.sweep(Instant::now());
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
    fn allows_up_to_max_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));
        let t0 = Instant::now();
        for i in 0..3 {
            let d = limiter.check("peer", t0);
            assert!(d.allowed, "request {i} should be allowed");
        }
        let denied = limiter.check("peer", t0);
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs >= 1);
    }

    #[test]
    fn remaining_counts_down() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        let t0 = Instant::now();
        assert_eq!(limiter.check("k", t0).remaining, 4);
        assert_eq!(limiter.check("k", t0).remaining, 3);
    }

    #[test]
    fn window_expiry_frees_capacity() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(limiter.check("k", t0).allowed);
        assert!(!limiter.check("k", t0).allowed);
        let later = t0 + Duration::from_millis(150);
        assert!(limiter.check("k", later).allowed);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(limiter.check("a", t0).allowed);
        assert!(limiter.check("b", t0).allowed);
        assert!(!limiter.check("a", t0).allowed);
    }

    #[test]
    fn sweep_evicts_only_stale_entries() {
        let limiter = RateLimiter::new(10, Duration::from_millis(10));
        let t0 = Instant::now();
        limiter.check("stale", t0);
        let fresh_time = t0 + Duration::from_millis(200);
        limiter.check("fresh", fresh_time);
        assert_eq!(limiter.tracked_keys(), 2);
        limiter.sweep(fresh_time);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
