//! Per-requester rate limiting
//!
//! Sliding-window counter over a mutex-protected map. Check and
//! increment happen under one lock acquisition: with a single slot left,
//! two concurrent requests cannot both pass.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Admission control for query processing
pub trait RateLimiter: Send + Sync {
    /// Record one query attempt for `requester_id` and report whether it
    /// is allowed. A denied attempt is not counted against the window.
    fn check_and_increment(&self, requester_id: &str) -> bool;

    /// Slots left in the current window
    fn remaining(&self, requester_id: &str) -> u32;

    /// Configured per-window ceiling
    fn limit(&self) -> u32;
}

/// Sliding one-hour (configurable) window limiter
pub struct SlidingWindowLimiter {
    max_queries: u32,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter from configuration
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(config.max_queries, Duration::from_secs(config.window_seconds))
    }

    /// Create a limiter with explicit limits
    pub fn with_limits(max_queries: u32, window: Duration) -> Self {
        Self {
            max_queries,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Drop timestamps that have slid out of the window
    fn prune(window: &Duration, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) >= *window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check_and_increment(&self, requester_id: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        let timestamps = windows.entry(requester_id.to_string()).or_default();

        Self::prune(&self.window, timestamps, now);

        if timestamps.len() as u32 >= self.max_queries {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    fn remaining(&self, requester_id: &str) -> u32 {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        let timestamps = windows.entry(requester_id.to_string()).or_default();

        Self::prune(&self.window, timestamps, now);

        self.max_queries.saturating_sub(timestamps.len() as u32)
    }

    fn limit(&self) -> u32 {
        self.max_queries
    }
}
