//! Fixed-window request throttling, one window per key.
//!
//! Each key (one per remote function) may make `max_requests` calls per
//! `window`. A call over budget waits for the rest of the window, capped at
//! `max_wait`, and then opens a fresh window that it counts against. Callers
//! arriving while that window is still in the future fill it in order and
//! wait for it too.
//!
//! Counters live behind a `std::sync::Mutex`. The read-and-increment is done
//! under one lock with no `.await` in between; only the sleep happens after
//! the lock is released.

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    max_wait: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, max_wait: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            max_wait,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests,
            Duration::from_secs(config.window_secs),
            Duration::from_secs(config.max_wait_secs),
        )
    }

    /// Count one request for `key` and return how long the caller must wait
    /// before sending it.
    ///
    /// A window may start in the future when earlier callers are already
    /// waiting. Later callers join that window while it has room and queue
    /// behind it once it is full, so no caller overtakes a waiting one.
    pub fn reserve(&self, key: &str) -> Duration {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        let pending = entry.started > now;
        let elapsed = now.saturating_duration_since(entry.started);
        if !pending && elapsed >= self.window {
            *entry = Window {
                started: now,
                count: 1,
            };
            return Duration::ZERO;
        }
        if entry.count < self.max_requests {
            entry.count += 1;
            return entry.started.saturating_duration_since(now);
        }

        let next = if pending {
            entry.started + self.window.min(self.max_wait)
        } else {
            now + (self.window - elapsed).min(self.max_wait)
        };
        *entry = Window {
            started: next,
            count: 1,
        };
        next.saturating_duration_since(now)
    }

    /// Wait until a request for `key` is allowed.
    pub async fn throttle(&self, key: &str) {
        let wait = self.reserve(key);
        if !wait.is_zero() {
            info!(key, wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests left in the current window for `key`.
    pub fn remaining(&self, key: &str) -> u32 {
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        match windows.get(key) {
            Some(w) if w.started > Instant::now() => 0,
            Some(w) if Instant::now().saturating_duration_since(w.started) < self.window => {
                self.max_requests.saturating_sub(w.count)
            }
            _ => self.max_requests,
        }
    }

    /// Forget every window.
    pub fn reset(&self) {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
