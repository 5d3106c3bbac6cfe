//! Request-log suppression: identical requests inside the window log once.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(5);

/// Keys beyond this count trigger a sweep of stale entries.
const SWEEP_THRESHOLD: usize = 100;
const STALE_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RequestLogCache {
    window: Duration,
    last_logged: HashMap<String, Instant>,
}

impl Default for RequestLogCache {
    fn default() -> Self {
        Self::with_window(SUPPRESSION_WINDOW)
    }
}

impl RequestLogCache {
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            last_logged: HashMap::new(),
        }
    }

    pub fn key(channel: &str, args: &Value) -> String {
        format!("{channel}:{args}")
    }

    /// Record `key` at `now` and report whether it should be logged.
    pub fn should_log(&mut self, key: &str, now: Instant) -> bool {
        if let Some(last) = self.last_logged.get(key) {
            if now.duration_since(*last) <= self.window {
                return false;
            }
        }
        self.last_logged.insert(key.to_string(), now);
        if self.last_logged.len() > SWEEP_THRESHOLD {
            self.last_logged
                .retain(|_, logged_at| now.duration_since(*logged_at) <= STALE_AFTER);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.last_logged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_logged.is_empty()
    }
}
