//! Short-lived duplicate suppression

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Maximum remembered keys before eviction
const MAX_ENTRIES: usize = 256;

/// Remembers recently processed keys for a fixed window
///
/// A key is a duplicate if it was first recorded less than `window` ago.
/// Duplicates do not refresh the timestamp, so a steady stream of repeats is
/// let through once per window.
#[derive(Debug)]
pub struct DuplicateWindow {
    seen: HashMap<String, Instant>,
    window: Duration,
    max_entries: usize,
}

impl DuplicateWindow {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            window,
            max_entries: MAX_ENTRIES,
        }
    }

    /// Window length
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if `key` was recorded within the window, otherwise
    /// records it at `now` and returns `false`
    pub fn check_and_record(&mut self, key: &str, now: Instant) -> bool {
        if self.is_recent(key, now) {
            return true;
        }

        if self.seen.len() >= self.max_entries {
            let window = self.window;
            self.seen.retain(|_, ts| now.duration_since(*ts) < window);
        }

        if self.seen.len() >= self.max_entries {
            if let Some(oldest) = self
                .seen
                .iter()
                .min_by_key(|(_, ts)| **ts)
                .map(|(k, _)| k.clone())
            {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(key.to_string(), now);
        false
    }

    /// Returns `true` if `key` was recorded within the window, without recording
    #[must_use]
    pub fn is_recent(&self, key: &str, now: Instant) -> bool {
        self.seen
            .get(key)
            .is_some_and(|ts| now.duration_since(*ts) < self.window)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
