//! Per-identifier attempt window.

use chrono::{DateTime, Duration, Utc};

/// Attempts observed for one identifier in its current window.
///
/// `reset_at` is fixed when the window opens and never moves. Once the clock
/// passes it the entry is dead: callers replace it instead of incrementing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Attempts observed in the current window
    pub count: u32,
    /// When the current window opened
    pub first_attempt: DateTime<Utc>,
    /// When the current window expires
    pub reset_at: DateTime<Utc>,
}

impl RateLimitEntry {
    /// Open a fresh window at `now` holding a single attempt.
    pub fn start(now: DateTime<Utc>, window: std::time::Duration) -> Self {
        let window = to_chrono(window);
        let reset_at = now
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            count: 1,
            first_attempt: now,
            reset_at,
        }
    }

    /// Whether the window has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.reset_at
    }

    /// Count one more attempt.
    pub fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Attempts left before `max_attempts` is reached.
    pub fn remaining(&self, max_attempts: u32) -> u32 {
        max_attempts.saturating_sub(self.count)
    }

    /// Time left in the window, zero once expired.
    pub fn time_until_reset(&self, now: DateTime<Utc>) -> Duration {
        if self.is_expired(now) {
            Duration::zero()
        } else {
            self.reset_at - now
        }
    }
}

fn to_chrono(window: std::time::Duration) -> Duration {
    Duration::from_std(window).unwrap_or(Duration::MAX)
}
