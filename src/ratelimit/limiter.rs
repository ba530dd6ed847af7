//! Core login rate limiter implementation.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::entry::RateLimitEntry;
use crate::clock::{Clock, SystemClock};

/// Fixed-window attempt limiter keyed by client identifier.
///
/// Each identifier's read-check-increment runs under its DashMap shard lock,
/// so concurrent attempts from the same client never lose updates. Expired
/// entries are treated as absent on access; [`RateLimiter::sweep_expired`]
/// only bounds memory.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Attempt windows indexed by identifier
    entries: DashMap<String, RateLimitEntry>,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a new rate limiter reading wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for RateLimiter<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter driven by `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Record an attempt and report whether it should be rejected.
    ///
    /// The first attempt of a window always passes, even with
    /// `max_attempts == 0`.
    pub fn is_rate_limited(&self, identifier: &str, max_attempts: u32, window: Duration) -> bool {
        let now = self.clock.now();

        match self.entries.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let entry = occupied.get_mut();
                entry.record();

                trace!(
                    identifier = %identifier,
                    count = entry.count,
                    max_attempts = max_attempts,
                    "Recorded attempt"
                );

                let limited = entry.count > max_attempts;
                if limited {
                    debug!(
                        identifier = %identifier,
                        count = entry.count,
                        reset_at = %entry.reset_at,
                        "Rate limit exceeded"
                    );
                }
                limited
            }
            Entry::Occupied(mut occupied) => {
                trace!(identifier = %identifier, "Window expired, starting a new one");
                occupied.insert(RateLimitEntry::start(now, window));
                false
            }
            Entry::Vacant(vacant) => {
                debug!(
                    identifier = %identifier,
                    window_secs = window.as_secs(),
                    "Creating new rate limit entry"
                );
                vacant.insert(RateLimitEntry::start(now, window));
                false
            }
        }
    }

    /// Attempts left in the current window.
    pub fn remaining_attempts(&self, identifier: &str, max_attempts: u32) -> u32 {
        let now = self.clock.now();
        match self.entries.get(identifier) {
            Some(entry) if !entry.is_expired(now) => entry.remaining(max_attempts),
            _ => max_attempts,
        }
    }

    /// Whole seconds until the current window resets, rounded up.
    pub fn time_until_reset(&self, identifier: &str) -> u64 {
        let now = self.clock.now();
        let Some(entry) = self.entries.get(identifier) else {
            return 0;
        };

        let remaining_ms = entry.time_until_reset(now).num_milliseconds().max(0) as u64;
        remaining_ms.div_ceil(1000)
    }

    /// Forget everything recorded for `identifier`.
    pub fn reset(&self, identifier: &str) {
        if self.entries.remove(identifier).is_some() {
            debug!(identifier = %identifier, "Rate limit entry reset");
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Snapshot of the entry for `identifier`, expired or not.
    pub fn entry(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.entries.get(identifier).map(|entry| entry.clone())
    }

    /// Number of tracked identifiers.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Clear all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
