//! Rate limiter trait for abstracting the attempt store.

use std::time::Duration;

use async_trait::async_trait;

use super::limiter::RateLimiter;
use crate::clock::Clock;

/// Trait for rate limiter implementations.
///
/// The gRPC service works against this trait so a store shared between
/// instances (a remote key-value cache, say) can replace the in-process
/// [`RateLimiter`] without touching request handling.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Record an attempt and report whether it should be rejected.
    async fn is_rate_limited(&self, identifier: &str, max_attempts: u32, window: Duration)
        -> bool;

    /// Attempts left in the current window.
    async fn remaining_attempts(&self, identifier: &str, max_attempts: u32) -> u32;

    /// Seconds until the current window resets.
    async fn time_until_reset(&self, identifier: &str) -> u64;

    /// Forget everything recorded for `identifier`.
    async fn reset(&self, identifier: &str);
}

#[async_trait]
impl<C: Clock + 'static> RateLimiterBackend for RateLimiter<C> {
    async fn is_rate_limited(
        &self,
        identifier: &str,
        max_attempts: u32,
        window: Duration,
    ) -> bool {
        RateLimiter::is_rate_limited(self, identifier, max_attempts, window)
    }

    async fn remaining_attempts(&self, identifier: &str, max_attempts: u32) -> u32 {
        RateLimiter::remaining_attempts(self, identifier, max_attempts)
    }

    async fn time_until_reset(&self, identifier: &str) -> u64 {
        RateLimiter::time_until_reset(self, identifier)
    }

    async fn reset(&self, identifier: &str) {
        RateLimiter::reset(self, identifier)
    }
}
