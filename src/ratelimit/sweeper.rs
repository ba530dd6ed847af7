//! Background removal of expired attempt windows.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::limiter::RateLimiter;
use crate::clock::Clock;

/// Spawn a task that calls [`RateLimiter::sweep_expired`] every `interval`.
///
/// The task runs until the returned handle is aborted.
pub fn spawn_sweeper<C: Clock + 'static>(
    limiter: Arc<RateLimiter<C>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.sweep_expired();
            if removed > 0 {
                debug!(
                    removed = removed,
                    remaining = limiter.entry_count(),
                    "Swept expired rate limit entries"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));

        limiter.is_rate_limited("client", 5, Duration::from_secs(60));
        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(limiter.entry_count(), 1);

        let handle = spawn_sweeper(limiter.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(limiter.entry_count(), 0);
    }
}
