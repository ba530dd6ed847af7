//! Login attempt throttling.

mod backend;
mod entry;
mod limiter;
mod sweeper;

pub use backend::RateLimiterBackend;
pub use entry::RateLimitEntry;
pub use limiter::RateLimiter;
pub use sweeper::spawn_sweeper;

/// Human-readable rejection for a client that must wait `seconds`.
pub fn describe_wait(seconds: u64) -> String {
    let wait = if seconds < 60 {
        plural(seconds.max(1), "second")
    } else {
        plural(seconds.div_ceil(60), "minute")
    };
    format!("Too many login attempts. Please try again in {}.", wait)
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
