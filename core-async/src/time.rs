//! Time-related helpers.

pub use tokio::time::{interval, sleep, timeout, Interval, MissedTickBehavior, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Returns the current time as milliseconds since UNIX_EPOCH.
///
/// Clocks set before the epoch report `0` rather than panicking.
///
/// # Examples
///
/// ```rust
/// use core_async::time::now_millis;
///
/// assert!(now_millis() > 0);
/// ```
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
