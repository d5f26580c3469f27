//! Wall-clock source for save timestamps and offline income.

use chrono::{DateTime, Utc};

pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// `Date.now()` in the browser (chrono's wasmbind), the system clock elsewhere.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// RFC 3339 rendering of an epoch-millisecond timestamp.
pub fn to_rfc3339(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
}

#[cfg(test)]
pub use manual::ManualClock;
