//! Wall-clock abstraction.
//!
//! Identifier issuance and token expiry both read time through [`Clock`] so
//! tests can drive them with a manual clock instead of sleeping.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};

/// Source of wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current instant in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Blocks until the clock reads at least `target_ms`.
    ///
    /// The default implementation sleeps the calling thread.
    fn sleep_until_ms(&self, target_ms: i64) {
        let remaining = target_ms.saturating_sub(self.now_ms());
        if remaining > 0 {
            std::thread::sleep(Duration::from_millis(remaining.unsigned_abs()));
        }
    }
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
