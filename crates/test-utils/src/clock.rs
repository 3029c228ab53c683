//! Manually driven clock.

use std::sync::{
    Arc,
    atomic::{AtomicI64, AtomicUsize, Ordering},
};

use chrono::{DateTime, TimeZone, Utc};
use modgarden_types::Clock;

/// A [`Clock`] that only moves when told to.
///
/// `sleep_until_ms` jumps straight to the target instead of blocking, and
/// counts the call so tests can observe sequence exhaustion.
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
    sleeps: Arc<AtomicUsize>,
}

impl ManualClock {
    /// Starts the clock at `now_ms` milliseconds since the Unix epoch.
    pub fn at_ms(now_ms: i64) -> Self {
        Self { now_ms: Arc::new(AtomicI64::new(now_ms)), sleeps: Arc::new(AtomicUsize::new(0)) }
    }

    /// Starts the clock at `instant`.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::at_ms(instant.timestamp_millis())
    }

    /// Sets the time, backwards included.
    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Moves the time forward.
    pub fn advance(&self, by: std::time::Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(by, Ordering::SeqCst);
    }

    /// Number of `sleep_until_ms` calls that had to move the clock.
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    /// 2025-01-01T00:00:00Z.
    fn default() -> Self {
        Self::at_ms(1_735_689_600_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms()).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn sleep_until_ms(&self, target_ms: i64) {
        if self.now_ms.fetch_max(target_ms, Ordering::SeqCst) < target_ms {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
        }
    }
}
