//! Polling assertions for async tests.

use std::time::Duration;

use tokio::time::{Instant, sleep};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition held. Used where a background task (a key
/// reload, a spawned submission) settles at a time the test cannot predict.
///
/// ```no_run
/// use std::{sync::{Arc, atomic::{AtomicBool, Ordering}}, time::Duration};
/// use modgarden_test_utils::assert_eventually;
///
/// # async fn demo() {
/// let reloaded = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&reloaded);
/// tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });
///
/// let settled = assert_eventually(Duration::from_millis(200), || reloaded.load(Ordering::SeqCst));
/// assert!(settled.await);
/// # }
/// ```
pub async fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(POLL_INTERVAL).await;
    }
    condition()
}
