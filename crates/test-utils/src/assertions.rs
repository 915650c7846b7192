//! Waiting on state owned by spawned tasks.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval, timeout};

/// How often [`assert_eventually`] re-checks its condition.
const CHECK_EVERY: Duration = Duration::from_millis(10);

/// Re-checks `condition` every few milliseconds until it holds or `limit`
/// passes, then reports whether it held.
///
/// The condition is checked once more after the limit, so a value that
/// settles on the deadline still counts. Under a paused tokio clock the
/// limit is virtual time.
///
/// ```no_run
/// use std::sync::{
///     Arc,
///     atomic::{AtomicBool, Ordering},
/// };
/// use std::time::Duration;
///
/// use text2everything_test_utils::assert_eventually;
///
/// # async fn example() {
/// let flushed = Arc::new(AtomicBool::new(false));
/// let writer = Arc::clone(&flushed);
/// tokio::spawn(async move { writer.store(true, Ordering::SeqCst) });
///
/// assert!(assert_eventually(Duration::from_secs(1), || flushed.load(Ordering::SeqCst)).await);
/// # }
/// ```
pub async fn assert_eventually<F>(limit: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let mut ticks = interval(CHECK_EVERY);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let waited = timeout(limit, async {
        loop {
            ticks.tick().await;
            if condition() {
                break;
            }
        }
    })
    .await;

    waited.is_ok() || condition()
}
