//! Bounded re-polling for operations that may find nothing yet.

use std::future::Future;
use std::time::{Duration, Instant};

/// Run `attempt` until it yields `Some`, an error, or `timeout` elapses.
///
/// A zero timeout means exactly one attempt. Between attempts the task
/// sleeps for `interval` (capped at the remaining budget); a zero interval
/// only yields to the scheduler, which reproduces a tight busy-poll.
pub async fn poll_with_timeout<T, E, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut attempt: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    if timeout.is_zero() {
        return attempt().await;
    }

    let started = Instant::now();
    loop {
        if started.elapsed() >= timeout {
            return Ok(None);
        }
        if let Some(found) = attempt().await? {
            return Ok(Some(found));
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        if interval.is_zero() || remaining.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(interval.min(remaining)).await;
        }
    }
}
