//! Deadline-bounding wrapper around any future.

use crate::error::TaskError;
use crate::time::sleep;
use std::future::{poll_fn, Future};
use std::pin::pin;
use std::task::Poll;
use std::time::Duration;
use thiserror::Error;

/// The deadline expired before the wrapped operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out")]
pub struct TimedOut;

impl From<TimedOut> for TaskError {
    fn from(_: TimedOut) -> Self {
        Self::timed_out()
    }
}

/// Error of [`with_timeout_try`]: the deadline expired, or the operation
/// itself failed in time.
#[derive(Debug, Clone, Error)]
pub enum TimedError {
    /// The deadline expired first.
    #[error("operation timed out")]
    TimedOut,
    /// The operation finished in time but failed.
    #[error(transparent)]
    Failed(#[from] TaskError),
}

/// Races `work` against a deadline `duration` from now.
///
/// Whichever side finishes first wins, with the tie going to the deadline:
/// finishing exactly at the deadline counts as timed out. On timeout the
/// wrapped future is dropped, which is its cancellation; any channel
/// operation it was parked on is abandoned cleanly. A suspension point.
pub async fn with_timeout<F>(duration: Duration, work: F) -> Result<F::Output, TimedOut>
where
    F: Future,
{
    let mut deadline = pin!(sleep(duration));
    let mut work = pin!(work);
    poll_fn(move |cx| {
        // Deadline polled first so the boundary case times out.
        if deadline.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(TimedOut));
        }
        work.as_mut().poll(cx).map(Ok)
    })
    .await
}

/// Like [`with_timeout`], collapsing the timeout into `None`.
pub async fn with_timeout_or_none<F>(duration: Duration, work: F) -> Option<F::Output>
where
    F: Future,
{
    with_timeout(duration, work).await.ok()
}

/// Like [`with_timeout`] for fallible work, flattening the two error paths
/// into one [`TimedError`].
pub async fn with_timeout_try<T, F>(duration: Duration, work: F) -> Result<T, TimedError>
where
    F: Future<Output = Result<T, TaskError>>,
{
    match with_timeout(duration, work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(TimedError::Failed(error)),
        Err(TimedOut) => Err(TimedError::TimedOut),
    }
}
