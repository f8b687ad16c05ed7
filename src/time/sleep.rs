//! Sleep and yield futures, and the current virtual time.

use crate::runtime::context;
use crate::tracing_compat::warn;
use crate::types::Time;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Returns the current virtual time, or [`Time::ZERO`] outside a runtime.
#[must_use]
pub fn now() -> Time {
    context::current()
        .and_then(|cx| cx.state.upgrade())
        .map_or(Time::ZERO, |state| {
            state.lock().expect("runtime state poisoned").now
        })
}

/// Suspends the calling task for `duration` of virtual time.
///
/// A suspension point: cancellation is observed across it. Zero-duration
/// sleeps complete on the first poll.
#[must_use = "futures do nothing unless awaited"]
pub fn sleep(duration: Duration) -> Sleep {
    Sleep {
        target: Target::After(duration),
        deadline: None,
    }
}

/// Suspends the calling task until the virtual clock reaches `deadline`.
#[must_use = "futures do nothing unless awaited"]
pub fn sleep_until(deadline: Time) -> Sleep {
    Sleep {
        target: Target::At(deadline),
        deadline: None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    After(Duration),
    At(Time),
}

/// Future returned by [`sleep`] and [`sleep_until`].
///
/// Only meaningful inside a runtime; polled outside one it completes
/// immediately with a warning, since no clock exists to wait on.
#[derive(Debug)]
pub struct Sleep {
    target: Target,
    deadline: Option<Time>,
}

impl Sleep {
    /// The resolved deadline, once the first poll has pinned it to the
    /// clock.
    #[must_use]
    pub const fn deadline(&self) -> Option<Time> {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(task_cx) = context::current() else {
            warn!("sleep polled outside a runtime; completing immediately");
            return Poll::Ready(());
        };
        let Some(state) = task_cx.state.upgrade() else {
            // Runtime gone; nothing will ever advance the clock.
            return Poll::Ready(());
        };
        let mut state = state.lock().expect("runtime state poisoned");

        let deadline = match this.deadline {
            Some(deadline) => deadline,
            None => {
                let deadline = match this.target {
                    Target::After(duration) => state.now + duration,
                    Target::At(at) => at,
                };
                this.deadline = Some(deadline);
                if state.now < deadline {
                    state.register_timer(task_cx.task_id, deadline);
                }
                deadline
            }
        };

        if state.now >= deadline {
            Poll::Ready(())
        } else {
            context::note_wait("sleep");
            Poll::Pending
        }
    }
}

/// Yields the calling task back to the scheduler once.
///
/// The task stays ready: it re-enters the ready lane immediately and runs
/// again after the tasks already queued. Still a suspension point, so a
/// pending cancellation is observed across it.
#[must_use = "futures do nothing unless awaited"]
pub const fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.yielded {
            Poll::Ready(())
        } else {
            this.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
