//! Periodic single-slot tick producer.
//!
//! A ticker is a spawned task that emits a [`Tick`] at a fixed period onto
//! a capacity-1 channel in lossy mode: when the consumer is slower than the
//! period, the newest tick overwrites the unconsumed one, so at most one
//! tick is ever pending and the ticker loop never blocks.

use super::{channel, Receiver, RecvFuture};
use crate::error::TryRecvError;
use crate::runtime::{ScopeHandle, TaskHandle};
use crate::time::sleep;
use crate::types::CancelReason;
use std::time::Duration;

/// The value a ticker emits. Carries no data; receipt is the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick;

/// A running ticker: the receiving end of its channel plus the handle of
/// the loop task.
#[derive(Debug)]
pub struct Ticker {
    receiver: Receiver<Tick>,
    task: TaskHandle<()>,
}

/// Spawns a ticker into `scope`.
///
/// The loop waits `initial_delay` before the first tick and `period`
/// between subsequent ticks: the Kth tick becomes receivable no earlier
/// than `initial_delay + (K-1) * period` after the spawn. Cancelling the
/// owning scope stops the ticker like any other child task.
#[must_use]
pub fn new_ticker(scope: &ScopeHandle, period: Duration, initial_delay: Duration) -> Ticker {
    let (tx, rx) = channel(1);
    let task = scope.spawn_child(async move {
        sleep(initial_delay).await;
        // A failed lossy send means every receiver is gone; stop looping.
        while tx.send_lossy(Tick).is_ok() {
            sleep(period).await;
        }
    });
    Ticker { receiver: rx, task }
}

impl Ticker {
    /// Receives the next tick, suspending until one is emitted.
    ///
    /// Resolves to `Err` once the ticker is cancelled and the last pending
    /// tick (if any) has been consumed.
    pub fn tick(&self) -> RecvFuture<'_, Tick> {
        self.receiver.recv()
    }

    /// Takes a pending tick without suspending.
    pub fn try_tick(&self) -> Result<Tick, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Stops the loop and closes the channel.
    ///
    /// Cooperative: the loop observes the request at its next sleep; the
    /// channel closes when the loop task winds down.
    pub fn cancel(&self) {
        self.task.cancel_with(CancelReason::user("ticker cancelled"));
    }

    /// Returns true while the ticker loop has not terminated.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.is_active()
    }

    /// Borrows the receiving end, for composing the ticker into pipelines.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<Tick> {
        &self.receiver
    }
}
