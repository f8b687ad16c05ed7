//! Bounded and rendezvous channels between tasks.
//!
//! A channel is the sanctioned way for tasks to share data: a typed FIFO
//! queue with a fixed capacity, cloneable [`Sender`] and [`Receiver`]
//! endpoints, and cooperative suspension on both sides. Capacity 0 makes a
//! rendezvous channel: a send completes only when handed directly to a
//! receiver.
//!
//! Guarantees:
//!
//! - FIFO values: the Nth successful receive returns the Nth successfully
//!   enqueued value for any single producer/consumer pairing
//! - FIFO waiters: among parked senders (or parked receivers), the first
//!   task to suspend is the first woken
//! - Closed channels drain: after [`Sender::close`], receives return the
//!   buffered values first and only then report closed; sends fail at once
//! - Endpoint drops close: the last `Sender` dropping closes the channel
//!   for receivers (drain-then-closed); the last `Receiver` dropping makes
//!   sends fail
//!
//! The [`ticker`] submodule builds a periodic single-slot producer on top.

mod state;
pub mod ticker;

pub use ticker::{new_ticker, Tick, Ticker};

use crate::error::{RecvError, SendError, TryRecvError, TrySendError};
use crate::runtime::context;
use state::{
    abandon_recv, abandon_send, ChannelCore, RecvSlot, RecvStart, SendSlot, SendStart,
    SharedRecvSlot, SharedSendSlot,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Creates a channel with the given capacity.
///
/// Capacity 0 is a rendezvous channel: `send` and `recv` must meet. Both
/// endpoints are cloneable; many producers and many consumers may share one
/// channel.
#[must_use]
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let core = Arc::new(ChannelCore::new(capacity));
    (
        Sender {
            core: Arc::clone(&core),
        },
        Receiver { core },
    )
}

/// The sending half of a channel.
#[derive(Debug)]
pub struct Sender<T> {
    core: Arc<ChannelCore<T>>,
}

impl<T> Sender<T> {
    /// Sends a value, suspending while the channel is full.
    ///
    /// Resolves to `Err(SendError(value))` if the channel closes before the
    /// value is accepted; the value comes back to the caller.
    pub fn send(&self, value: T) -> SendFuture<'_, T> {
        SendFuture {
            core: &self.core,
            value: Some(value),
            slot: None,
        }
    }

    /// Sends without suspending: `Full` where `send` would park.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.core.try_send(value)
    }

    /// Sends without ever suspending, overwriting the oldest unconsumed
    /// value when the buffer is full.
    ///
    /// This is the ticker's at-most-one-pending mode; on a capacity-1
    /// channel the newest value simply replaces an unconsumed one.
    pub fn send_lossy(&self, value: T) -> Result<(), SendError<T>> {
        self.core.send_lossy(value)
    }

    /// Closes the channel. Idempotent; parked senders fail with their value
    /// handed back, receivers drain the buffer then see closed.
    pub fn close(&self) {
        self.core.close();
    }

    /// Returns true once the channel is closed or has no receivers left.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.core.add_sender();
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.core.drop_sender();
    }
}

/// The receiving half of a channel.
#[derive(Debug)]
pub struct Receiver<T> {
    core: Arc<ChannelCore<T>>,
}

impl<T> Receiver<T> {
    /// Receives the oldest value, suspending while the channel is empty.
    ///
    /// Resolves to `Err(RecvError)` once the channel is closed and fully
    /// drained; buffered values are always delivered first.
    pub fn recv(&self) -> RecvFuture<'_, T> {
        RecvFuture {
            core: &self.core,
            slot: None,
        }
    }

    /// Receives without suspending: `Empty` where `recv` would park.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.core.try_recv()
    }

    /// Closes the channel from the receiving side. Idempotent.
    pub fn close(&self) {
        self.core.close();
    }

    /// Returns true once the channel is closed or has no senders left.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Number of values currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns true when no value is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    /// The channel's fixed capacity (0 for rendezvous).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.core.add_receiver();
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.core.drop_receiver();
    }
}

/// Future returned by [`Sender::send`]. A suspension point.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct SendFuture<'a, T> {
    core: &'a Arc<ChannelCore<T>>,
    value: Option<T>,
    slot: Option<SharedSendSlot<T>>,
}

impl<T> Unpin for SendFuture<'_, T> {}

impl<T> Future for SendFuture<'_, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(slot) = &this.slot {
            let mut guard = slot.lock().expect("channel waiter poisoned");
            return match std::mem::replace(&mut *guard, SendSlot::Delivered) {
                SendSlot::Waiting { value, waker: _ } => {
                    *guard = SendSlot::Waiting {
                        value,
                        waker: cx.waker().clone(),
                    };
                    drop(guard);
                    context::note_wait("channel send");
                    Poll::Pending
                }
                SendSlot::Delivered => {
                    drop(guard);
                    this.slot = None;
                    Poll::Ready(Ok(()))
                }
                SendSlot::Rejected { value } => {
                    drop(guard);
                    this.slot = None;
                    Poll::Ready(Err(SendError(value)))
                }
                SendSlot::Abandoned => {
                    drop(guard);
                    this.slot = None;
                    Poll::Pending
                }
            };
        }

        let value = this
            .value
            .take()
            .expect("SendFuture polled after completion");
        match this.core.start_send(value, cx.waker()) {
            SendStart::Sent => Poll::Ready(Ok(())),
            SendStart::Closed(value) => Poll::Ready(Err(SendError(value))),
            SendStart::Parked(slot) => {
                this.slot = Some(slot);
                context::note_wait("channel send");
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for SendFuture<'_, T> {
    fn drop(&mut self) {
        if let Some(slot) = &self.slot {
            abandon_send(slot);
        }
    }
}

/// Future returned by [`Receiver::recv`]. A suspension point.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct RecvFuture<'a, T> {
    core: &'a Arc<ChannelCore<T>>,
    slot: Option<SharedRecvSlot<T>>,
}

impl<T> Future for RecvFuture<'_, T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(slot) = &this.slot {
            let mut guard = slot.lock().expect("channel waiter poisoned");
            return match std::mem::replace(&mut *guard, RecvSlot::Closed) {
                RecvSlot::Waiting { waker: _ } => {
                    *guard = RecvSlot::Waiting {
                        waker: cx.waker().clone(),
                    };
                    drop(guard);
                    context::note_wait("channel recv");
                    Poll::Pending
                }
                RecvSlot::Value(value) => {
                    drop(guard);
                    this.slot = None;
                    Poll::Ready(Ok(value))
                }
                RecvSlot::Closed => {
                    drop(guard);
                    this.slot = None;
                    Poll::Ready(Err(RecvError))
                }
                RecvSlot::Abandoned => {
                    drop(guard);
                    this.slot = None;
                    Poll::Pending
                }
            };
        }

        match this.core.start_recv(cx.waker()) {
            RecvStart::Got(value) => Poll::Ready(Ok(value)),
            RecvStart::Closed => Poll::Ready(Err(RecvError)),
            RecvStart::Parked(slot) => {
                this.slot = Some(slot);
                context::note_wait("channel recv");
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for RecvFuture<'_, T> {
    fn drop(&mut self) {
        if let Some(slot) = &self.slot {
            if let Some(value) = abandon_recv(slot) {
                self.core.restore_value(value);
            }
        }
    }
}
