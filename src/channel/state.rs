//! Shared channel state and parked-waiter bookkeeping.
//!
//! One mutex guards the buffered queue, both waiter queues, and the
//! endpoint counts; it is the only synchronization a channel needs even
//! under a multi-threaded embedding. Waiter queues hold shared slots
//! rather than bare wakers: a parked sender's value lives in its slot
//! until a receiver takes it, a close hands it back, or the suspended
//! future is dropped. Waiters resolve strictly oldest-first; abandoned
//! slots are skipped when popped, which keeps the FIFO rule intact
//! without eager removal.

use crate::error::{SendError, TryRecvError, TrySendError};
use crate::tracing_compat::trace;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::task::Waker;

/// The resolution state of a parked sender.
#[derive(Debug)]
pub(super) enum SendSlot<T> {
    /// Still parked; holds the value and the waker to fire on resolution.
    Waiting { value: T, waker: Waker },
    /// A receiver took the value; the send succeeded.
    Delivered,
    /// The channel closed under the parked sender; the value is handed back.
    Rejected { value: T },
    /// The suspended send future was dropped before resolving.
    Abandoned,
}

/// The resolution state of a parked receiver.
#[derive(Debug)]
pub(super) enum RecvSlot<T> {
    /// Still parked.
    Waiting { waker: Waker },
    /// A sender handed a value over directly.
    Value(T),
    /// The channel closed with nothing left to drain.
    Closed,
    /// The suspended recv future was dropped before resolving.
    Abandoned,
}

pub(super) type SharedSendSlot<T> = Arc<Mutex<SendSlot<T>>>;
pub(super) type SharedRecvSlot<T> = Arc<Mutex<RecvSlot<T>>>;

/// Outcome of the first poll of a send.
pub(super) enum SendStart<T> {
    /// The value was buffered or handed to a receiver.
    Sent,
    /// The channel is closed; the value comes back.
    Closed(T),
    /// The queue is full; the sender parked in FIFO order.
    Parked(SharedSendSlot<T>),
}

/// Outcome of the first poll of a recv.
pub(super) enum RecvStart<T> {
    /// A value was available.
    Got(T),
    /// The channel is closed and fully drained.
    Closed,
    /// Nothing available; the receiver parked in FIFO order.
    Parked(SharedRecvSlot<T>),
}

#[derive(Debug)]
struct ChannelState<T> {
    /// Buffered values, oldest first. Size never exceeds `capacity`.
    queue: VecDeque<T>,
    capacity: usize,
    /// Senders parked on a full queue, oldest first.
    send_waiters: VecDeque<SharedSendSlot<T>>,
    /// Receivers parked on an empty queue, oldest first.
    recv_waiters: VecDeque<SharedRecvSlot<T>>,
    closed: bool,
    sender_count: usize,
    receiver_count: usize,
}

impl<T> ChannelState<T> {
    fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            send_waiters: VecDeque::new(),
            recv_waiters: VecDeque::new(),
            closed: false,
            sender_count: 1,
            receiver_count: 1,
        }
    }

    /// Sends fail once the channel is closed or no receiver can ever take
    /// the value.
    fn send_side_closed(&self) -> bool {
        self.closed || self.receiver_count == 0
    }

    /// Receives report closed once the buffer is drained and no sender can
    /// ever refill it.
    fn recv_side_closed(&self) -> bool {
        self.closed || self.sender_count == 0
    }

    /// Pops the oldest parked receiver that is still waiting and hands it
    /// `value`, waking it. Returns the value back if every parked receiver
    /// was abandoned.
    fn hand_to_receiver(&mut self, value: T) -> Result<(), T> {
        while let Some(slot) = self.recv_waiters.pop_front() {
            let mut guard = slot.lock().expect("channel waiter poisoned");
            match std::mem::replace(&mut *guard, RecvSlot::Abandoned) {
                RecvSlot::Waiting { waker } => {
                    *guard = RecvSlot::Value(value);
                    drop(guard);
                    waker.wake();
                    return Ok(());
                }
                // Abandoned slots are skipped; resolved slots never linger
                // in the queue.
                other => *guard = other,
            }
        }
        Err(value)
    }

    /// Takes the value of the oldest parked sender that is still waiting,
    /// marking it delivered and waking it.
    fn take_from_sender(&mut self) -> Option<T> {
        while let Some(slot) = self.send_waiters.pop_front() {
            let mut guard = slot.lock().expect("channel waiter poisoned");
            match std::mem::replace(&mut *guard, SendSlot::Delivered) {
                SendSlot::Waiting { value, waker } => {
                    drop(guard);
                    waker.wake();
                    return Some(value);
                }
                other => *guard = other,
            }
        }
        None
    }

    /// After a successful pop from the buffer, pull the oldest parked
    /// sender's value in so the capacity bound stays tight.
    fn refill_from_sender(&mut self) {
        if self.queue.len() < self.capacity {
            if let Some(value) = self.take_from_sender() {
                self.queue.push_back(value);
            }
        }
    }
}

/// The shared core of a channel, held by every endpoint and parked future.
#[derive(Debug)]
pub(super) struct ChannelCore<T> {
    state: Mutex<ChannelState<T>>,
}

impl<T> ChannelCore<T> {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ChannelState::new(capacity)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState<T>> {
        self.state.lock().expect("channel state poisoned")
    }

    /// First poll of a send: deliver, buffer, or park.
    pub(super) fn start_send(&self, value: T, waker: &Waker) -> SendStart<T> {
        let mut state = self.lock();
        if state.send_side_closed() {
            return SendStart::Closed(value);
        }
        match state.hand_to_receiver(value) {
            Ok(()) => SendStart::Sent,
            Err(value) => {
                if state.queue.len() < state.capacity {
                    state.queue.push_back(value);
                    SendStart::Sent
                } else {
                    let slot = Arc::new(Mutex::new(SendSlot::Waiting {
                        value,
                        waker: waker.clone(),
                    }));
                    state.send_waiters.push_back(Arc::clone(&slot));
                    trace!(parked = state.send_waiters.len(), "sender parked");
                    SendStart::Parked(slot)
                }
            }
        }
    }

    /// First poll of a recv: take a value or park.
    pub(super) fn start_recv(&self, waker: &Waker) -> RecvStart<T> {
        let mut state = self.lock();
        if let Some(value) = state.queue.pop_front() {
            state.refill_from_sender();
            return RecvStart::Got(value);
        }
        // Rendezvous: take straight from the oldest parked sender.
        if let Some(value) = state.take_from_sender() {
            return RecvStart::Got(value);
        }
        if state.recv_side_closed() {
            return RecvStart::Closed;
        }
        let slot = Arc::new(Mutex::new(RecvSlot::Waiting {
            waker: waker.clone(),
        }));
        state.recv_waiters.push_back(Arc::clone(&slot));
        trace!(parked = state.recv_waiters.len(), "receiver parked");
        RecvStart::Parked(slot)
    }

    /// Non-suspending send: `Full` where a send would park.
    pub(super) fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut state = self.lock();
        if state.send_side_closed() {
            return Err(TrySendError::Closed(value));
        }
        match state.hand_to_receiver(value) {
            Ok(()) => Ok(()),
            Err(value) => {
                if state.queue.len() < state.capacity {
                    state.queue.push_back(value);
                    Ok(())
                } else {
                    Err(TrySendError::Full(value))
                }
            }
        }
    }

    /// Non-suspending recv: `Empty` where a recv would park.
    pub(super) fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.lock();
        if let Some(value) = state.queue.pop_front() {
            state.refill_from_sender();
            return Ok(value);
        }
        if let Some(value) = state.take_from_sender() {
            return Ok(value);
        }
        if state.recv_side_closed() {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Single-slot lossy send: never parks, the newest value overwrites an
    /// unconsumed one. The ticker's at-most-one-pending rule lives here.
    pub(super) fn send_lossy(&self, value: T) -> Result<(), SendError<T>> {
        let mut state = self.lock();
        if state.send_side_closed() {
            return Err(SendError(value));
        }
        match state.hand_to_receiver(value) {
            Ok(()) => Ok(()),
            Err(value) => {
                if state.queue.len() >= state.capacity.max(1) {
                    state.queue.pop_front();
                }
                state.queue.push_back(value);
                Ok(())
            }
        }
    }

    /// Puts back a value a cancelled recv future had already been handed.
    ///
    /// Delivered to the oldest parked receiver when one exists, otherwise
    /// re-queued at the front since it was the oldest value.
    pub(super) fn restore_value(&self, value: T) {
        let mut state = self.lock();
        if let Err(value) = state.hand_to_receiver(value) {
            state.queue.push_front(value);
        }
    }

    /// Closes the channel: idempotent; parked senders fail with their value
    /// handed back, parked receivers see closed. Buffered values stay for
    /// draining.
    pub(super) fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        trace!(
            buffered = state.queue.len(),
            senders = state.send_waiters.len(),
            receivers = state.recv_waiters.len(),
            "channel closed"
        );
        Self::reject_parked_senders(&mut state);
        Self::wake_parked_receivers(&mut state);
    }

    /// Returns true once `close` was called or an endpoint side is gone.
    pub(super) fn is_closed(&self) -> bool {
        let state = self.lock();
        state.closed || state.sender_count == 0 || state.receiver_count == 0
    }

    /// Number of buffered values.
    pub(super) fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub(super) fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub(super) fn add_sender(&self) {
        self.lock().sender_count += 1;
    }

    /// Last sender gone: receivers drain the buffer then see closed.
    pub(super) fn drop_sender(&self) {
        let mut state = self.lock();
        state.sender_count -= 1;
        if state.sender_count == 0 {
            Self::wake_parked_receivers(&mut state);
        }
    }

    pub(super) fn add_receiver(&self) {
        self.lock().receiver_count += 1;
    }

    /// Last receiver gone: sends can never complete, so parked senders are
    /// rejected now.
    pub(super) fn drop_receiver(&self) {
        let mut state = self.lock();
        state.receiver_count -= 1;
        if state.receiver_count == 0 {
            Self::reject_parked_senders(&mut state);
        }
    }

    fn reject_parked_senders(state: &mut ChannelState<T>) {
        while let Some(slot) = state.send_waiters.pop_front() {
            let mut guard = slot.lock().expect("channel waiter poisoned");
            match std::mem::replace(&mut *guard, SendSlot::Abandoned) {
                SendSlot::Waiting { value, waker } => {
                    *guard = SendSlot::Rejected { value };
                    drop(guard);
                    waker.wake();
                }
                other => *guard = other,
            }
        }
    }

    fn wake_parked_receivers(state: &mut ChannelState<T>) {
        while let Some(slot) = state.recv_waiters.pop_front() {
            let mut guard = slot.lock().expect("channel waiter poisoned");
            match std::mem::replace(&mut *guard, RecvSlot::Closed) {
                RecvSlot::Waiting { waker } => {
                    drop(guard);
                    waker.wake();
                }
                other => *guard = other,
            }
        }
    }
}

/// Marks a parked send slot abandoned, recovering nothing; called from the
/// send future's drop.
pub(super) fn abandon_send<T>(slot: &SharedSendSlot<T>) {
    let mut guard = slot.lock().expect("channel waiter poisoned");
    if let SendSlot::Waiting { .. } = &*guard {
        *guard = SendSlot::Abandoned;
    }
}

/// Marks a parked recv slot abandoned and returns a value it may already
/// have been handed; called from the recv future's drop.
pub(super) fn abandon_recv<T>(slot: &SharedRecvSlot<T>) -> Option<T> {
    let mut guard = slot.lock().expect("channel waiter poisoned");
    match std::mem::replace(&mut *guard, RecvSlot::Abandoned) {
        RecvSlot::Value(value) => Some(value),
        _ => None,
    }
}
