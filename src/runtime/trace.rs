//! Execution trace events and the ring buffer that stores them.
//!
//! Every observable runtime action appends an event: spawns, polls,
//! completions, cancellation requests, scope transitions, and virtual time
//! jumps. The buffer keeps the most recent events in a fixed-size ring, so
//! a long run cannot grow memory without bound. Snapshots serialize for
//! offline inspection.

use crate::types::{CancelReason, ScopeId, TaskId, Time};
use core::fmt;
use serde::Serialize;

/// The kind of trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceEventKind {
    /// A task was spawned.
    Spawn,
    /// A task was enqueued on the scheduler.
    Schedule,
    /// A task was polled.
    Poll,
    /// A task reached a terminal state.
    Complete,
    /// Cancellation was requested for a task.
    CancelRequest,
    /// A scope was created.
    ScopeCreated,
    /// A scope closed.
    ScopeClosed,
    /// Virtual time advanced.
    TimeAdvance,
    /// User-defined trace point.
    UserTrace,
}

/// Additional data carried by a trace event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TraceData {
    /// No additional data.
    None,
    /// Task-related data.
    Task {
        /// The task involved.
        task: TaskId,
        /// The scope the task belongs to.
        scope: ScopeId,
    },
    /// Scope-related data.
    Scope {
        /// The scope involved.
        scope: ScopeId,
        /// The parent scope, if any.
        parent: Option<ScopeId>,
    },
    /// Cancellation data.
    Cancel {
        /// The task being cancelled.
        task: TaskId,
        /// The reason for cancellation.
        reason: CancelReason,
    },
    /// Time data.
    Time {
        /// The previous time.
        old: Time,
        /// The new time.
        new: Time,
    },
    /// User message.
    Message(String),
}

/// A single event in the execution trace.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    /// Sequence number (monotonically increasing).
    pub seq: u64,
    /// Virtual time when the event occurred.
    pub time: Time,
    /// The kind of event.
    pub kind: TraceEventKind,
    /// Additional data.
    pub data: TraceData,
}

impl TraceEvent {
    /// Creates a new trace event.
    #[must_use]
    pub fn new(seq: u64, time: Time, kind: TraceEventKind, data: TraceData) -> Self {
        Self {
            seq,
            time,
            kind,
            data,
        }
    }

    /// Creates a spawn event.
    #[must_use]
    pub fn spawn(seq: u64, time: Time, task: TaskId, scope: ScopeId) -> Self {
        Self::new(seq, time, TraceEventKind::Spawn, TraceData::Task { task, scope })
    }

    /// Creates a schedule event.
    #[must_use]
    pub fn schedule(seq: u64, time: Time, task: TaskId, scope: ScopeId) -> Self {
        Self::new(
            seq,
            time,
            TraceEventKind::Schedule,
            TraceData::Task { task, scope },
        )
    }

    /// Creates a poll event.
    #[must_use]
    pub fn poll(seq: u64, time: Time, task: TaskId, scope: ScopeId) -> Self {
        Self::new(seq, time, TraceEventKind::Poll, TraceData::Task { task, scope })
    }

    /// Creates a complete event.
    #[must_use]
    pub fn complete(seq: u64, time: Time, task: TaskId, scope: ScopeId) -> Self {
        Self::new(
            seq,
            time,
            TraceEventKind::Complete,
            TraceData::Task { task, scope },
        )
    }

    /// Creates a cancel request event.
    #[must_use]
    pub fn cancel_request(seq: u64, time: Time, task: TaskId, reason: CancelReason) -> Self {
        Self::new(
            seq,
            time,
            TraceEventKind::CancelRequest,
            TraceData::Cancel { task, reason },
        )
    }

    /// Creates a scope-created event.
    #[must_use]
    pub fn scope_created(seq: u64, time: Time, scope: ScopeId, parent: Option<ScopeId>) -> Self {
        Self::new(
            seq,
            time,
            TraceEventKind::ScopeCreated,
            TraceData::Scope { scope, parent },
        )
    }

    /// Creates a scope-closed event.
    #[must_use]
    pub fn scope_closed(seq: u64, time: Time, scope: ScopeId, parent: Option<ScopeId>) -> Self {
        Self::new(
            seq,
            time,
            TraceEventKind::ScopeClosed,
            TraceData::Scope { scope, parent },
        )
    }

    /// Creates a time-advance event.
    #[must_use]
    pub fn time_advance(seq: u64, old: Time, new: Time) -> Self {
        Self::new(seq, new, TraceEventKind::TimeAdvance, TraceData::Time { old, new })
    }

    /// Creates a user trace event.
    #[must_use]
    pub fn user_trace(seq: u64, time: Time, message: impl Into<String>) -> Self {
        Self::new(
            seq,
            time,
            TraceEventKind::UserTrace,
            TraceData::Message(message.into()),
        )
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:06}] {} {:?}", self.seq, self.time, self.kind)?;
        match &self.data {
            TraceData::None => {}
            TraceData::Task { task, scope } => write!(f, " {task} in {scope}")?,
            TraceData::Scope { scope, parent } => {
                write!(f, " {scope}")?;
                if let Some(p) = parent {
                    write!(f, " (parent: {p})")?;
                }
            }
            TraceData::Cancel { task, reason } => write!(f, " {task}: {reason}")?,
            TraceData::Time { old, new } => write!(f, " {old} -> {new}")?,
            TraceData::Message(msg) => write!(f, " \"{msg}\"")?,
        }
        Ok(())
    }
}

/// A ring buffer of recent trace events.
///
/// When the buffer is full, the oldest event is overwritten.
#[derive(Debug)]
pub struct TraceBuffer {
    events: Vec<Option<TraceEvent>>,
    head: usize,
    len: usize,
}

impl TraceBuffer {
    /// Creates a buffer holding up to `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Returns the capacity of the buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    /// Returns the number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if the buffer is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.events.len()
    }

    /// Pushes an event, overwriting the oldest when full.
    pub fn push(&mut self, event: TraceEvent) {
        let idx = (self.head + self.len) % self.events.len();
        self.events[idx] = Some(event);

        if self.len < self.events.len() {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % self.events.len();
        }
    }

    /// Returns an iterator over events, oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEvent> {
        (0..self.len).filter_map(move |i| {
            let idx = (self.head + i) % self.events.len();
            self.events[idx].as_ref()
        })
    }

    /// Returns the most recent event.
    #[must_use]
    pub fn last(&self) -> Option<&TraceEvent> {
        if self.len == 0 {
            None
        } else {
            let idx = (self.head + self.len - 1) % self.events.len();
            self.events[idx].as_ref()
        }
    }

    /// Clears all events.
    pub fn clear(&mut self) {
        for event in &mut self.events {
            *event = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl Default for TraceBuffer {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(seq: u64) -> TraceEvent {
        TraceEvent::user_trace(seq, Time::ZERO, format!("event {seq}"))
    }

    #[test]
    fn push_and_iterate_in_order() {
        let mut buf = TraceBuffer::new(4);
        buf.push(make_event(1));
        buf.push(make_event(2));
        buf.push(make_event(3));

        let seqs: Vec<_> = buf.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(buf.last().map(|e| e.seq), Some(3));
        assert!(!buf.is_full());
    }

    #[test]
    fn overflow_overwrites_oldest() {
        let mut buf = TraceBuffer::new(3);
        for seq in 1..=5 {
            buf.push(make_event(seq));
        }

        let seqs: Vec<_> = buf.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
        assert!(buf.is_full());
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buf = TraceBuffer::new(2);
        buf.push(make_event(1));
        buf.clear();

        assert!(buf.is_empty());
        assert_eq!(buf.last().map(|e| e.seq), None);
    }

    #[test]
    fn display_formats_event_kinds() {
        let spawn = TraceEvent::spawn(
            0,
            Time::from_millis(5),
            TaskId::new_for_test(1, 0),
            ScopeId::new_for_test(0, 0),
        );
        assert_eq!(spawn.to_string(), "[000000] 5ms Spawn T1 in S0");

        let advance = TraceEvent::time_advance(7, Time::ZERO, Time::from_millis(200));
        assert_eq!(advance.to_string(), "[000007] 200ms TimeAdvance 0ns -> 200ms");
    }
}
