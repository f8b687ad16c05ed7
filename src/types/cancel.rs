//! Cancellation reason, kind, and latch types.
//!
//! Cancellation is a cooperative protocol: a reason is latched onto a task,
//! and the task observes it at its next suspension point. These types record
//! why cancellation was requested and keep the strongest reason when several
//! requests overlap.

use core::fmt;
use serde::Serialize;
use std::sync::Mutex;

/// The kind of cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CancelKind {
    /// Explicit cancellation requested by user code.
    User,
    /// Cancellation because a timeout deadline expired.
    Timeout,
    /// Cancellation because a sibling task failed under fail-fast supervision.
    SiblingFailed,
    /// Cancellation because the parent scope was cancelled.
    ParentCancelled,
    /// Cancellation because the runtime is shutting down.
    Shutdown,
}

impl CancelKind {
    /// Returns the severity of this cancellation kind.
    ///
    /// Higher severity wins when reasons are strengthened.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Timeout => 1,
            Self::SiblingFailed => 2,
            Self::ParentCancelled => 3,
            Self::Shutdown => 4,
        }
    }
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::SiblingFailed => write!(f, "sibling failed"),
            Self::ParentCancelled => write!(f, "parent cancelled"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// The reason for a cancellation: kind plus optional context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message (static for determinism).
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a reason with the given kind and no message.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user cancellation reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            message: Some(message),
        }
    }

    /// Creates a timeout cancellation reason.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// Creates a sibling-failed cancellation reason.
    #[must_use]
    pub const fn sibling_failed() -> Self {
        Self::new(CancelKind::SiblingFailed)
    }

    /// Creates a parent-cancelled cancellation reason.
    #[must_use]
    pub const fn parent_cancelled() -> Self {
        Self::new(CancelKind::ParentCancelled)
    }

    /// Creates a shutdown cancellation reason.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(CancelKind::Shutdown)
    }

    /// Strengthens this reason with another, keeping the more severe one.
    ///
    /// Returns `true` if the reason changed. Equal kinds keep the
    /// lexicographically smaller message so the result does not depend on
    /// arrival order.
    pub fn strengthen(&mut self, other: &Self) -> bool {
        if other.kind > self.kind {
            self.kind = other.kind;
            self.message = other.message;
            return true;
        }
        if other.kind < self.kind {
            return false;
        }
        match (self.message, other.message) {
            (None, Some(msg)) => {
                self.message = Some(msg);
                true
            }
            (Some(current), Some(candidate)) if candidate < current => {
                self.message = Some(candidate);
                true
            }
            _ => false,
        }
    }

    /// Returns the kind of this reason.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// A one-way cancellation flag shared between a task's record, its handle,
/// and its completion guard.
///
/// Once requested, the latch never clears; later requests only strengthen
/// the stored reason.
#[derive(Debug, Default)]
pub struct CancelLatch {
    reason: Mutex<Option<CancelReason>>,
}

impl CancelLatch {
    /// Creates an unrequested latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches `reason`, strengthening any existing one.
    ///
    /// Returns `true` on the first request, `false` when a reason was
    /// already latched (the stored reason may still have been strengthened).
    pub fn request(&self, reason: CancelReason) -> bool {
        let mut slot = self.reason.lock().expect("cancel latch poisoned");
        match slot.as_mut() {
            Some(existing) => {
                existing.strengthen(&reason);
                false
            }
            None => {
                *slot = Some(reason);
                true
            }
        }
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.reason.lock().expect("cancel latch poisoned").is_some()
    }

    /// Returns the latched reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.lock().expect("cancel latch poisoned").clone()
    }
}
