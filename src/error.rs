//! Error types and error handling strategy for taskloom.
//!
//! This module defines the core error types used throughout the runtime.
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors compose well with the outcome severity lattice
//! - Panics inside tasks are isolated and converted to [`ErrorKind::TaskPanicked`]
//! - Errors are classified by recoverability for retry logic
//!
//! # Error Categories
//!
//! Errors are organized into categories:
//!
//! - **Cancellation**: Operation cancelled by request or timeout
//! - **Channels**: Communication primitive errors
//! - **Tasks**: Failures originating in task bodies
//! - **Internal**: Runtime bugs and invalid states
//!
//! # Recovery Classification
//!
//! All errors can be classified by [`Recoverability`]:
//! - `Transient`: Temporary failure, safe to retry
//! - `Permanent`: Unrecoverable, do not retry
//! - `Unknown`: Recoverability depends on context

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

use crate::types::CancelReason;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Cancellation ===
    /// Operation was cancelled.
    Cancelled,
    /// Deadline elapsed before the guarded work finished.
    TimedOut,

    // === Channels ===
    /// Channel is closed.
    ChannelClosed,
    /// Channel is full (would block).
    ChannelFull,
    /// Channel is empty (would block).
    ChannelEmpty,

    // === Tasks ===
    /// Task body returned an error.
    TaskFailed,
    /// Task body panicked.
    TaskPanicked,

    // === Internal / state machine ===
    /// Internal runtime error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Cancelled | Self::TimedOut => ErrorCategory::Cancellation,
            Self::ChannelClosed | Self::ChannelFull | Self::ChannelEmpty => ErrorCategory::Channel,
            Self::TaskFailed | Self::TaskPanicked => ErrorCategory::Task,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the recoverability classification for this error kind.
    ///
    /// This helps retry logic decide whether to attempt recovery.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            // Transient errors - safe to retry
            Self::ChannelFull | Self::ChannelEmpty => Recoverability::Transient,

            // Permanent errors - do not retry
            Self::Cancelled | Self::ChannelClosed | Self::TaskPanicked | Self::Internal => {
                Recoverability::Permanent
            }

            // Context-dependent errors
            Self::TimedOut | Self::TaskFailed => Recoverability::Unknown,
        }
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.recoverability(), Recoverability::Transient)
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Recoverability depends on context and cannot be determined
    /// from the error kind alone.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Cancellation-related failures.
    Cancellation,
    /// Channel and messaging failures.
    Channel,
    /// Failures originating in task bodies.
    Task,
    /// Internal runtime errors.
    Internal,
}

/// The main error type carried by failed tasks and scope outcomes.
#[derive(Debug, Clone)]
pub struct TaskError {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl TaskError {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error is a timeout condition.
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self.kind, ErrorKind::TimedOut)
    }

    /// Returns true if this error was produced from a panic payload.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self.kind, ErrorKind::TaskPanicked)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates a cancellation error from a structured reason.
    #[must_use]
    pub fn cancelled_with_reason(reason: &CancelReason) -> Self {
        Self::new(ErrorKind::Cancelled).with_message(format!("{reason}"))
    }

    /// Creates a timeout error.
    #[must_use]
    pub const fn timed_out() -> Self {
        Self::new(ErrorKind::TimedOut)
    }

    /// Creates a task failure with a human-readable description.
    #[must_use]
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TaskFailed).with_message(msg)
    }

    /// Creates an internal error (runtime bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Converts a caught panic payload into an error.
    ///
    /// String payloads (the common `panic!("...")` case) are preserved
    /// as the error message; other payload types are reported opaquely.
    #[must_use]
    pub fn panicked(payload: &(dyn Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        match msg {
            Some(m) => Self::new(ErrorKind::TaskPanicked).with_message(m),
            None => Self::new(ErrorKind::TaskPanicked).with_message("non-string panic payload"),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Error returned by `Sender::send` when the channel is closed.
///
/// The undelivered value is handed back so the caller can recover it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sending on a closed channel")]
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    /// Consumes the error, returning the value that failed to send.
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Error returned by `Sender::try_send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrySendError<T> {
    /// The channel is at capacity and no receiver is parked.
    #[error("channel is full")]
    Full(T),
    /// The channel is closed.
    #[error("sending on a closed channel")]
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Consumes the error, returning the value that failed to send.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Closed(value) => value,
        }
    }

    /// Returns true if the send failed because the channel was full.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Returns true if the send failed because the channel was closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Error returned by `Receiver::recv` when the channel is closed and drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("receiving on a closed and empty channel")]
pub struct RecvError;

/// Error returned by `Receiver::try_recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    /// The channel is currently empty but senders remain.
    #[error("channel is empty")]
    Empty,
    /// The channel is closed and fully drained.
    #[error("receiving on a closed and empty channel")]
    Closed,
}

impl TryRecvError {
    /// Returns true if the receive failed because the channel was empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<RecvError> for TaskError {
    fn from(_: RecvError) -> Self {
        Self::new(ErrorKind::ChannelClosed)
    }
}

impl<T> From<SendError<T>> for TaskError {
    fn from(_: SendError<T>) -> Self {
        Self::new(ErrorKind::ChannelClosed)
    }
}

impl From<TryRecvError> for TaskError {
    fn from(e: TryRecvError) -> Self {
        match e {
            TryRecvError::Empty => Self::new(ErrorKind::ChannelEmpty),
            TryRecvError::Closed => Self::new(ErrorKind::ChannelClosed),
        }
    }
}

impl<T> From<TrySendError<T>> for TaskError {
    fn from(e: TrySendError<T>) -> Self {
        match e {
            TrySendError::Full(_) => Self::new(ErrorKind::ChannelFull),
            TrySendError::Closed(_) => Self::new(ErrorKind::ChannelClosed),
        }
    }
}
