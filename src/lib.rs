//! Taskloom: a structured-concurrency runtime with channel-based communication.
//!
//! # Overview
//!
//! Taskloom runs many lightweight tasks cooperatively on a single scheduler,
//! organizes them into a cancellation hierarchy of scopes, and lets them
//! communicate through bounded or rendezvous channels. Time is virtual: the
//! clock advances to the next timer deadline whenever no task is ready, so
//! timing-dependent programs execute deterministically.
//!
//! # Core Guarantees
//!
//! - **No orphan tasks**: every spawned task is owned by a scope; cancelling
//!   the scope reaches every descendant
//! - **Cooperative cancellation**: cancellation is observed at suspension
//!   points, never by preemption
//! - **Channel FIFO**: the Nth successful receive returns the Nth successfully
//!   enqueued value, and waiters of the same kind wake in suspension order
//! - **Observable failures**: an unawaited task failure reaches a scope-level
//!   handler or the runtime report, never the void
//! - **Deterministic scheduling**: one ready queue, virtual time, optional
//!   seeded exploration of the unspecified readiness order
//!
//! # Module Structure
//!
//! - [`types`]: core types (identifiers, time, cancellation, outcomes, policies)
//! - [`record`]: internal records for tasks and scopes
//! - [`runtime`]: scheduler, runtime state, handles, trace
//! - [`channel`]: bounded/rendezvous channels and the periodic ticker
//! - [`time`]: virtual timer wheel, sleep, yield
//! - [`combinator`]: timeout wrapper and pipeline stages
//! - [`util`]: internal utilities (arena, deterministic RNG)
//! - [`error`]: error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod channel;
pub mod combinator;
pub mod error;
pub mod record;
pub mod runtime;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenient access to core types
pub use channel::{channel, new_ticker, Receiver, Sender, Tick, Ticker};
pub use combinator::{
    filter_stage, map_stage, produce, with_timeout, with_timeout_or_none, with_timeout_try,
    TimedError, TimedOut,
};
pub use error::{
    ErrorCategory, ErrorKind, Recoverability, RecvError, SendError, TaskError, TryRecvError,
    TrySendError,
};
pub use runtime::{
    JoinError, QuiescenceReport, Runtime, RuntimeConfig, ScopeHandle, ScopeOptions, TaskHandle,
};
pub use time::{now, sleep, sleep_until, yield_now};
pub use types::{
    CancelKind, CancelReason, ScopeId, ScopeOutcome, SupervisionPolicy, TaskId, TaskOutcome, Time,
};
