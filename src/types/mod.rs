//! Core types for the runtime.
//!
//! - [`id`]: identifier types (`TaskId`, `ScopeId`) and virtual `Time`
//! - [`cancel`]: cancellation reason, kind, and latch types
//! - [`outcome`]: terminal outcome summaries with a severity lattice
//! - [`policy`]: supervision policy for scope outcome handling

pub mod cancel;
pub mod id;
pub mod outcome;
pub mod policy;

pub use cancel::{CancelKind, CancelLatch, CancelReason};
pub use id::{ScopeId, TaskId, Time};
pub use outcome::{ScopeOutcome, Severity, TaskOutcome};
pub use policy::{ChildAction, SupervisionPolicy};
