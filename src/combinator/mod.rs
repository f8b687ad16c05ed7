//! Combinators over tasks and channels: timeouts and pipeline stages.

mod pipeline;
mod timeout;

pub use pipeline::{filter_stage, map_stage, produce};
pub use timeout::{with_timeout, with_timeout_or_none, with_timeout_try, TimedError, TimedOut};
