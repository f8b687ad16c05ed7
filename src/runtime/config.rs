//! Runtime configuration.

use serde::{Deserialize, Serialize};

const DEFAULT_TRACE_CAPACITY: usize = 1024;

/// Knobs for a [`Runtime`](super::Runtime).
///
/// Built with chained setters:
///
/// ```
/// use taskloom::RuntimeConfig;
///
/// let config = RuntimeConfig::new().with_seed(42).with_trace_capacity(256);
/// assert_eq!(config.seed(), Some(42));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    trace_capacity: usize,
    seed: Option<u64>,
    catch_panics: bool,
}

impl RuntimeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many trace events the ring buffer retains.
    #[must_use]
    pub fn with_trace_capacity(mut self, capacity: usize) -> Self {
        self.trace_capacity = capacity;
        self
    }

    /// Seeds the scheduler: the ready lane is drained in a seeded
    /// pseudo-random order instead of FIFO, so tests can explore orderings
    /// the API leaves unspecified. The same seed replays the same order.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Controls whether a panicking task is isolated as a task failure
    /// (the default) or allowed to unwind out of the executor.
    #[must_use]
    pub fn with_panic_isolation(mut self, catch: bool) -> Self {
        self.catch_panics = catch;
        self
    }

    /// The trace ring capacity.
    #[must_use]
    pub fn trace_capacity(&self) -> usize {
        self.trace_capacity
    }

    /// The scheduling seed, if set.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Whether task panics are isolated as failures.
    #[must_use]
    pub fn panic_isolation(&self) -> bool {
        self.catch_panics
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            seed: None,
            catch_panics: true,
        }
    }
}
