//! Module: function
//! Responsibility: the opaque aggregate-function contract consumed by the
//! window aggregators.
//! Does not own: any concrete aggregate; state layout is private to each
//! implementation.
//! Boundary: the engine allocates `state_size()` bytes per state and only
//! ever passes those bytes back through this trait.

use crate::{
    mask::RowMask,
    value::{InputRows, RowBatch, Value},
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// FrameBounds
///
/// Half-open row interval `[begin, end)` within one partition.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FrameBounds {
    pub begin: usize,
    pub end: usize,
}

impl FrameBounds {
    #[must_use]
    pub const fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.begin >= self.end
    }
}

impl fmt::Display for FrameBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

///
/// AggregateError
///
/// Failure signalled by an aggregate function. The engine propagates it
/// unchanged and never retries.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum AggregateError {
    #[error("aggregate {function} overflowed")]
    Overflow { function: String },

    #[error("aggregate {function} rejected input: {message}")]
    InvalidInput { function: String, message: String },

    #[error("aggregate {function} does not implement {operation}")]
    Unsupported {
        function: String,
        operation: &'static str,
    },
}

///
/// AggregateCapabilities
///
/// Optional operations an aggregate function implements. Variant selection
/// reads these once when the aggregator is built.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AggregateCapabilities {
    pub combine: bool,
    pub window: bool,
    pub destructor: bool,
}

impl AggregateCapabilities {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            combine: false,
            window: false,
            destructor: false,
        }
    }

    #[must_use]
    pub const fn with_combine(mut self) -> Self {
        self.combine = true;
        self
    }

    #[must_use]
    pub const fn with_window(mut self) -> Self {
        self.window = true;
        self
    }

    #[must_use]
    pub const fn with_destructor(mut self) -> Self {
        self.destructor = true;
        self
    }
}

///
/// AggregateFunction
///
/// Opaque aggregate contract. Every state handed to `update`, `combine`,
/// `finalize` or `destroy` was produced by `initialize` and has only been
/// mutated through `update`/`combine` since.
///

pub trait AggregateFunction: Send + Sync {
    /// Name used in diagnostics and error messages.
    fn name(&self) -> &str;

    /// Fixed byte size of one state; immutable for the function's lifetime.
    fn state_size(&self) -> usize;

    fn capabilities(&self) -> AggregateCapabilities;

    /// Write an empty state into `state`.
    fn initialize(&self, state: &mut [u8]);

    /// Fold every row of `inputs` into `state`.
    fn update(&self, inputs: &InputRows<'_>, state: &mut [u8]) -> Result<(), AggregateError>;

    /// Fold every state of `sources` into `target`.
    fn combine(&self, sources: &[&[u8]], target: &mut [u8]) -> Result<(), AggregateError> {
        let _ = (sources, target);

        Err(AggregateError::Unsupported {
            function: self.name().to_string(),
            operation: "combine",
        })
    }

    /// Produce the aggregate of `frame` given the previously computed frame,
    /// adjusting `state` incrementally. Rows failing `filter` are excluded.
    fn window(
        &self,
        inputs: &RowBatch,
        filter: &RowMask,
        state: &mut [u8],
        frame: FrameBounds,
        previous: FrameBounds,
    ) -> Result<Value, AggregateError> {
        let _ = (inputs, filter, state, frame, previous);

        Err(AggregateError::Unsupported {
            function: self.name().to_string(),
            operation: "window",
        })
    }

    /// Read the final value out of `state` without mutating it.
    fn finalize(&self, state: &[u8]) -> Result<Value, AggregateError>;

    /// Release resources held by each state. Called exactly once per state
    /// when `capabilities().destructor` is set.
    fn destroy(&self, states: &mut [&mut [u8]]) {
        let _ = states;
    }
}
