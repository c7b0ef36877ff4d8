use crate::function::AggregateError;
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Invariant violations mean a caller or engine bug; aggregate failures are
/// carried unchanged from the aggregate function in `detail`.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    #[must_use]
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a sink-origin invariant violation.
    pub(crate) fn sink_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Sink, message)
    }

    /// Construct a finalize-origin invariant violation.
    pub(crate) fn finalize_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Finalize, message)
    }

    /// Construct a compute-origin invariant violation.
    pub(crate) fn compute_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Compute, message)
    }

    /// Construct a segment-tree bookkeeping invariant violation.
    pub(crate) fn tree_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::SegmentTree,
            message,
        )
    }

    /// Construct a state-arena invariant violation.
    pub(crate) fn state_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::StateArena,
            message,
        )
    }

    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self.class, ErrorClass::InvariantViolation)
    }

    /// Borrow the aggregate-function failure this error carries, if any.
    #[must_use]
    pub const fn aggregate_error(&self) -> Option<&AggregateError> {
        match &self.detail {
            Some(ErrorDetail::Aggregate(err)) => Some(err),
            None => None,
        }
    }
}

impl From<AggregateError> for InternalError {
    fn from(err: AggregateError) -> Self {
        Self {
            class: ErrorClass::Aggregate,
            origin: ErrorOrigin::Function,
            message: err.to_string(),
            detail: Some(ErrorDetail::Aggregate(err)),
        }
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Aggregate(AggregateError),
}

///
/// ErrorClass
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    InvariantViolation,
    Aggregate,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvariantViolation => "invariant_violation",
            Self::Aggregate => "aggregate",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Sink,
    Finalize,
    Compute,
    SegmentTree,
    StateArena,
    Function,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sink => "sink",
            Self::Finalize => "finalize",
            Self::Compute => "compute",
            Self::SegmentTree => "segment_tree",
            Self::StateArena => "state_arena",
            Self::Function => "function",
        };
        write!(f, "{label}")
    }
}
