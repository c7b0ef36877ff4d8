//! Windowed aggregate evaluation for a columnar query engine: per-partition
//! aggregators that answer `AGG(x) OVER (...)` frames through an opaque
//! aggregate-function contract, plus the state ownership, config, errors and
//! metrics they share.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod error;
pub mod function;
pub mod mask;
pub mod obs;
pub mod value;
pub mod window;

pub(crate) mod state;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Vocabulary needed to implement an aggregate function and drive one
/// window aggregator. No metrics or error internals are re-exported here.
///

pub mod prelude {
    pub use crate::{
        config::{WindowAggregateConfig, WindowAggregationMode},
        function::{AggregateCapabilities, AggregateError, AggregateFunction, FrameBounds},
        mask::RowMask,
        value::{InputRows, ResultColumn, RowBatch, RowRef, Value},
        window::{AggregatorKind, FrameShape, WindowAggregateSpec, WindowAggregator},
    };
}
