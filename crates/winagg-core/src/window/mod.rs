//! Module: window
//! Responsibility: per-partition window aggregate evaluation and the choice
//! between the constant, custom and segment-tree strategies.
//! Does not own: frame-bound evaluation, partitioning, or aggregate
//! semantics.
//! Boundary: the window operator builds one `WindowAggregator` per
//! (aggregate, partition), sinks every batch, finalizes once, then computes
//! one frame per output row.

mod constant;
mod custom;
mod inputs;
mod segment_tree;

#[cfg(test)]
mod tests;

pub use constant::ConstantAggregator;
pub use custom::CustomAggregator;
pub use segment_tree::SegmentTreeAggregator;

use crate::{
    config::WindowAggregateConfig,
    error::InternalError,
    function::{AggregateCapabilities, AggregateFunction},
    mask::RowMask,
    obs::sink::{MetricsEvent, record},
    value::{ResultColumn, RowBatch},
};
use std::{fmt, sync::Arc};

///
/// AggregatorKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregatorKind {
    Constant,
    Custom,
    SegmentTree,
}

impl AggregatorKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Custom => "custom",
            Self::SegmentTree => "segment_tree",
        }
    }

    /// Pick the evaluation strategy for one aggregate.
    ///
    /// Whole-partition frames always replay one constant per sub-partition;
    /// otherwise a custom `window` operation wins when the mode allows it,
    /// and the segment tree covers everything else.
    #[must_use]
    pub const fn select(
        frame: FrameShape,
        capabilities: AggregateCapabilities,
        config: &WindowAggregateConfig,
    ) -> Self {
        if matches!(frame, FrameShape::WholePartition) {
            return Self::Constant;
        }
        if capabilities.window && config.mode().allows_window_api() {
            return Self::Custom;
        }

        Self::SegmentTree
    }
}

impl fmt::Display for AggregatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

///
/// FrameShape
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FrameShape {
    /// No ORDER BY: every frame is the row's whole sub-partition.
    WholePartition,
    /// Frames vary per row.
    #[default]
    PerRow,
}

///
/// WindowAggregateSpec
///
/// Partition-open facts the window operator hands to the aggregator.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WindowAggregateSpec {
    pub partition_rows: usize,
    pub frame: FrameShape,
    /// Bit set = first row of a sub-partition. Only read for
    /// whole-partition frames.
    pub boundaries: RowMask,
}

impl WindowAggregateSpec {
    #[must_use]
    pub const fn per_row(partition_rows: usize) -> Self {
        Self {
            partition_rows,
            frame: FrameShape::PerRow,
            boundaries: RowMask::all_valid(),
        }
    }

    #[must_use]
    pub const fn whole_partition(partition_rows: usize, boundaries: RowMask) -> Self {
        Self {
            partition_rows,
            frame: FrameShape::WholePartition,
            boundaries,
        }
    }
}

///
/// WindowAggregator
///
/// Closed set of evaluation strategies behind one sink/finalize/compute
/// surface. Owns every aggregate state it creates and destroys each exactly
/// once when dropped.
///

pub enum WindowAggregator {
    Constant(ConstantAggregator),
    Custom(CustomAggregator),
    SegmentTree(SegmentTreeAggregator),
}

impl WindowAggregator {
    #[must_use]
    pub fn new(
        function: Arc<dyn AggregateFunction>,
        spec: &WindowAggregateSpec,
        config: &WindowAggregateConfig,
    ) -> Self {
        let kind = AggregatorKind::select(spec.frame, function.capabilities(), config);
        if config.debug() {
            println!(
                "[debug] window aggregate {}: kind={kind} rows={} mode={:?}",
                function.name(),
                spec.partition_rows,
                config.mode()
            );
        }
        record(MetricsEvent::AggregatorBuilt {
            kind,
            partition_rows: spec.partition_rows as u64,
        });

        match kind {
            AggregatorKind::Constant => Self::Constant(ConstantAggregator::new(
                function,
                spec.partition_rows,
                &spec.boundaries,
            )),
            AggregatorKind::Custom => {
                Self::Custom(CustomAggregator::new(function, spec.partition_rows))
            }
            AggregatorKind::SegmentTree => Self::SegmentTree(SegmentTreeAggregator::new(
                function,
                spec.partition_rows,
                config,
            )),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> AggregatorKind {
        match self {
            Self::Constant(_) => AggregatorKind::Constant,
            Self::Custom(_) => AggregatorKind::Custom,
            Self::SegmentTree(_) => AggregatorKind::SegmentTree,
        }
    }

    /// Ingest one batch in row order. `filter` lists the batch-relative rows
    /// that pass the FILTER clause, ascending.
    pub fn sink(
        &mut self,
        batch: &RowBatch,
        filter: Option<&[usize]>,
    ) -> Result<(), InternalError> {
        match self {
            Self::Constant(aggregator) => aggregator.sink(batch, filter),
            Self::Custom(aggregator) => aggregator.sink(batch, filter),
            Self::SegmentTree(aggregator) => aggregator.sink(batch, filter),
        }
    }

    /// Signal that ingestion is complete. Must be called exactly once.
    pub fn finalize(&mut self) -> Result<(), InternalError> {
        match self {
            Self::Constant(aggregator) => aggregator.finalize(),
            Self::Custom(aggregator) => aggregator.finalize(),
            Self::SegmentTree(aggregator) => aggregator.finalize(),
        }
    }

    /// Write the aggregate of rows `[begin, end)` into `output[row]`.
    pub fn compute(
        &mut self,
        output: &mut ResultColumn,
        row: usize,
        begin: usize,
        end: usize,
    ) -> Result<(), InternalError> {
        match self {
            Self::Constant(aggregator) => aggregator.compute(output, row, begin, end),
            Self::Custom(aggregator) => aggregator.compute(output, row, begin, end),
            Self::SegmentTree(aggregator) => aggregator.compute(output, row, begin, end),
        }
    }
}
