use crate::{
    error::InternalError,
    function::{AggregateFunction, FrameBounds},
    obs::sink::{ComputeSpan, MetricsEvent, record},
    state::AggregateState,
    value::{ResultColumn, RowBatch},
    window::{AggregatorKind, inputs::WindowAggregateInputs},
};
use std::sync::Arc;

///
/// CustomAggregator
///
/// Thin adapter over an aggregate's own frame-aware `window` operation.
/// Keeps one persistent state for its whole lifetime and hands the function
/// both the previous and the current frame so it can add/remove rows
/// incrementally.
///

pub struct CustomAggregator {
    inputs: WindowAggregateInputs,
    state: AggregateState,
    frame: FrameBounds,
}

impl CustomAggregator {
    #[must_use]
    pub(crate) fn new(function: Arc<dyn AggregateFunction>, partition_count: usize) -> Self {
        Self {
            state: AggregateState::initialized(Arc::clone(&function)),
            inputs: WindowAggregateInputs::new(function, partition_count),
            frame: FrameBounds::default(),
        }
    }

    pub(crate) fn sink(
        &mut self,
        batch: &RowBatch,
        filter: Option<&[usize]>,
    ) -> Result<(), InternalError> {
        self.inputs.sink(batch, filter)?;
        record(MetricsEvent::RowsSunk {
            kind: AggregatorKind::Custom,
            rows: batch.len() as u64,
            filtered: filter.map_or(0, |selection| (batch.len() - selection.len()) as u64),
        });

        Ok(())
    }

    pub(crate) fn finalize(&mut self) -> Result<(), InternalError> {
        self.inputs.finalize()
    }

    pub(crate) fn compute(
        &mut self,
        output: &mut ResultColumn,
        row: usize,
        begin: usize,
        end: usize,
    ) -> Result<(), InternalError> {
        let frame = self.inputs.check_frame(begin, end)?;
        let mut span = ComputeSpan::new(AggregatorKind::Custom, frame);
        let previous = std::mem::replace(&mut self.frame, frame);

        span.add_calls(1);
        let value = self.inputs.function().window(
            self.inputs.rows(),
            self.inputs.filter_mask(),
            self.state.bytes_mut()?,
            frame,
            previous,
        )?;

        output.set(row, value)
    }
}
