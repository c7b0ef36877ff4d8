//! Module: window::constant
//! Responsibility: whole-partition frames; one aggregate per sub-partition,
//! computed in a single forward pass during sink and replayed by compute.
//! Does not own: boundary detection policy (the caller's boundary mask).

use crate::{
    error::InternalError,
    function::{AggregateFunction, FrameBounds},
    mask::RowMask,
    obs::sink::{ComputeSpan, MetricsEvent, record},
    state::AggregateState,
    value::{InputRows, ResultColumn, RowBatch},
    window::{AggregatorKind, inputs::check_selection},
};
use std::sync::Arc;

///
/// ConstantAggregator
///
/// Sub-partition offsets are located once from the boundary mask. `sink`
/// folds rows into the open sub-partition's state and finalizes it into
/// `results` as soon as the ingest cursor crosses the next boundary.
///

pub struct ConstantAggregator {
    function: Arc<dyn AggregateFunction>,
    partition_count: usize,
    // Sub-partition starts followed by `partition_count`.
    partition_offsets: Vec<usize>,
    results: ResultColumn,
    state: AggregateState,
    partition: usize,
    row: usize,
    finalized: bool,
}

impl ConstantAggregator {
    #[must_use]
    pub(crate) fn new(
        function: Arc<dyn AggregateFunction>,
        partition_count: usize,
        boundaries: &RowMask,
    ) -> Self {
        let mut partition_offsets = if boundaries.is_materialized() {
            boundaries.valid_rows(partition_count)
        } else {
            vec![0]
        };
        if partition_offsets.first() != Some(&0) {
            partition_offsets.insert(0, 0);
        }

        let results = ResultColumn::with_len(partition_offsets.len());
        partition_offsets.push(partition_count);

        Self {
            state: AggregateState::initialized(Arc::clone(&function)),
            function,
            partition_count,
            partition_offsets,
            results,
            partition: 0,
            row: 0,
            finalized: false,
        }
    }

    /// Number of sub-partitions located in the boundary mask.
    #[must_use]
    pub fn sub_partitions(&self) -> usize {
        self.results.len()
    }

    pub(crate) fn sink(
        &mut self,
        batch: &RowBatch,
        filter: Option<&[usize]>,
    ) -> Result<(), InternalError> {
        if self.finalized {
            return Err(InternalError::sink_invariant("sink called after finalize"));
        }
        if let Some(selection) = filter {
            check_selection(selection, batch.len())?;
        }

        let chunk_begin = self.row;
        let chunk_end = chunk_begin + batch.len();
        if chunk_end > self.partition_count {
            return Err(InternalError::sink_invariant(format!(
                "sink past partition end: rows [{chunk_begin}, {chunk_end}) of {}",
                self.partition_count
            )));
        }

        let mut begin = 0;
        let mut filter_idx = 0;
        let mut partition_end = self.offset(self.partition + 1)?;
        while self.row < chunk_end {
            if self.row == partition_end {
                self.finalize_partition()?;
                partition_end = self.offset(self.partition + 1)?;
            }
            partition_end = partition_end.min(chunk_end);
            let end = partition_end - chunk_begin;

            match filter {
                Some(selection) => {
                    // Slice to the filtered rows in [begin, end).
                    while filter_idx < selection.len() && selection[filter_idx] < begin {
                        filter_idx += 1;
                    }
                    let first = filter_idx;
                    while filter_idx < selection.len() && selection[filter_idx] < end {
                        filter_idx += 1;
                    }
                    self.update(&batch.select(&selection[first..filter_idx]))?;
                }
                None => self.update(&batch.rows(begin..end))?,
            }

            // Filtered-out rows still advance the cursor.
            self.row += end - begin;
            begin = end;
        }

        record(MetricsEvent::RowsSunk {
            kind: AggregatorKind::Constant,
            rows: batch.len() as u64,
            filtered: filter.map_or(0, |selection| (batch.len() - selection.len()) as u64),
        });

        Ok(())
    }

    pub(crate) fn finalize(&mut self) -> Result<(), InternalError> {
        if self.finalized {
            return Err(InternalError::finalize_invariant("finalize called twice"));
        }
        if self.row != self.partition_count {
            return Err(InternalError::finalize_invariant(format!(
                "constant aggregate finalized after {} of {} rows",
                self.row, self.partition_count
            )));
        }

        let value = self.state.finalize()?;
        self.results.set(self.partition, value)?;
        record(MetricsEvent::SubPartitionFinalized);

        self.partition = 0;
        self.row = 0;
        self.finalized = true;

        Ok(())
    }

    pub(crate) fn compute(
        &mut self,
        output: &mut ResultColumn,
        row: usize,
        begin: usize,
        end: usize,
    ) -> Result<(), InternalError> {
        if !self.finalized {
            return Err(InternalError::compute_invariant(
                "compute called before finalize",
            ));
        }
        if begin > end || end > self.partition_count {
            return Err(InternalError::compute_invariant(format!(
                "frame [{begin}, {end}) outside {} partition rows",
                self.partition_count
            )));
        }
        let _span = ComputeSpan::new(AggregatorKind::Constant, FrameBounds::new(begin, end));

        // Calls usually arrive in row order, so scan forward from the last
        // hit and only search when the frame moved backwards.
        let last = self.results.len() - 1;
        if begin < self.partition_offsets[self.partition] {
            self.partition = self
                .partition_offsets
                .partition_point(|&offset| offset <= begin)
                .saturating_sub(1);
        }
        while self.partition < last && self.partition_offsets[self.partition + 1] <= begin {
            self.partition += 1;
        }

        let partition_end = self.offset(self.partition + 1)?;
        if end > partition_end {
            return Err(InternalError::compute_invariant(format!(
                "frame [{begin}, {end}) crosses sub-partition end {partition_end}"
            )));
        }

        output.copy_from(&self.results, self.partition, row)
    }

    fn update(&mut self, rows: &InputRows<'_>) -> Result<(), InternalError> {
        if rows.is_empty() {
            return Ok(());
        }

        self.function.update(rows, self.state.bytes_mut()?)?;

        Ok(())
    }

    fn finalize_partition(&mut self) -> Result<(), InternalError> {
        let value = self.state.finalize()?;
        self.results.set(self.partition, value)?;
        record(MetricsEvent::SubPartitionFinalized);

        self.partition += 1;
        self.state.reset();

        Ok(())
    }

    fn offset(&self, index: usize) -> Result<usize, InternalError> {
        self.partition_offsets.get(index).copied().ok_or_else(|| {
            InternalError::sink_invariant(format!(
                "sub-partition offset {index} outside {} offsets",
                self.partition_offsets.len()
            ))
        })
    }
}
