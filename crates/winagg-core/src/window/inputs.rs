use crate::{
    error::InternalError,
    function::{AggregateFunction, FrameBounds},
    mask::RowMask,
    value::RowBatch,
};
use std::sync::Arc;

///
/// WindowAggregateInputs
///
/// Retained input rows and filter mask for one partition, shared by the
/// aggregators that address rows randomly after ingestion. Enforces the
/// sink-then-finalize-then-compute lifecycle.
///

pub(crate) struct WindowAggregateInputs {
    function: Arc<dyn AggregateFunction>,
    partition_count: usize,
    rows: RowBatch,
    filter_mask: RowMask,
    finalized: bool,
}

impl WindowAggregateInputs {
    #[must_use]
    pub(crate) fn new(function: Arc<dyn AggregateFunction>, partition_count: usize) -> Self {
        Self {
            function,
            partition_count,
            rows: RowBatch::default(),
            filter_mask: RowMask::all_valid(),
            finalized: false,
        }
    }

    #[must_use]
    pub(crate) fn function(&self) -> &dyn AggregateFunction {
        self.function.as_ref()
    }

    #[must_use]
    pub(crate) fn shared_function(&self) -> Arc<dyn AggregateFunction> {
        Arc::clone(&self.function)
    }

    #[must_use]
    pub(crate) const fn rows(&self) -> &RowBatch {
        &self.rows
    }

    #[must_use]
    pub(crate) const fn filter_mask(&self) -> &RowMask {
        &self.filter_mask
    }

    #[must_use]
    pub(crate) const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Append one batch; `filter` lists the batch-relative rows passing the
    /// FILTER clause.
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

        let offset = self.rows.len();
        self.rows.append(batch)?;

        if let Some(selection) = filter {
            // First filtered batch: earlier unfiltered rows stay included.
            if !self.filter_mask.is_materialized() {
                self.filter_mask =
                    RowMask::from_valid_rows(self.partition_count.max(self.rows.len()), 0..offset);
            }
            for &row in selection {
                self.filter_mask.set_valid(offset + row);
            }
        } else if self.filter_mask.is_materialized() {
            for row in offset..self.rows.len() {
                self.filter_mask.set_valid(row);
            }
        }

        Ok(())
    }

    pub(crate) fn finalize(&mut self) -> Result<(), InternalError> {
        if self.finalized {
            return Err(InternalError::finalize_invariant("finalize called twice"));
        }
        self.finalized = true;

        Ok(())
    }

    /// Validate one frame against the lifecycle and the ingested range.
    pub(crate) fn check_frame(
        &self,
        begin: usize,
        end: usize,
    ) -> Result<FrameBounds, InternalError> {
        if !self.finalized {
            return Err(InternalError::compute_invariant(
                "compute called before finalize",
            ));
        }
        if begin > end || end > self.rows.len() {
            return Err(InternalError::compute_invariant(format!(
                "frame [{begin}, {end}) outside {} ingested rows",
                self.rows.len()
            )));
        }

        Ok(FrameBounds::new(begin, end))
    }
}

/// Selections must be ascending, unique, and inside the batch.
pub(crate) fn check_selection(selection: &[usize], batch_len: usize) -> Result<(), InternalError> {
    if let Some(&last) = selection.last()
        && last >= batch_len
    {
        return Err(InternalError::sink_invariant(format!(
            "filter selection row {last} outside batch of {batch_len} rows"
        )));
    }
    if selection.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(InternalError::sink_invariant(
            "filter selection must be strictly ascending",
        ));
    }

    Ok(())
}
