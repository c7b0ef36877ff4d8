//! Module: window::segment_tree
//! Responsibility: general-case frame aggregation over a fan-out tree of
//! pre-combined states, with a direct-scan fallback when states cannot be
//! combined.
//! Does not own: frame bounds or partitioning.
//! Boundary: the tree is built once in `finalize` and is read-only after.

use crate::{
    config::WindowAggregateConfig,
    error::InternalError,
    function::{AggregateFunction, FrameBounds},
    mask::RowMask,
    obs::sink::{ComputeSpan, MetricsEvent, record},
    state::{AggregateState, StateArena, StateSlice},
    value::{ResultColumn, RowBatch},
    window::{AggregatorKind, inputs::WindowAggregateInputs},
};
use std::sync::Arc;

///
/// SegmentTree
///
/// Internal nodes stored level by level in one arena. Level 0 is the input
/// rows themselves and is never materialized; level `l >= 1` occupies
/// handles `level_starts[l - 1]..level_starts[l]`.
///

struct SegmentTree {
    nodes: StateArena,
    level_starts: Vec<usize>,
}

impl SegmentTree {
    /// Number of materialized levels above the rows.
    fn levels(&self) -> usize {
        self.level_starts.len() - 1
    }
}

///
/// FlushBuffer
///
/// Pending leaf rows and node handles, flushed into one contract call each
/// time `limit` entries accumulate.
///

struct FlushBuffer {
    rows: Vec<usize>,
    nodes: Vec<usize>,
    limit: usize,
}

impl FlushBuffer {
    fn new(limit: usize) -> Self {
        Self {
            rows: Vec::with_capacity(limit),
            nodes: Vec::with_capacity(limit),
            limit,
        }
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.nodes.clear();
    }
}

///
/// Accumulation
///
/// One in-progress fold of rows and node states into `target`. Shared by
/// tree construction (target = the node being built) and frame queries
/// (target = the scratch accumulator).
///

struct Accumulation<'a> {
    function: &'a dyn AggregateFunction,
    rows: &'a RowBatch,
    filter: &'a RowMask,
    nodes: StateSlice<'a>,
    level_starts: &'a [usize],
    buffer: &'a mut FlushBuffer,
    target: &'a mut [u8],
    calls: u64,
}

impl Accumulation<'_> {
    /// Contribute entries `[begin, end)` of `level` to the target.
    fn segment_value(
        &mut self,
        level: usize,
        begin: usize,
        end: usize,
    ) -> Result<(), InternalError> {
        if begin > end {
            return Err(InternalError::tree_invariant(format!(
                "inverted range [{begin}, {end}) at level {level}"
            )));
        }
        if begin == end {
            return Ok(());
        }

        if level == 0 {
            return self.extract_rows(begin, end);
        }

        let (Some(&level_start), Some(&level_stop)) = (
            self.level_starts.get(level - 1),
            self.level_starts.get(level),
        ) else {
            return Err(InternalError::tree_invariant(format!(
                "level {level} above the tree's {} levels",
                self.level_starts.len().saturating_sub(1)
            )));
        };
        if level_start + end > level_stop {
            return Err(InternalError::tree_invariant(format!(
                "nodes [{begin}, {end}) outside level {level} of {} nodes",
                level_stop - level_start
            )));
        }

        for node in level_start + begin..level_start + end {
            self.buffer.nodes.push(node);
            if self.buffer.nodes.len() >= self.buffer.limit {
                self.flush_nodes()?;
            }
        }

        Ok(())
    }

    fn extract_rows(&mut self, begin: usize, end: usize) -> Result<(), InternalError> {
        for row in begin..end {
            if !self.filter.row_is_valid(row) {
                continue;
            }
            self.buffer.rows.push(row);
            if self.buffer.rows.len() >= self.buffer.limit {
                self.flush_rows()?;
            }
        }

        Ok(())
    }

    fn flush_rows(&mut self) -> Result<(), InternalError> {
        if self.buffer.rows.is_empty() {
            return Ok(());
        }

        self.calls += 1;
        self.function
            .update(&self.rows.select(&self.buffer.rows), self.target)?;
        self.buffer.rows.clear();

        Ok(())
    }

    fn flush_nodes(&mut self) -> Result<(), InternalError> {
        if self.buffer.nodes.is_empty() {
            return Ok(());
        }

        let sources = self
            .buffer
            .nodes
            .iter()
            .map(|&node| self.nodes.get(node))
            .collect::<Result<Vec<_>, _>>()?;
        self.calls += 1;
        self.function.combine(&sources, self.target)?;
        self.buffer.nodes.clear();

        Ok(())
    }

    fn flush(&mut self) -> Result<(), InternalError> {
        self.flush_rows()?;
        self.flush_nodes()
    }
}

///
/// SegmentTreeAggregator
///
/// Answers any frame with O(log_F n) contract calls once the tree is built;
/// degrades to an O(frame width) scan when the function cannot combine
/// states or the configured mode forbids it.
///

pub struct SegmentTreeAggregator {
    inputs: WindowAggregateInputs,
    accumulator: AggregateState,
    buffer: FlushBuffer,
    tree: Option<SegmentTree>,
    fanout: usize,
    vector_size: usize,
    use_combine: bool,
    debug: bool,
}

impl SegmentTreeAggregator {
    #[must_use]
    pub(crate) fn new(
        function: Arc<dyn AggregateFunction>,
        partition_count: usize,
        config: &WindowAggregateConfig,
    ) -> Self {
        let use_combine =
            function.capabilities().combine && config.mode().allows_combine_api();

        Self {
            accumulator: AggregateState::new(Arc::clone(&function)),
            inputs: WindowAggregateInputs::new(function, partition_count),
            buffer: FlushBuffer::new(config.vector_size()),
            tree: None,
            fanout: config.tree_fanout(),
            vector_size: config.vector_size(),
            use_combine,
            debug: config.debug(),
        }
    }

    /// True when frames are answered from the tree rather than a scan.
    #[must_use]
    pub const fn uses_tree(&self) -> bool {
        self.use_combine
    }

    /// Number of internal node states currently held.
    #[must_use]
    pub fn internal_nodes(&self) -> usize {
        self.tree.as_ref().map_or(0, |tree| tree.nodes.len())
    }

    fn debug_log(&self, s: impl AsRef<str>) {
        if self.debug {
            println!("[debug] {}", s.as_ref());
        }
    }

    pub(crate) fn sink(
        &mut self,
        batch: &RowBatch,
        filter: Option<&[usize]>,
    ) -> Result<(), InternalError> {
        self.inputs.sink(batch, filter)?;
        record(MetricsEvent::RowsSunk {
            kind: AggregatorKind::SegmentTree,
            rows: batch.len() as u64,
            filtered: filter.map_or(0, |selection| (batch.len() - selection.len()) as u64),
        });

        Ok(())
    }

    pub(crate) fn finalize(&mut self) -> Result<(), InternalError> {
        self.inputs.finalize()?;
        if self.use_combine {
            self.construct_tree()?;
        }

        Ok(())
    }

    fn construct_tree(&mut self) -> Result<(), InternalError> {
        let count = self.inputs.len();
        let fanout = self.fanout;

        // Space for every internal level, down to a single root.
        let mut internal_nodes = 0;
        let mut level_nodes = count;
        loop {
            level_nodes = level_nodes.div_ceil(fanout);
            internal_nodes += level_nodes;
            if level_nodes <= 1 {
                break;
            }
        }

        let function = self.inputs.function();
        let mut nodes = StateArena::with_capacity(
            self.inputs.shared_function(),
            internal_nodes,
            self.vector_size,
        );
        let mut level_starts = vec![0];
        let mut level = 0;
        loop {
            let level_size = if level == 0 {
                count
            } else {
                nodes.len() - level_starts[level - 1]
            };
            if level_size <= 1 {
                break;
            }

            for pos in (0..level_size).step_by(fanout) {
                nodes.push_initialized();
                let (children, target) = nodes.split_last_mut()?;
                let mut accumulation = Accumulation {
                    function,
                    rows: self.inputs.rows(),
                    filter: self.inputs.filter_mask(),
                    nodes: children,
                    level_starts: &level_starts,
                    buffer: &mut self.buffer,
                    target,
                    calls: 0,
                };
                accumulation.segment_value(level, pos, level_size.min(pos + fanout))?;
                accumulation.flush()?;
            }

            level_starts.push(nodes.len());
            level += 1;
        }

        // A single row has no internal level, but still owns one node.
        if nodes.is_empty() && count > 0 {
            nodes.push_initialized();
        }
        if nodes.len() != internal_nodes {
            return Err(InternalError::tree_invariant(format!(
                "built {} internal nodes, expected {internal_nodes}",
                nodes.len()
            )));
        }

        self.debug_log(format!(
            "segment tree built: rows={count} fanout={fanout} levels={} nodes={}",
            level_starts.len() - 1,
            nodes.len()
        ));
        record(MetricsEvent::TreeBuilt {
            levels: (level_starts.len() - 1) as u64,
            nodes: nodes.len() as u64,
        });
        self.tree = Some(SegmentTree {
            nodes,
            level_starts,
        });

        Ok(())
    }

    pub(crate) fn compute(
        &mut self,
        output: &mut ResultColumn,
        row: usize,
        begin: usize,
        end: usize,
    ) -> Result<(), InternalError> {
        let frame = self.inputs.check_frame(begin, end)?;
        let mut span = ComputeSpan::new(AggregatorKind::SegmentTree, frame);

        self.accumulator.reset();
        self.buffer.clear();
        span.add_calls(1);

        let (nodes, level_starts, levels) = match (&self.tree, self.use_combine) {
            (Some(tree), true) => (
                tree.nodes.view(),
                tree.level_starts.as_slice(),
                Some(tree.levels()),
            ),
            (None, true) => {
                return Err(InternalError::tree_invariant(
                    "segment tree missing after finalize",
                ));
            }
            (_, false) => (StateSlice::default(), &[][..], None),
        };
        let mut accumulation = Accumulation {
            function: self.inputs.function(),
            rows: self.inputs.rows(),
            filter: self.inputs.filter_mask(),
            nodes,
            level_starts,
            buffer: &mut self.buffer,
            target: self.accumulator.bytes_mut()?,
            calls: 0,
        };
        // Without a tree, aggregate the whole frame at once.
        let folded = match levels {
            Some(levels) => walk_tree(&mut accumulation, levels, self.fanout, frame),
            None => accumulation
                .segment_value(0, frame.begin, frame.end)
                .and_then(|()| accumulation.flush()),
        };
        span.add_calls(accumulation.calls + 1);
        folded?;

        let value = self.accumulator.finalize()?;
        output.set(row, value)
    }
}

/// Walk up the tree, contributing the misaligned edges of `frame` at each
/// level until the remainder fits inside one parent block.
fn walk_tree(
    accumulation: &mut Accumulation<'_>,
    levels: usize,
    fanout: usize,
    frame: FrameBounds,
) -> Result<(), InternalError> {
    let FrameBounds { mut begin, mut end } = frame;

    for level in 0..=levels {
        let parent_begin = begin / fanout;
        let parent_end = end / fanout;
        if parent_begin == parent_end {
            accumulation.segment_value(level, begin, end)?;
            return accumulation.flush();
        }

        let group_begin = parent_begin * fanout;
        let mut next_begin = parent_begin;
        if begin != group_begin {
            accumulation.segment_value(level, begin, group_begin + fanout)?;
            next_begin += 1;
        }
        let group_end = parent_end * fanout;
        if end != group_end {
            accumulation.segment_value(level, group_end, end)?;
        }
        begin = next_begin;
        end = parent_end;

        // Leaf rows are flushed separately.
        if level == 0 {
            accumulation.flush_rows()?;
        }
    }

    Err(InternalError::tree_invariant(format!(
        "frame {frame} not resolved within {levels} tree levels"
    )))
}
