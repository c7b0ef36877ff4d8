//! Metrics sink boundary.
//!
//! Aggregator logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
use crate::{function::FrameBounds, obs::metrics, window::AggregatorKind};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    AggregatorBuilt {
        kind: AggregatorKind,
        partition_rows: u64,
    },
    RowsSunk {
        kind: AggregatorKind,
        rows: u64,
        filtered: u64,
    },
    SubPartitionFinalized,
    TreeBuilt {
        levels: u64,
        nodes: u64,
    },
    FrameComputed {
        kind: AggregatorKind,
        frame_rows: u64,
        contract_calls: u64,
    },
    StatesDestroyed {
        count: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default sink that folds events into the thread-local metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::AggregatorBuilt { kind, .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.aggregators_built = m.ops.aggregators_built.saturating_add(1);
                    let entry = m.aggregators.entry(kind.label().to_string()).or_default();
                    entry.built = entry.built.saturating_add(1);
                });
            }

            MetricsEvent::RowsSunk {
                kind,
                rows,
                filtered,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.rows_sunk = m.ops.rows_sunk.saturating_add(rows);
                    m.ops.rows_filtered = m.ops.rows_filtered.saturating_add(filtered);
                    let entry = m.aggregators.entry(kind.label().to_string()).or_default();
                    entry.rows_sunk = entry.rows_sunk.saturating_add(rows);
                });
            }

            MetricsEvent::SubPartitionFinalized => {
                metrics::with_state_mut(|m| {
                    m.ops.sub_partitions_finalized =
                        m.ops.sub_partitions_finalized.saturating_add(1);
                });
            }

            MetricsEvent::TreeBuilt { levels, nodes } => {
                metrics::with_state_mut(|m| {
                    m.ops.trees_built = m.ops.trees_built.saturating_add(1);
                    m.ops.tree_levels = m.ops.tree_levels.saturating_add(levels);
                    m.ops.tree_nodes = m.ops.tree_nodes.saturating_add(nodes);
                });
            }

            MetricsEvent::FrameComputed {
                kind,
                frame_rows,
                contract_calls,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.frames_computed = m.ops.frames_computed.saturating_add(1);
                    m.ops.frame_rows = m.ops.frame_rows.saturating_add(frame_rows);
                    metrics::add_calls(
                        &mut m.ops.contract_calls,
                        &mut m.ops.contract_calls_max,
                        contract_calls,
                    );

                    let entry = m.aggregators.entry(kind.label().to_string()).or_default();
                    entry.frames_computed = entry.frames_computed.saturating_add(1);
                    entry.frame_rows = entry.frame_rows.saturating_add(frame_rows);
                    entry.contract_calls = entry.contract_calls.saturating_add(contract_calls);
                });
            }

            MetricsEvent::StatesDestroyed { count } => {
                metrics::with_state_mut(|m| {
                    m.ops.states_destroyed = m.ops.states_destroyed.saturating_add(count);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match override_sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current thread's metrics state.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state on the current thread.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
///
/// The previous sink is restored on every exit, including unwind.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let previous = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = previous;
            });
        }
    }

    let previous = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(previous);

    f()
}

/// ComputeSpan
/// RAII guard that records one `FrameComputed` event per `compute` call.
/// Contract calls are counted even when the call fails part way.

pub(crate) struct ComputeSpan {
    kind: AggregatorKind,
    frame_rows: u64,
    calls: u64,
}

impl ComputeSpan {
    #[must_use]
    pub(crate) const fn new(kind: AggregatorKind, frame: FrameBounds) -> Self {
        Self {
            kind,
            frame_rows: frame.len() as u64,
            calls: 0,
        }
    }

    pub(crate) const fn add_calls(&mut self, calls: u64) {
        self.calls = self.calls.saturating_add(calls);
    }
}

impl Drop for ComputeSpan {
    fn drop(&mut self) {
        record(MetricsEvent::FrameComputed {
            kind: self.kind,
            frame_rows: self.frame_rows,
            contract_calls: self.calls,
        });
    }
}
