use serde::{Deserialize, Serialize};
use std::{cell::RefCell, cmp::Ordering, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for aggregator activity on this thread.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub aggregators: BTreeMap<String, AggregatorCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Lifecycle
    pub aggregators_built: u64,
    pub rows_sunk: u64,
    pub rows_filtered: u64,
    pub sub_partitions_finalized: u64,

    // Segment trees
    pub trees_built: u64,
    pub tree_levels: u64,
    pub tree_nodes: u64,

    // Frames
    pub frames_computed: u64,
    pub frame_rows: u64,
    pub contract_calls: u64,
    pub contract_calls_max: u64,

    // Teardown
    pub states_destroyed: u64,
}

///
/// AggregatorCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AggregatorCounters {
    pub built: u64,
    pub rows_sunk: u64,
    pub frames_computed: u64,
    pub frame_rows: u64,
    pub contract_calls: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Accumulate a per-call count and track its max.
pub(crate) const fn add_calls(total: &mut u64, max: &mut u64, calls: u64) {
    *total = total.saturating_add(calls);
    if calls > *max {
        *max = calls;
    }
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: Option<EventState>,
    /// Per-aggregator-kind counters and averages.
    pub aggregator_summaries: Vec<AggregatorSummary>,
}

///
/// AggregatorSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AggregatorSummary {
    pub kind: String,
    pub built: u64,
    pub rows_sunk: u64,
    pub frames_computed: u64,
    pub avg_frame_rows: f64,
    pub avg_calls_per_frame: f64,
}

/// Build a metrics report from in-memory counters only.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub(crate) fn report() -> EventReport {
    let snap = with_state(Clone::clone);

    let mut aggregator_summaries: Vec<AggregatorSummary> = snap
        .aggregators
        .iter()
        .map(|(kind, counters)| {
            let per_frame = |value: u64| {
                if counters.frames_computed > 0 {
                    value as f64 / counters.frames_computed as f64
                } else {
                    0.0
                }
            };

            AggregatorSummary {
                kind: kind.clone(),
                built: counters.built,
                rows_sunk: counters.rows_sunk,
                frames_computed: counters.frames_computed,
                avg_frame_rows: per_frame(counters.frame_rows),
                avg_calls_per_frame: per_frame(counters.contract_calls),
            }
        })
        .collect();

    // Most expensive frames first.
    aggregator_summaries.sort_by(|a, b| {
        match b
            .avg_calls_per_frame
            .partial_cmp(&a.avg_calls_per_frame)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => a.kind.cmp(&b.kind),
            other => other,
        }
    });

    EventReport {
        counters: Some(snap),
        aggregator_summaries,
    }
}

///
/// TESTS
///

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn reset_all_clears_state() {
        with_state_mut(|m| {
            m.ops.frames_computed = 3;
            m.ops.tree_nodes = 2;
            m.aggregators.insert(
                "segment_tree".to_string(),
                AggregatorCounters {
                    built: 1,
                    ..Default::default()
                },
            );
        });

        reset_all();

        with_state(|m| {
            assert_eq!(m.ops.frames_computed, 0);
            assert_eq!(m.ops.tree_nodes, 0);
            assert!(m.aggregators.is_empty());
        });
    }

    #[test]
    fn report_sorts_aggregators_by_average_calls() {
        reset_all();
        with_state_mut(|m| {
            m.aggregators.insert(
                "constant".to_string(),
                AggregatorCounters {
                    frames_computed: 4,
                    contract_calls: 0,
                    ..Default::default()
                },
            );
            m.aggregators.insert(
                "segment_tree".to_string(),
                AggregatorCounters {
                    frames_computed: 2,
                    contract_calls: 10,
                    frame_rows: 40,
                    ..Default::default()
                },
            );
            m.aggregators.insert(
                "custom".to_string(),
                AggregatorCounters {
                    frames_computed: 2,
                    contract_calls: 2,
                    ..Default::default()
                },
            );
        });

        let report = report();
        let kinds: Vec<_> = report
            .aggregator_summaries
            .iter()
            .map(|summary| summary.kind.as_str())
            .collect();

        assert_eq!(kinds, ["segment_tree", "custom", "constant"]);
        assert_eq!(report.aggregator_summaries[0].avg_calls_per_frame, 5.0);
        assert_eq!(report.aggregator_summaries[0].avg_frame_rows, 20.0);
        assert_eq!(report.aggregator_summaries[2].avg_calls_per_frame, 0.0);
    }

    #[test]
    fn add_calls_tracks_total_and_max() {
        let (mut total, mut max) = (0, 0);
        add_calls(&mut total, &mut max, 7);
        add_calls(&mut total, &mut max, 3);

        assert_eq!(total, 10);
        assert_eq!(max, 7);
    }
}
