//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! Aggregators never touch metrics state directly; every counter update
//! flows through `MetricsEvent` and a `MetricsSink`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{AggregatorCounters, AggregatorSummary, EventOps, EventReport, EventState};
pub use sink::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink};
