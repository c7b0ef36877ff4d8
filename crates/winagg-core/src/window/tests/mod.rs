
use crate::{
    config::WindowAggregateConfig,
    error::InternalError,
    function::AggregateFunction,
    value::{ResultColumn, RowBatch, Value},
    window::{WindowAggregateSpec, WindowAggregator},
};
use std::sync::Arc;

/// Build an aggregator and sink `values` as single-column batches of
/// `chunk` rows, without finalizing.
fn sink_values(
    function: Arc<dyn AggregateFunction>,
    spec: &WindowAggregateSpec,
    config: &WindowAggregateConfig,
    values: &[Value],
    chunk: usize,
) -> WindowAggregator {
    let mut aggregator = WindowAggregator::new(function, spec, config);
    for rows in values.chunks(chunk.max(1)) {
        aggregator
            .sink(&RowBatch::from_values(rows.to_vec()), None)
            .expect("sink should accept an unfiltered batch");
    }

    aggregator
}

/// Build, sink and finalize an aggregator over `values`.
fn finalized(
    function: Arc<dyn AggregateFunction>,
    spec: &WindowAggregateSpec,
    config: &WindowAggregateConfig,
    values: &[Value],
    chunk: usize,
) -> WindowAggregator {
    let mut aggregator = sink_values(function, spec, config, values, chunk);
    aggregator.finalize().expect("finalize should succeed");

    aggregator
}

fn sequence_values(rows: usize) -> Vec<Value> {
    (1..=rows).map(|value| Value::Int(value as i64)).collect()
}

fn try_frame(
    aggregator: &mut WindowAggregator,
    begin: usize,
    end: usize,
) -> Result<Value, InternalError> {
    let mut output = ResultColumn::with_len(1);
    aggregator.compute(&mut output, 0, begin, end)?;

    Ok(output[0].clone())
}

fn frame(aggregator: &mut WindowAggregator, begin: usize, end: usize) -> Value {
    try_frame(aggregator, begin, end).expect("frame should compute")
}

#[test]
fn aggregators_are_send() {
    fn assert_send<T: Send>() {}

    assert_send::<WindowAggregator>();
}
