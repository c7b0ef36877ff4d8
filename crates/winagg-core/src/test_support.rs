//! Test-only aggregate functions and row fixtures.

use crate::{
    function::{AggregateCapabilities, AggregateError, AggregateFunction, FrameBounds},
    mask::RowMask,
    value::{InputRows, RowBatch, Value},
};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Marker byte written by `CallCounter::initialize` and cleared by `destroy`.
const LIVE_MARK: u8 = 0xA5;

fn read_i64(state: &[u8], offset: usize) -> i64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&state[offset..offset + 8]);

    i64::from_le_bytes(bytes)
}

fn write_i64(state: &mut [u8], offset: usize, value: i64) {
    state[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Single-column batch whose row `i` holds `i + 1`.
pub fn sequence_batch(rows: usize) -> RowBatch {
    RowBatch::from_values((1..=rows).map(|value| Value::Int(value as i64)).collect())
}

/// Expected SUM over a `sequence_batch` range, `Null` when empty.
pub fn sequence_sum(begin: usize, end: usize) -> Value {
    if begin >= end {
        return Value::Null;
    }

    Value::Int((begin + 1..=end).map(|value| value as i64).sum())
}

///
/// SumI64
///
/// SUM over column 0. State is `[sum: i64][non-null rows: i64]`; an empty
/// state finalizes to `Null`. Overflow is reported, never wrapped.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct SumI64 {
    window: bool,
}

impl SumI64 {
    /// SUM that also implements the frame-aware `window` operation.
    pub const fn sliding() -> Self {
        Self { window: true }
    }

    fn add(&self, state: &mut [u8], value: i64) -> Result<(), AggregateError> {
        let sum = read_i64(state, 0)
            .checked_add(value)
            .ok_or_else(|| self.overflow())?;
        write_i64(state, 0, sum);
        write_i64(state, 8, read_i64(state, 8) + 1);

        Ok(())
    }

    fn overflow(&self) -> AggregateError {
        AggregateError::Overflow {
            function: self.name().to_string(),
        }
    }

    fn fold_frame(
        &self,
        inputs: &RowBatch,
        filter: &RowMask,
        state: &mut [u8],
        rows: std::ops::Range<usize>,
        sign: i64,
    ) -> Result<(), AggregateError> {
        for row in rows {
            if !filter.row_is_valid(row) {
                continue;
            }
            let Some(value) = inputs.value(0, row).and_then(Value::as_int) else {
                continue;
            };
            let sum = read_i64(state, 0)
                .checked_add(sign * value)
                .ok_or_else(|| self.overflow())?;
            write_i64(state, 0, sum);
            write_i64(state, 8, read_i64(state, 8) + sign);
        }

        Ok(())
    }
}

impl AggregateFunction for SumI64 {
    fn name(&self) -> &str {
        if self.window { "sliding_sum" } else { "sum" }
    }

    fn state_size(&self) -> usize {
        16
    }

    fn capabilities(&self) -> AggregateCapabilities {
        let capabilities = AggregateCapabilities::new().with_combine();
        if self.window {
            capabilities.with_window()
        } else {
            capabilities
        }
    }

    fn initialize(&self, state: &mut [u8]) {
        state.fill(0);
    }

    fn update(&self, inputs: &InputRows<'_>, state: &mut [u8]) -> Result<(), AggregateError> {
        for row in inputs.iter() {
            if let Some(value) = row.value(0).as_int() {
                self.add(state, value)?;
            }
        }

        Ok(())
    }

    fn combine(&self, sources: &[&[u8]], target: &mut [u8]) -> Result<(), AggregateError> {
        for source in sources {
            let sum = read_i64(target, 0)
                .checked_add(read_i64(source, 0))
                .ok_or_else(|| self.overflow())?;
            write_i64(target, 0, sum);
            write_i64(target, 8, read_i64(target, 8) + read_i64(source, 8));
        }

        Ok(())
    }

    fn window(
        &self,
        inputs: &RowBatch,
        filter: &RowMask,
        state: &mut [u8],
        frame: FrameBounds,
        previous: FrameBounds,
    ) -> Result<Value, AggregateError> {
        let overlaps = frame.begin < previous.end && previous.begin < frame.end;
        if overlaps {
            // Slide both edges from the previous frame.
            self.fold_frame(inputs, filter, state, previous.begin..frame.begin, -1)?;
            self.fold_frame(inputs, filter, state, frame.begin..previous.begin, 1)?;
            self.fold_frame(inputs, filter, state, frame.end..previous.end, -1)?;
            self.fold_frame(inputs, filter, state, previous.end..frame.end, 1)?;
        } else {
            self.initialize(state);
            self.fold_frame(inputs, filter, state, frame.begin..frame.end, 1)?;
        }

        self.finalize(state)
    }

    fn finalize(&self, state: &[u8]) -> Result<Value, AggregateError> {
        if read_i64(state, 8) == 0 {
            return Ok(Value::Null);
        }

        Ok(Value::Int(read_i64(state, 0)))
    }
}

///
/// CountRows
///
/// COUNT(*): counts rows regardless of columns or nulls.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct CountRows;

impl AggregateFunction for CountRows {
    fn name(&self) -> &str {
        "count_star"
    }

    fn state_size(&self) -> usize {
        8
    }

    fn capabilities(&self) -> AggregateCapabilities {
        AggregateCapabilities::new().with_combine()
    }

    fn initialize(&self, state: &mut [u8]) {
        state.fill(0);
    }

    fn update(&self, inputs: &InputRows<'_>, state: &mut [u8]) -> Result<(), AggregateError> {
        write_i64(state, 0, read_i64(state, 0) + inputs.len() as i64);

        Ok(())
    }

    fn combine(&self, sources: &[&[u8]], target: &mut [u8]) -> Result<(), AggregateError> {
        for source in sources {
            write_i64(target, 0, read_i64(target, 0) + read_i64(source, 0));
        }

        Ok(())
    }

    fn finalize(&self, state: &[u8]) -> Result<Value, AggregateError> {
        Ok(Value::Int(read_i64(state, 0)))
    }
}

///
/// NoCombineSum
///
/// SUM without `combine`; forces the direct-scan path.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoCombineSum;

impl AggregateFunction for NoCombineSum {
    fn name(&self) -> &str {
        "sum_no_combine"
    }

    fn state_size(&self) -> usize {
        SumI64::default().state_size()
    }

    fn capabilities(&self) -> AggregateCapabilities {
        AggregateCapabilities::new()
    }

    fn initialize(&self, state: &mut [u8]) {
        SumI64::default().initialize(state);
    }

    fn update(&self, inputs: &InputRows<'_>, state: &mut [u8]) -> Result<(), AggregateError> {
        SumI64::default().update(inputs, state)
    }

    fn finalize(&self, state: &[u8]) -> Result<Value, AggregateError> {
        SumI64::default().finalize(state)
    }
}

///
/// CallSnapshot
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CallSnapshot {
    pub initialize: u64,
    pub update: u64,
    pub update_rows: u64,
    pub combine: u64,
    pub combine_sources: u64,
    pub window: u64,
    pub finalize: u64,
    pub destroy: u64,
    /// Destroys of a state that was not live.
    pub bad_destroy: u64,
    /// Updates, combines or finalizes on a state that was not live.
    pub bad_use: u64,
}

impl CallSnapshot {
    /// Contract calls a frame query may be charged for.
    pub const fn fold_calls(&self) -> u64 {
        self.initialize + self.update + self.combine + self.window + self.finalize
    }

    /// States initialized but not yet destroyed.
    pub const fn live(&self) -> i64 {
        self.initialize as i64 - self.destroy as i64
    }
}

///
/// CallCounter
///
/// Wraps another aggregate, counts every contract call, and tracks state
/// liveness through a trailing marker byte. Always advertises a destructor
/// so exact destroy counts can be checked.
///

pub struct CallCounter {
    inner: Box<dyn AggregateFunction>,
    initialize: AtomicU64,
    update: AtomicU64,
    update_rows: AtomicU64,
    combine: AtomicU64,
    combine_sources: AtomicU64,
    window: AtomicU64,
    finalize: AtomicU64,
    destroy: AtomicU64,
    bad_destroy: AtomicU64,
    bad_use: AtomicU64,
}

impl CallCounter {
    pub fn wrap(inner: impl AggregateFunction + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: Box::new(inner),
            initialize: AtomicU64::new(0),
            update: AtomicU64::new(0),
            update_rows: AtomicU64::new(0),
            combine: AtomicU64::new(0),
            combine_sources: AtomicU64::new(0),
            window: AtomicU64::new(0),
            finalize: AtomicU64::new(0),
            destroy: AtomicU64::new(0),
            bad_destroy: AtomicU64::new(0),
            bad_use: AtomicU64::new(0),
        })
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            initialize: self.initialize.load(Ordering::Relaxed),
            update: self.update.load(Ordering::Relaxed),
            update_rows: self.update_rows.load(Ordering::Relaxed),
            combine: self.combine.load(Ordering::Relaxed),
            combine_sources: self.combine_sources.load(Ordering::Relaxed),
            window: self.window.load(Ordering::Relaxed),
            finalize: self.finalize.load(Ordering::Relaxed),
            destroy: self.destroy.load(Ordering::Relaxed),
            bad_destroy: self.bad_destroy.load(Ordering::Relaxed),
            bad_use: self.bad_use.load(Ordering::Relaxed),
        }
    }

    fn inner_len(&self) -> usize {
        self.inner.state_size()
    }

    fn check_live(&self, state: &[u8]) {
        if state[self.inner_len()] != LIVE_MARK {
            self.bad_use.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl AggregateFunction for CallCounter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn state_size(&self) -> usize {
        self.inner_len() + 1
    }

    fn capabilities(&self) -> AggregateCapabilities {
        self.inner.capabilities().with_destructor()
    }

    fn initialize(&self, state: &mut [u8]) {
        self.initialize.fetch_add(1, Ordering::Relaxed);
        let len = self.inner_len();
        self.inner.initialize(&mut state[..len]);
        state[len] = LIVE_MARK;
    }

    fn update(&self, inputs: &InputRows<'_>, state: &mut [u8]) -> Result<(), AggregateError> {
        self.update.fetch_add(1, Ordering::Relaxed);
        self.update_rows
            .fetch_add(inputs.len() as u64, Ordering::Relaxed);
        self.check_live(state);
        let len = self.inner_len();

        self.inner.update(inputs, &mut state[..len])
    }

    fn combine(&self, sources: &[&[u8]], target: &mut [u8]) -> Result<(), AggregateError> {
        self.combine.fetch_add(1, Ordering::Relaxed);
        self.combine_sources
            .fetch_add(sources.len() as u64, Ordering::Relaxed);
        self.check_live(target);
        for source in sources {
            self.check_live(source);
        }
        let len = self.inner_len();
        let sources: Vec<&[u8]> = sources.iter().map(|source| &source[..len]).collect();

        self.inner.combine(&sources, &mut target[..len])
    }

    fn window(
        &self,
        inputs: &RowBatch,
        filter: &RowMask,
        state: &mut [u8],
        frame: FrameBounds,
        previous: FrameBounds,
    ) -> Result<Value, AggregateError> {
        self.window.fetch_add(1, Ordering::Relaxed);
        self.check_live(state);
        let len = self.inner_len();

        self.inner
            .window(inputs, filter, &mut state[..len], frame, previous)
    }

    fn finalize(&self, state: &[u8]) -> Result<Value, AggregateError> {
        self.finalize.fetch_add(1, Ordering::Relaxed);
        self.check_live(state);

        self.inner.finalize(&state[..self.inner_len()])
    }

    fn destroy(&self, states: &mut [&mut [u8]]) {
        let len = self.inner_len();
        for state in states.iter_mut() {
            self.destroy.fetch_add(1, Ordering::Relaxed);
            if state[len] == LIVE_MARK {
                state[len] = 0;
            } else {
                self.bad_destroy.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
