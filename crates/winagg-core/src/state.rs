//! Module: state
//! Responsibility: ownership of opaque aggregate-state buffers.
//! Does not own: what the bytes mean; only the aggregate function knows.
//! Boundary: every buffer handed out here was initialized through the
//! function and is destroyed through it exactly once.


use crate::{
    error::InternalError,
    function::AggregateFunction,
    obs::sink::{MetricsEvent, record},
    value::Value,
};
use std::sync::Arc;

///
/// AggregateState
///
/// One state buffer with an explicit initialized flag. `reset` and drop
/// destroy the previous contents first, so a buffer is never destroyed twice
/// and never leaked.
///

pub(crate) struct AggregateState {
    function: Arc<dyn AggregateFunction>,
    bytes: Vec<u8>,
    initialized: bool,
}

impl AggregateState {
    /// Allocate a buffer without initializing it.
    #[must_use]
    pub(crate) fn new(function: Arc<dyn AggregateFunction>) -> Self {
        let bytes = vec![0; function.state_size()];

        Self {
            function,
            bytes,
            initialized: false,
        }
    }

    /// Allocate and initialize a buffer.
    #[must_use]
    pub(crate) fn initialized(function: Arc<dyn AggregateFunction>) -> Self {
        let mut state = Self::new(function);
        state.reset();

        state
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Release the current contents (if any) and initialize a fresh state.
    pub(crate) fn reset(&mut self) {
        self.release();
        self.function.initialize(&mut self.bytes);
        self.initialized = true;
    }

    pub(crate) fn bytes(&self) -> Result<&[u8], InternalError> {
        if !self.initialized {
            return Err(InternalError::state_invariant(
                "aggregate state read before initialize",
            ));
        }

        Ok(&self.bytes)
    }

    pub(crate) fn bytes_mut(&mut self) -> Result<&mut [u8], InternalError> {
        if !self.initialized {
            return Err(InternalError::state_invariant(
                "aggregate state mutated before initialize",
            ));
        }

        Ok(&mut self.bytes)
    }

    /// Finalize the state into a value, then destroy it.
    ///
    /// The state is released even when finalize fails; call `reset` before
    /// reusing it.
    pub(crate) fn finalize(&mut self) -> Result<Value, InternalError> {
        let value = self.function.finalize(self.bytes()?);
        self.release();

        Ok(value?)
    }

    fn release(&mut self) {
        if !self.initialized {
            return;
        }
        self.initialized = false;

        if self.function.capabilities().destructor {
            self.function.destroy(&mut [self.bytes.as_mut_slice()]);
            record(MetricsEvent::StatesDestroyed { count: 1 });
        }
    }
}

impl Drop for AggregateState {
    fn drop(&mut self) {
        self.release();
    }
}

///
/// StateSlice
///
/// Read-only view over a prefix of a [`StateArena`], addressed by handle.
///

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StateSlice<'a> {
    bytes: &'a [u8],
    stride: usize,
    len: usize,
}

impl<'a> StateSlice<'a> {
    #[must_use]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn get(&self, handle: usize) -> Result<&'a [u8], InternalError> {
        if handle >= self.len {
            return Err(InternalError::state_invariant(format!(
                "state handle {handle} outside {} readable states",
                self.len
            )));
        }
        let start = handle * self.stride;

        self.bytes
            .get(start..start + self.stride)
            .ok_or_else(|| InternalError::state_invariant("state arena shorter than its length"))
    }
}

///
/// StateArena
///
/// Fixed-stride arena of initialized state buffers addressed by integer
/// handles. Handles are dense and stable; states are never removed before
/// the arena drops, at which point every state is destroyed once, in
/// batches of at most `destroy_batch`.
///

pub(crate) struct StateArena {
    function: Arc<dyn AggregateFunction>,
    stride: usize,
    bytes: Vec<u8>,
    len: usize,
    destroy_batch: usize,
}

impl StateArena {
    #[must_use]
    pub(crate) fn with_capacity(
        function: Arc<dyn AggregateFunction>,
        capacity: usize,
        destroy_batch: usize,
    ) -> Self {
        let stride = function.state_size();

        Self {
            function,
            stride,
            bytes: Vec::with_capacity(capacity.saturating_mul(stride)),
            len: 0,
            destroy_batch: destroy_batch.max(1),
        }
    }

    #[must_use]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one initialized state and return its handle.
    pub(crate) fn push_initialized(&mut self) -> usize {
        let start = self.bytes.len();
        self.bytes.resize(start + self.stride, 0);
        self.function.initialize(&mut self.bytes[start..]);
        self.len += 1;

        self.len - 1
    }

    #[must_use]
    pub(crate) fn view(&self) -> StateSlice<'_> {
        StateSlice {
            bytes: &self.bytes,
            stride: self.stride,
            len: self.len,
        }
    }

    /// Split off the most recently pushed state for mutation, leaving every
    /// earlier state readable.
    pub(crate) fn split_last_mut(&mut self) -> Result<(StateSlice<'_>, &mut [u8]), InternalError> {
        let Some(last) = self.len.checked_sub(1) else {
            return Err(InternalError::state_invariant(
                "split_last_mut on an empty state arena",
            ));
        };
        let (head, tail) = self.bytes.split_at_mut(last * self.stride);

        Ok((
            StateSlice {
                bytes: head,
                stride: self.stride,
                len: last,
            },
            tail,
        ))
    }
}

impl Drop for StateArena {
    fn drop(&mut self) {
        if self.len == 0 || !self.function.capabilities().destructor {
            return;
        }

        let mut states: Vec<&mut [u8]> = if self.stride == 0 {
            (0..self.len).map(|_| <&mut [u8]>::default()).collect()
        } else {
            self.bytes.chunks_exact_mut(self.stride).collect()
        };
        for batch in states.chunks_mut(self.destroy_batch) {
            self.function.destroy(batch);
        }

        record(MetricsEvent::StatesDestroyed {
            count: self.len as u64,
        });
    }
}
