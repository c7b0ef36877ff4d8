//! Module: value
//! Responsibility: column-oriented row batches, row views handed to aggregate
//! functions, and the caller-owned result column.
//! Does not own: aggregate semantics or frame arithmetic.
//! Boundary: the data vocabulary shared by the window operator, the engine,
//! and aggregate-function implementations.


use crate::error::InternalError;
use derive_more::{Deref, DerefMut};
use std::ops::Range;

///
/// Value
///
/// One nullable scalar cell. Aggregate functions interpret values; the
/// engine only moves them around.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }
}

///
/// RowBatch
///
/// Column-oriented batch of input rows. The row count is tracked explicitly
/// so zero-column inputs (COUNT(*)) still carry cardinality.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowBatch {
    columns: Vec<Vec<Value>>,
    len: usize,
}

impl RowBatch {
    /// Build a batch from equal-length columns.
    pub fn from_columns(columns: Vec<Vec<Value>>) -> Result<Self, InternalError> {
        let len = columns.first().map_or(0, Vec::len);
        if let Some((index, column)) = columns
            .iter()
            .enumerate()
            .find(|(_, column)| column.len() != len)
        {
            return Err(InternalError::sink_invariant(format!(
                "row batch column {index} has {} rows, expected {len}",
                column.len()
            )));
        }

        Ok(Self { columns, len })
    }

    /// Build a single-column batch.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        let len = values.len();

        Self {
            columns: vec![values],
            len,
        }
    }

    /// Build a batch with no columns and `len` rows.
    #[must_use]
    pub const fn empty_rows(len: usize) -> Self {
        Self {
            columns: Vec::new(),
            len,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn column(&self, column: usize) -> Option<&[Value]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    #[must_use]
    pub fn value(&self, column: usize, row: usize) -> Option<&Value> {
        self.columns.get(column).and_then(|values| values.get(row))
    }

    /// Append every row of `other`, adopting its column layout when this
    /// batch has never held rows.
    pub fn append(&mut self, other: &Self) -> Result<(), InternalError> {
        if self.len == 0 && self.columns.is_empty() {
            self.columns = vec![Vec::new(); other.columns.len()];
        }
        if self.columns.len() != other.columns.len() {
            return Err(InternalError::sink_invariant(format!(
                "row batch has {} columns, retained inputs have {}",
                other.columns.len(),
                self.columns.len()
            )));
        }

        for (target, source) in self.columns.iter_mut().zip(&other.columns) {
            target.extend_from_slice(source);
        }
        self.len += other.len;

        Ok(())
    }

    /// View a contiguous row range.
    #[must_use]
    pub const fn rows(&self, range: Range<usize>) -> InputRows<'_> {
        InputRows {
            batch: self,
            selection: Selection::Range(range),
        }
    }

    /// View an explicit row selection; indices must be within the batch.
    #[must_use]
    pub const fn select<'a>(&'a self, indices: &'a [usize]) -> InputRows<'a> {
        InputRows {
            batch: self,
            selection: Selection::Indices(indices),
        }
    }
}

#[derive(Clone, Debug)]
enum Selection<'a> {
    Range(Range<usize>),
    Indices(&'a [usize]),
}

///
/// InputRows
///
/// The rows handed to one `update` call: a retained batch plus either a
/// contiguous range or an explicit index selection over it.
///

#[derive(Clone, Debug)]
pub struct InputRows<'a> {
    batch: &'a RowBatch,
    selection: Selection<'a>,
}

impl<'a> InputRows<'a> {
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.selection {
            Selection::Range(range) => range.len(),
            Selection::Indices(indices) => indices.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.batch.column_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef<'a>> + '_ {
        let batch = self.batch;
        let (range, indices) = match &self.selection {
            Selection::Range(range) => (Some(range.clone()), None),
            Selection::Indices(indices) => (None, Some(indices.iter().copied())),
        };

        range
            .into_iter()
            .flatten()
            .chain(indices.into_iter().flatten())
            .map(move |index| RowRef { batch, index })
    }
}

///
/// RowRef
///

#[derive(Clone, Copy, Debug)]
pub struct RowRef<'a> {
    batch: &'a RowBatch,
    index: usize,
}

impl<'a> RowRef<'a> {
    /// Position of this row within the retained batch.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Cell value, `Value::Null` when the column does not exist.
    #[must_use]
    pub fn value(&self, column: usize) -> &'a Value {
        const NULL: &Value = &Value::Null;

        self.batch.value(column, self.index).unwrap_or(NULL)
    }
}

///
/// ResultColumn
///
/// Caller-owned output slots. Every `compute` writes exactly one slot.
///

#[derive(Clone, Debug, Default, Deref, DerefMut, PartialEq)]
pub struct ResultColumn(Vec<Value>);

impl ResultColumn {
    /// Build a column of `len` null slots.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self(vec![Value::Null; len])
    }

    /// Write one slot.
    pub fn set(&mut self, row: usize, value: Value) -> Result<(), InternalError> {
        let len = self.0.len();
        let Some(slot) = self.0.get_mut(row) else {
            return Err(InternalError::compute_invariant(format!(
                "result row {row} outside result column of {len} rows"
            )));
        };
        *slot = value;

        Ok(())
    }

    /// Copy one slot of `source` into this column.
    pub fn copy_from(
        &mut self,
        source: &Self,
        source_row: usize,
        target_row: usize,
    ) -> Result<(), InternalError> {
        let Some(value) = source.0.get(source_row) else {
            return Err(InternalError::compute_invariant(format!(
                "cached result {source_row} outside {} cached rows",
                source.0.len()
            )));
        };

        self.set(target_row, value.clone())
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}
