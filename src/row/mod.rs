//! Row model: typed values, row layouts and immutable rows.
//!
//! A [`Row`] is a positional tuple of [`Value`]s whose meaning comes from the
//! [`RowType`] of the hop it travels on. Rows are reference counted so that
//! fanning a row out to several consumers never copies its values; stages that
//! need a different shape build a new row instead of mutating one in place.

mod row_type;
mod value;

pub use row_type::{FieldDefinition, RowType};
pub use value::{Value, ValueType, DEFAULT_DATE_FORMAT};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building layouts or converting values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("duplicate field name '{0}'")]
    DuplicateField(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("cannot convert '{text}' to {value_type}")]
    Conversion { text: String, value_type: ValueType },

    #[error("row has {actual} values but its layout declares {expected}")]
    Arity { expected: usize, actual: usize },

    #[error("field '{field}' expects {expected} but holds {actual}")]
    TypeMismatch {
        field: String,
        expected: ValueType,
        actual: ValueType,
    },
}

static NULL: Value = Value::Null;

/// An immutable row of values.
#[derive(Clone, PartialEq)]
pub struct Row {
    values: Arc<[Value]>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// A row of `len` nulls.
    pub fn nulls(len: usize) -> Self {
        Self::new(vec![Value::Null; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value at `index`, or null when out of range.
    pub fn value(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&NULL)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// A new row holding this row's values followed by `extra`.
    pub fn extend(&self, extra: impl IntoIterator<Item = Value>) -> Row {
        let mut values = self.values.to_vec();
        values.extend(extra);
        Row::new(values)
    }

    /// A new row holding this row's values followed by `other`'s.
    pub fn concat(&self, other: &Row) -> Row {
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend_from_slice(&self.values);
        values.extend_from_slice(&other.values);
        Row::new(values)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values.to_vec()
    }
}

impl Default for Row {
    fn default() -> Self {
        Row::new(Vec::new())
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.iter()).finish()
    }
}

/// Composite key projected out of a row, usable in hash maps.
///
/// Equality is exact per value (see [`Value::key_eq`]): an integer key never
/// equals a number key even when numerically equal.
#[derive(Debug, Clone, Default)]
pub struct RowKey(Vec<Value>);

impl RowKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Project the values at `indices` out of `row`.
    pub fn from_row(row: &Row, indices: &[usize]) -> Self {
        Self(indices.iter().map(|&i| row.value(i).clone()).collect())
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    /// Lexicographic total order using [`Value::sort_cmp`].
    pub fn sort_cmp(&self, other: &RowKey) -> Ordering {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| a.sort_cmp(b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| self.0.len().cmp(&other.0.len()))
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a.key_eq(b))
    }
}

impl Eq for RowKey {}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for value in &self.0 {
            value.hash_key(state);
        }
    }
}
