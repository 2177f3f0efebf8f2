//! Row layouts: ordered, named, typed field definitions.

use crate::row::value::{Value, ValueType};
use crate::row::{Row, RowError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Definition of one field in a row layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            length: None,
            precision: None,
            format: None,
        }
    }

    pub fn with_length(mut self, length: i32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_precision(mut self, precision: i32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Parse text into this field's type using its format mask.
    pub fn parse(&self, text: &str) -> Result<Value, RowError> {
        self.value_type.parse(text, self.format.as_deref())
    }
}

/// Ordered field layout shared by every row flowing over a hop.
///
/// Cloning is cheap; the field list is reference counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldDefinition>", into = "Vec<FieldDefinition>")]
pub struct RowType {
    fields: Arc<Vec<FieldDefinition>>,
}

impl RowType {
    /// Create a layout. Field names must be unique.
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self, RowError> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(RowError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self {
            fields: Arc::new(fields),
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldDefinition> {
        self.fields.get(index)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Index of a field, or [`RowError::UnknownField`].
    pub fn require(&self, name: &str) -> Result<usize, RowError> {
        self.index_of(name)
            .ok_or_else(|| RowError::UnknownField(name.to_string()))
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDefinition> {
        self.index_of(name).and_then(|i| self.fields.get(i))
    }

    /// A new layout with `field` appended.
    pub fn append(&self, field: FieldDefinition) -> Result<RowType, RowError> {
        self.append_all(std::iter::once(field))
    }

    pub fn append_all(
        &self,
        extra: impl IntoIterator<Item = FieldDefinition>,
    ) -> Result<RowType, RowError> {
        let mut fields = self.fields.as_ref().clone();
        fields.extend(extra);
        RowType::new(fields)
    }

    /// Concatenate two layouts. Names from `other` that collide with an
    /// existing name get a `_1`, `_2`, ... suffix.
    pub fn join(&self, other: &RowType) -> RowType {
        let mut fields = self.fields.as_ref().clone();
        let mut taken: HashSet<String> = fields.iter().map(|f| f.name.clone()).collect();

        for field in other.fields() {
            let mut name = field.name.clone();
            let mut suffix = 1;
            while taken.contains(&name) {
                name = format!("{}_{}", field.name, suffix);
                suffix += 1;
            }
            taken.insert(name.clone());
            fields.push(field.renamed(name));
        }

        Self {
            fields: Arc::new(fields),
        }
    }

    /// Check that a row matches this layout: same arity, and every non-null
    /// value has the declared type.
    pub fn check(&self, row: &Row) -> Result<(), RowError> {
        if row.len() != self.len() {
            return Err(RowError::Arity {
                expected: self.len(),
                actual: row.len(),
            });
        }
        for (field, value) in self.fields.iter().zip(row.values()) {
            if let Some(actual) = value.value_type() {
                if actual != field.value_type {
                    return Err(RowError::TypeMismatch {
                        field: field.name.clone(),
                        expected: field.value_type,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether two layouts carry the same names and types, ignoring
    /// length, precision and format metadata.
    pub fn is_compatible_with(&self, other: &RowType) -> bool {
        self.len() == other.len()
            && self
                .fields
                .iter()
                .zip(other.fields())
                .all(|(a, b)| a.name == b.name && a.value_type == b.value_type)
    }
}

impl TryFrom<Vec<FieldDefinition>> for RowType {
    type Error = RowError;

    fn try_from(fields: Vec<FieldDefinition>) -> Result<Self, Self::Error> {
        RowType::new(fields)
    }
}

impl From<RowType> for Vec<FieldDefinition> {
    fn from(row_type: RowType) -> Self {
        row_type.fields.as_ref().clone()
    }
}
