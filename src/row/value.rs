//! Typed field values and the semantic types they belong to.
//!
//! Two orderings are defined over [`Value`]:
//!
//! - [`Value::compare`] is the partial, type-aware comparison used by conditions
//!   and routing. Nulls and incomparable types yield `None`.
//! - [`Value::sort_cmp`] is a total order used for sort-merge keys. Nulls sort
//!   first; integers and numbers compare numerically with each other.

use crate::row::RowError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Default mask for parsing and printing dates.
pub const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

/// Fallback mask when a date has no time part.
const DATE_ONLY_FORMAT: &str = "%Y/%m/%d";

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValueType {
    #[default]
    String,
    Integer,
    Number,
    Date,
    Boolean,
    Binary,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "String",
            ValueType::Integer => "Integer",
            ValueType::Number => "Number",
            ValueType::Date => "Date",
            ValueType::Boolean => "Boolean",
            ValueType::Binary => "Binary",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Number)
    }

    /// Whether values of the two types can be ordered against each other.
    pub fn is_comparable_with(&self, other: ValueType) -> bool {
        *self == other || (self.is_numeric() && other.is_numeric())
    }

    /// Parse text into a value of this type.
    ///
    /// Empty text is null. Numbers and booleans are trimmed first; dates use
    /// `format` (strftime syntax) or [`DEFAULT_DATE_FORMAT`], falling back to a
    /// date-only mask.
    pub fn parse(&self, text: &str, format: Option<&str>) -> Result<Value, RowError> {
        if text.is_empty() {
            return Ok(Value::Null);
        }

        let conversion = || RowError::Conversion {
            text: text.to_string(),
            value_type: *self,
        };

        match self {
            ValueType::String => Ok(Value::String(text.to_string())),
            ValueType::Integer => text
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| conversion()),
            ValueType::Number => text
                .trim()
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| conversion()),
            ValueType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => Ok(Value::Boolean(true)),
                "n" | "no" | "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err(conversion()),
            },
            ValueType::Date => {
                let text = text.trim();
                let mask = format.unwrap_or(DEFAULT_DATE_FORMAT);
                NaiveDateTime::parse_from_str(text, mask)
                    .or_else(|_| {
                        NaiveDate::parse_from_str(text, format.unwrap_or(DATE_ONLY_FORMAT))
                            .map(|d| d.and_time(chrono::NaiveTime::MIN))
                    })
                    .map(Value::Date)
                    .map_err(|_| conversion())
            }
            ValueType::Binary => Ok(Value::Binary(text.as_bytes().to_vec())),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Number(f64),
    String(String),
    Date(NaiveDateTime),
    Boolean(bool),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The semantic type of this value, `None` for null.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(ValueType::Integer),
            Value::Number(_) => Some(ValueType::Number),
            Value::String(_) => Some(ValueType::String),
            Value::Date(_) => Some(ValueType::Date),
            Value::Boolean(_) => Some(ValueType::Boolean),
            Value::Binary(_) => Some(ValueType::Binary),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Type-aware comparison. `None` when either side is null or the types
    /// cannot be ordered against each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(_) | Value::Number(_), Value::Integer(_) | Value::Number(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order for sort keys: nulls first, then by value.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => match self.compare(other) {
                Some(ordering) => ordering,
                None => match (self.as_f64(), other.as_f64()) {
                    // NaN lands here.
                    (Some(a), Some(b)) => a.total_cmp(&b),
                    _ => self.type_rank().cmp(&other.type_rank()),
                },
            },
        }
    }

    /// Exact equality used for hash keys. Unlike `==`, NaN equals NaN and
    /// `-0.0` equals `0.0`.
    pub fn key_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                canonical_bits(*a) == canonical_bits(*b)
            }
            _ => self == other,
        }
    }

    pub(crate) fn hash_key<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Value::Null => {}
            Value::Integer(v) => v.hash(state),
            Value::Number(v) => canonical_bits(*v).hash(state),
            Value::String(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Boolean(v) => v.hash(state),
            Value::Binary(v) => v.hash(state),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Date(_) => 5,
            Value::Binary(_) => 6,
        }
    }
}

fn canonical_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Number(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format(DEFAULT_DATE_FORMAT)),
            Value::Boolean(v) => write!(f, "{}", if *v { "Y" } else { "N" }),
            Value::Binary(v) => {
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers_trimmed() {
        assert_eq!(
            ValueType::Integer.parse(" 42 ", None).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            ValueType::Number.parse("1.5", None).unwrap(),
            Value::Number(1.5)
        );
        assert!(ValueType::Integer.parse("4x", None).is_err());
    }

    #[test]
    fn test_parse_empty_is_null() {
        assert_eq!(ValueType::Integer.parse("", None).unwrap(), Value::Null);
        assert_eq!(ValueType::String.parse("", None).unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_dates() {
        let full = ValueType::Date
            .parse("2024/03/01 12:30:00.000", None)
            .unwrap();
        let date_only = ValueType::Date.parse("2024/03/01", None).unwrap();
        assert_eq!(full.compare(&date_only), Some(Ordering::Greater));

        let custom = ValueType::Date.parse("01-03-2024", Some("%d-%m-%Y")).unwrap();
        assert_eq!(custom, date_only);
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(ValueType::Boolean.parse("Y", None).unwrap(), Value::Boolean(true));
        assert_eq!(ValueType::Boolean.parse("false", None).unwrap(), Value::Boolean(false));
        assert!(ValueType::Boolean.parse("maybe", None).is_err());
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(Value::Integer(2).compare(&Value::Number(2.0)), Some(Ordering::Equal));
        assert_eq!(Value::Integer(1).compare(&Value::Number(1.5)), Some(Ordering::Less));
    }

    #[test]
    fn test_compare_null_and_mismatch() {
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::from("a").compare(&Value::Integer(1)), None);
    }

    #[test]
    fn test_sort_cmp_nulls_first() {
        let mut values = vec![Value::from("b"), Value::Null, Value::from("a")];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values, vec![Value::Null, Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_key_eq_canonical_floats() {
        assert!(Value::Number(f64::NAN).key_eq(&Value::Number(f64::NAN)));
        assert!(Value::Number(-0.0).key_eq(&Value::Number(0.0)));
        assert!(!Value::Integer(1).key_eq(&Value::Number(1.0)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Boolean(true).to_string(), "Y");
        assert_eq!(Value::Binary(vec![0xde, 0xad]).to_string(), "dead");
    }
}
