//! Boolean row predicates.
//!
//! A [`Condition`] is a serializable tree that names fields. Before rows flow
//! it is bound against a [`RowType`], which resolves every field name to an
//! index once. The resulting [`BoundCondition`] evaluates without allocation
//! and never touches shared state.
//!
//! Comparisons involving a null operand are false, except for the explicit
//! `IsNull`/`IsNotNull` tests.

use crate::row::{Row, RowError, RowType, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Comparison applied by a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionFunction {
    Equal,
    NotEqual,
    Smaller,
    SmallerEqual,
    Larger,
    LargerEqual,
    IsNull,
    IsNotNull,
    /// Right operand must be a list.
    InList,
    Contains,
    StartsWith,
    EndsWith,
    /// Always true.
    True,
}

impl ConditionFunction {
    /// Functions that order or equate values, so both sides need
    /// comparable types.
    fn compares_values(&self) -> bool {
        matches!(
            self,
            ConditionFunction::Equal
                | ConditionFunction::NotEqual
                | ConditionFunction::Smaller
                | ConditionFunction::SmallerEqual
                | ConditionFunction::Larger
                | ConditionFunction::LargerEqual
                | ConditionFunction::InList
        )
    }

    fn needs_operand(&self) -> bool {
        !matches!(
            self,
            ConditionFunction::IsNull | ConditionFunction::IsNotNull | ConditionFunction::True
        )
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Value(Value),
    Field(String),
    List(Vec<Value>),
}

impl Operand {
    pub fn value(v: impl Into<Value>) -> Self {
        Operand::Value(v.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Operand::Field(name.into())
    }
}

/// Condition tree as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Comparison {
        left: String,
        function: ConditionFunction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right: Option<Operand>,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error(transparent)]
    Field(#[from] RowError),

    #[error("{function:?} on '{field}' needs a right operand")]
    MissingOperand {
        field: String,
        function: ConditionFunction,
    },

    #[error("{function:?} on '{field}' cannot use this operand")]
    InvalidOperand {
        field: String,
        function: ConditionFunction,
    },

    #[error("{function:?} cannot compare '{field}' ({left}) with {right}")]
    TypeMismatch {
        field: String,
        function: ConditionFunction,
        left: ValueType,
        right: ValueType,
    },
}

impl Condition {
    pub fn compare(left: impl Into<String>, function: ConditionFunction, right: Operand) -> Self {
        Condition::Comparison {
            left: left.into(),
            function,
            right: Some(right),
        }
    }

    /// A test that takes no right operand, such as `IsNull`.
    pub fn test(left: impl Into<String>, function: ConditionFunction) -> Self {
        Condition::Comparison {
            left: left.into(),
            function,
            right: None,
        }
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Condition::And(children)
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Or(children)
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Resolve field names against `row_type`.
    pub fn bind(&self, row_type: &RowType) -> Result<BoundCondition, ConditionError> {
        Ok(BoundCondition {
            root: Self::bind_node(self, row_type)?,
        })
    }

    fn bind_node(node: &Condition, row_type: &RowType) -> Result<BoundNode, ConditionError> {
        match node {
            Condition::Comparison {
                left,
                function,
                right,
            } => {
                let left_index = row_type.require(left)?;
                let right = match (right, function.needs_operand()) {
                    (_, false) => BoundOperand::None,
                    (None, true) => {
                        return Err(ConditionError::MissingOperand {
                            field: left.clone(),
                            function: *function,
                        })
                    }
                    (Some(Operand::List(values)), true) => {
                        if *function != ConditionFunction::InList {
                            return Err(ConditionError::InvalidOperand {
                                field: left.clone(),
                                function: *function,
                            });
                        }
                        BoundOperand::List(values.clone())
                    }
                    (Some(_), true) if *function == ConditionFunction::InList => {
                        return Err(ConditionError::InvalidOperand {
                            field: left.clone(),
                            function: *function,
                        })
                    }
                    (Some(Operand::Value(v)), true) => BoundOperand::Value(v.clone()),
                    (Some(Operand::Field(name)), true) => {
                        BoundOperand::Field(row_type.require(name)?)
                    }
                };
                if function.compares_values() {
                    Self::check_types(left, left_index, *function, &right, row_type)?;
                }
                Ok(BoundNode::Comparison {
                    left: left_index,
                    function: *function,
                    right,
                })
            }
            Condition::And(children) => Ok(BoundNode::And(
                children
                    .iter()
                    .map(|c| Self::bind_node(c, row_type))
                    .collect::<Result<_, _>>()?,
            )),
            Condition::Or(children) => Ok(BoundNode::Or(
                children
                    .iter()
                    .map(|c| Self::bind_node(c, row_type))
                    .collect::<Result<_, _>>()?,
            )),
            Condition::Not(child) => Ok(BoundNode::Not(Box::new(Self::bind_node(
                child, row_type,
            )?))),
        }
    }

    /// Null literals and untyped fields are accepted; they never compare true.
    fn check_types(
        field: &str,
        left: usize,
        function: ConditionFunction,
        right: &BoundOperand,
        row_type: &RowType,
    ) -> Result<(), ConditionError> {
        let Some(left_type) = row_type.field(left).map(|f| f.value_type) else {
            return Ok(());
        };
        let right_types: Vec<ValueType> = match right {
            BoundOperand::Value(v) => v.value_type().into_iter().collect(),
            BoundOperand::List(values) => values.iter().filter_map(Value::value_type).collect(),
            BoundOperand::Field(index) => row_type
                .field(*index)
                .map(|f| f.value_type)
                .into_iter()
                .collect(),
            BoundOperand::None => Vec::new(),
        };
        match right_types.into_iter().find(|t| !left_type.is_comparable_with(*t)) {
            Some(right) => Err(ConditionError::TypeMismatch {
                field: field.to_string(),
                function,
                left: left_type,
                right,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
enum BoundOperand {
    None,
    Value(Value),
    Field(usize),
    List(Vec<Value>),
}

#[derive(Debug, Clone)]
enum BoundNode {
    Comparison {
        left: usize,
        function: ConditionFunction,
        right: BoundOperand,
    },
    And(Vec<BoundNode>),
    Or(Vec<BoundNode>),
    Not(Box<BoundNode>),
}

/// A condition with field references resolved to indices.
#[derive(Debug, Clone)]
pub struct BoundCondition {
    root: BoundNode,
}

impl BoundCondition {
    pub fn evaluate(&self, row: &Row) -> bool {
        Self::eval(&self.root, row)
    }

    fn eval(node: &BoundNode, row: &Row) -> bool {
        match node {
            BoundNode::And(children) => children.iter().all(|c| Self::eval(c, row)),
            BoundNode::Or(children) => children.iter().any(|c| Self::eval(c, row)),
            BoundNode::Not(child) => !Self::eval(child, row),
            BoundNode::Comparison {
                left,
                function,
                right,
            } => Self::compare(row.value(*left), *function, right, row),
        }
    }

    fn compare(left: &Value, function: ConditionFunction, right: &BoundOperand, row: &Row) -> bool {
        match function {
            ConditionFunction::True => return true,
            ConditionFunction::IsNull => return left.is_null(),
            ConditionFunction::IsNotNull => return !left.is_null(),
            _ => {}
        }
        if left.is_null() {
            return false;
        }

        let right = match right {
            BoundOperand::List(values) => {
                return values
                    .iter()
                    .any(|v| left.compare(v) == Some(Ordering::Equal))
            }
            BoundOperand::Value(v) => v,
            BoundOperand::Field(index) => row.value(*index),
            BoundOperand::None => return false,
        };
        if right.is_null() {
            return false;
        }

        match function {
            ConditionFunction::Contains => left.to_string().contains(&right.to_string()),
            ConditionFunction::StartsWith => left.to_string().starts_with(&right.to_string()),
            ConditionFunction::EndsWith => left.to_string().ends_with(&right.to_string()),
            _ => {
                let Some(ordering) = left.compare(right) else {
                    return false;
                };
                match function {
                    ConditionFunction::Equal => ordering == Ordering::Equal,
                    ConditionFunction::NotEqual => ordering != Ordering::Equal,
                    ConditionFunction::Smaller => ordering == Ordering::Less,
                    ConditionFunction::SmallerEqual => ordering != Ordering::Greater,
                    ConditionFunction::Larger => ordering == Ordering::Greater,
                    ConditionFunction::LargerEqual => ordering != Ordering::Less,
                    _ => false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::FieldDefinition;

    fn layout() -> RowType {
        RowType::new(vec![
            FieldDefinition::new("name", ValueType::String),
            FieldDefinition::new("age", ValueType::Integer),
            FieldDefinition::new("limit", ValueType::Integer),
        ])
        .unwrap()
    }

    fn row(name: Option<&str>, age: Option<i64>, limit: i64) -> Row {
        Row::new(vec![name.into(), age.into(), Value::Integer(limit)])
    }

    #[test]
    fn test_smaller_than_constant() {
        let cond = Condition::compare("name", ConditionFunction::Smaller, Operand::value("k"))
            .bind(&layout())
            .unwrap();
        assert!(cond.evaluate(&row(Some("alice"), None, 0)));
        assert!(!cond.evaluate(&row(Some("zed"), None, 0)));
        assert!(!cond.evaluate(&row(None, None, 0)));
    }

    #[test]
    fn test_field_to_field() {
        let cond = Condition::compare("age", ConditionFunction::LargerEqual, Operand::field("limit"))
            .bind(&layout())
            .unwrap();
        assert!(cond.evaluate(&row(None, Some(18), 18)));
        assert!(!cond.evaluate(&row(None, Some(17), 18)));
        assert!(!cond.evaluate(&row(None, None, 18)));
    }

    #[test]
    fn test_null_tests() {
        let is_null = Condition::test("age", ConditionFunction::IsNull)
            .bind(&layout())
            .unwrap();
        assert!(is_null.evaluate(&row(None, None, 0)));
        assert!(!is_null.evaluate(&row(None, Some(1), 0)));
    }

    #[test]
    fn test_null_never_not_equal() {
        let cond = Condition::compare("age", ConditionFunction::NotEqual, Operand::value(5i64))
            .bind(&layout())
            .unwrap();
        assert!(cond.evaluate(&row(None, Some(4), 0)));
        assert!(!cond.evaluate(&row(None, None, 0)));
    }

    #[test]
    fn test_in_list_and_strings() {
        let rt = layout();
        let in_list = Condition::compare(
            "name",
            ConditionFunction::InList,
            Operand::List(vec![Value::from("CA"), Value::from("NY")]),
        )
        .bind(&rt)
        .unwrap();
        assert!(in_list.evaluate(&row(Some("NY"), None, 0)));
        assert!(!in_list.evaluate(&row(Some("TX"), None, 0)));

        let starts = Condition::compare("name", ConditionFunction::StartsWith, Operand::value("al"))
            .bind(&rt)
            .unwrap();
        assert!(starts.evaluate(&row(Some("alice"), None, 0)));

        let contains = Condition::compare("age", ConditionFunction::Contains, Operand::value("2"))
            .bind(&rt)
            .unwrap();
        assert!(contains.evaluate(&row(None, Some(42), 0)));
    }

    #[test]
    fn test_and_or_not() {
        let rt = layout();
        let adult = Condition::compare("age", ConditionFunction::Larger, Operand::value(17i64));
        let named = Condition::test("name", ConditionFunction::IsNotNull);

        let both = Condition::and(vec![adult.clone(), named.clone()]).bind(&rt).unwrap();
        let either = Condition::or(vec![adult.clone(), named]).bind(&rt).unwrap();
        let minor = adult.negate().bind(&rt).unwrap();

        let r = row(None, Some(30), 0);
        assert!(!both.evaluate(&r));
        assert!(either.evaluate(&r));
        assert!(!minor.evaluate(&r));
        assert!(Condition::and(vec![]).bind(&rt).unwrap().evaluate(&r));
        assert!(!Condition::or(vec![]).bind(&rt).unwrap().evaluate(&r));
    }

    #[test]
    fn test_bind_errors() {
        let rt = layout();
        assert!(matches!(
            Condition::test("missing", ConditionFunction::IsNull).bind(&rt),
            Err(ConditionError::Field(RowError::UnknownField(_)))
        ));
        assert!(matches!(
            Condition::test("age", ConditionFunction::Equal).bind(&rt),
            Err(ConditionError::MissingOperand { .. })
        ));
        assert!(matches!(
            Condition::compare("age", ConditionFunction::InList, Operand::value(1i64)).bind(&rt),
            Err(ConditionError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn test_incomparable_types_rejected() {
        let mut fields = layout().fields().to_vec();
        fields.push(FieldDefinition::new("born", ValueType::Date));
        let rt = RowType::new(fields).unwrap();

        assert!(matches!(
            Condition::compare("name", ConditionFunction::Smaller, Operand::value(5i64)).bind(&rt),
            Err(ConditionError::TypeMismatch {
                left: ValueType::String,
                right: ValueType::Integer,
                ..
            })
        ));
        // Nested under NOT, the mismatch still fails the bind.
        assert!(Condition::compare("name", ConditionFunction::Equal, Operand::value(5i64))
            .negate()
            .bind(&rt)
            .is_err());
        assert!(matches!(
            Condition::compare("born", ConditionFunction::Equal, Operand::field("name")).bind(&rt),
            Err(ConditionError::TypeMismatch { right: ValueType::String, .. })
        ));
        assert!(matches!(
            Condition::compare(
                "age",
                ConditionFunction::InList,
                Operand::List(vec![Value::Integer(1), Value::from("two")]),
            )
            .bind(&rt),
            Err(ConditionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_compatible_operands_bind() {
        let rt = layout();
        // Integers and numbers order against each other; null literals are allowed.
        assert!(Condition::compare("age", ConditionFunction::Larger, Operand::value(17.5))
            .bind(&rt)
            .is_ok());
        assert!(
            Condition::compare("age", ConditionFunction::Equal, Operand::Value(Value::Null))
                .bind(&rt)
                .is_ok()
        );
        // Text functions work on the rendered value of any type.
        assert!(Condition::compare("age", ConditionFunction::Contains, Operand::value("2"))
            .bind(&rt)
            .is_ok());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let text = r#"
            [comparison]
            left = "name"
            function = "Smaller"
            right = { value = { String = "k" } }
        "#;
        let cond: Condition = toml::from_str(text).unwrap();
        assert_eq!(
            cond,
            Condition::compare("name", ConditionFunction::Smaller, Operand::value("k"))
        );
    }
}
