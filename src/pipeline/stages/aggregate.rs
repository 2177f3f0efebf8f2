//! Aggregate functions for GroupBy.

use crate::pipeline::error::{PipelineError, PipelineResult, StageResultExt};
use crate::row::{FieldDefinition, RowKey, RowType, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Sum,
    Average,
    Min,
    Max,
    /// Non-null values.
    Count,
    /// All rows, nulls included.
    CountAll,
    CountDistinct,
    /// First non-null value.
    First,
    /// Last non-null value.
    Last,
    FirstIncludingNull,
    LastIncludingNull,
    /// Values joined with `", "`.
    ConcatComma,
    /// Values joined with `param`.
    ConcatString,
    /// Population standard deviation.
    StandardDeviation,
}

/// One aggregate column of a GroupBy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Name of the output field.
    pub result_field: String,
    /// Field being aggregated.
    pub source_field: String,
    pub function: AggregateFunction,
    /// Separator for `ConcatString`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl AggregateSpec {
    pub fn new(
        result_field: impl Into<String>,
        source_field: impl Into<String>,
        function: AggregateFunction,
    ) -> Self {
        Self {
            result_field: result_field.into(),
            source_field: source_field.into(),
            function,
            param: None,
        }
    }
}

/// An aggregate with its source field resolved.
#[derive(Debug, Clone)]
pub(crate) struct BoundAggregate {
    function: AggregateFunction,
    source: usize,
    source_type: ValueType,
    separator: String,
}

impl BoundAggregate {
    /// Resolve `spec` against the input layout, returning the bound aggregate
    /// and the definition of the field it produces.
    pub(crate) fn bind(
        spec: &AggregateSpec,
        input: &RowType,
        stage: &str,
    ) -> PipelineResult<(Self, FieldDefinition)> {
        let source = input.require(&spec.source_field).config_err(stage)?;
        let source_def = &input.fields()[source];
        let source_type = source_def.value_type;

        let numeric_only = matches!(
            spec.function,
            AggregateFunction::Sum | AggregateFunction::Average | AggregateFunction::StandardDeviation
        );
        if numeric_only && !source_type.is_numeric() {
            return Err(PipelineError::configuration(
                stage,
                format!(
                    "{:?} needs a numeric field, '{}' is {}",
                    spec.function, spec.source_field, source_type
                ),
            ));
        }

        let output = match spec.function {
            AggregateFunction::Sum
            | AggregateFunction::Min
            | AggregateFunction::Max
            | AggregateFunction::First
            | AggregateFunction::Last
            | AggregateFunction::FirstIncludingNull
            | AggregateFunction::LastIncludingNull => {
                source_def.renamed(spec.result_field.clone())
            }
            AggregateFunction::Average | AggregateFunction::StandardDeviation => {
                FieldDefinition::new(spec.result_field.clone(), ValueType::Number)
            }
            AggregateFunction::Count
            | AggregateFunction::CountAll
            | AggregateFunction::CountDistinct => {
                FieldDefinition::new(spec.result_field.clone(), ValueType::Integer)
            }
            AggregateFunction::ConcatComma | AggregateFunction::ConcatString => {
                FieldDefinition::new(spec.result_field.clone(), ValueType::String)
            }
        };

        let separator = match spec.function {
            AggregateFunction::ConcatString => spec.param.clone().unwrap_or_default(),
            _ => ", ".to_string(),
        };

        Ok((
            Self {
                function: spec.function,
                source,
                source_type,
                separator,
            },
            output,
        ))
    }

    pub(crate) fn source(&self) -> usize {
        self.source
    }

    pub(crate) fn accumulator(&self) -> Accumulator {
        match self.function {
            AggregateFunction::Sum if self.source_type == ValueType::Integer => {
                Accumulator::IntegerSum(None)
            }
            AggregateFunction::Sum => Accumulator::NumberSum(None),
            AggregateFunction::Average => Accumulator::Average { sum: 0.0, count: 0 },
            AggregateFunction::Min => Accumulator::Extreme {
                best: None,
                keep: Ordering::Less,
            },
            AggregateFunction::Max => Accumulator::Extreme {
                best: None,
                keep: Ordering::Greater,
            },
            AggregateFunction::Count => Accumulator::Count(0),
            AggregateFunction::CountAll => Accumulator::CountAll(0),
            AggregateFunction::CountDistinct => Accumulator::CountDistinct(HashSet::new()),
            AggregateFunction::First => Accumulator::First {
                value: None,
                nulls: false,
            },
            AggregateFunction::FirstIncludingNull => Accumulator::First {
                value: None,
                nulls: true,
            },
            AggregateFunction::Last => Accumulator::Last {
                value: None,
                nulls: false,
            },
            AggregateFunction::LastIncludingNull => Accumulator::Last {
                value: None,
                nulls: true,
            },
            AggregateFunction::ConcatComma | AggregateFunction::ConcatString => {
                Accumulator::Concat {
                    parts: Vec::new(),
                    separator: self.separator.clone(),
                }
            }
            AggregateFunction::StandardDeviation => Accumulator::Deviation {
                count: 0,
                mean: 0.0,
                m2: 0.0,
            },
        }
    }
}

/// Running state of one aggregate for one group.
#[derive(Debug, Clone)]
pub(crate) enum Accumulator {
    IntegerSum(Option<i64>),
    NumberSum(Option<f64>),
    Average { sum: f64, count: u64 },
    Extreme { best: Option<Value>, keep: Ordering },
    Count(i64),
    CountAll(i64),
    CountDistinct(HashSet<RowKey>),
    First { value: Option<Value>, nulls: bool },
    Last { value: Option<Value>, nulls: bool },
    Concat { parts: Vec<String>, separator: String },
    /// Welford's online algorithm.
    Deviation { count: u64, mean: f64, m2: f64 },
}

impl Accumulator {
    /// Fold one value in. Fails only on integer overflow.
    pub(crate) fn add(&mut self, value: &Value) -> Result<(), String> {
        if let Accumulator::CountAll(n) = self {
            *n += 1;
            return Ok(());
        }
        match self {
            Accumulator::First { value: slot, nulls } => {
                if slot.is_none() && (*nulls || !value.is_null()) {
                    *slot = Some(value.clone());
                }
                return Ok(());
            }
            Accumulator::Last { value: slot, nulls } => {
                if *nulls || !value.is_null() {
                    *slot = Some(value.clone());
                }
                return Ok(());
            }
            _ => {}
        }
        if value.is_null() {
            return Ok(());
        }

        match self {
            Accumulator::IntegerSum(sum) => {
                let v = value.as_i64().unwrap_or_default();
                let next = sum.unwrap_or(0).checked_add(v);
                *sum = Some(next.ok_or_else(|| "integer overflow in Sum".to_string())?);
            }
            Accumulator::NumberSum(sum) => {
                *sum = Some(sum.unwrap_or(0.0) + value.as_f64().unwrap_or_default());
            }
            Accumulator::Average { sum, count } => {
                *sum += value.as_f64().unwrap_or_default();
                *count += 1;
            }
            Accumulator::Extreme { best, keep } => {
                let replace = match best {
                    None => true,
                    Some(current) => value.sort_cmp(current) == *keep,
                };
                if replace {
                    *best = Some(value.clone());
                }
            }
            Accumulator::Count(n) => *n += 1,
            Accumulator::CountDistinct(seen) => {
                seen.insert(RowKey::new(vec![value.clone()]));
            }
            Accumulator::Concat { parts, .. } => parts.push(value.to_string()),
            Accumulator::Deviation { count, mean, m2 } => {
                let x = value.as_f64().unwrap_or_default();
                *count += 1;
                let delta = x - *mean;
                *mean += delta / *count as f64;
                *m2 += delta * (x - *mean);
            }
            Accumulator::CountAll(_) | Accumulator::First { .. } | Accumulator::Last { .. } => {}
        }
        Ok(())
    }

    /// Final value. Aggregates that saw no values are null, counts are zero.
    pub(crate) fn finish(self) -> Value {
        match self {
            Accumulator::IntegerSum(sum) => sum.into(),
            Accumulator::NumberSum(sum) => sum.into(),
            Accumulator::Average { sum, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Number(sum / count as f64)
                }
            }
            Accumulator::Extreme { best, .. } => best.unwrap_or_default(),
            Accumulator::Count(n) | Accumulator::CountAll(n) => Value::Integer(n),
            Accumulator::CountDistinct(seen) => Value::Integer(seen.len() as i64),
            Accumulator::First { value, .. } | Accumulator::Last { value, .. } => {
                value.unwrap_or_default()
            }
            Accumulator::Concat { parts, separator } => {
                if parts.is_empty() {
                    Value::Null
                } else {
                    Value::String(parts.join(&separator))
                }
            }
            Accumulator::Deviation { count, m2, .. } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Number((m2 / count as f64).sqrt())
                }
            }
        }
    }
}
