//! MetaStructure: describes the layout of its input stream.
//!
//! Input rows are consumed and counted. At end of input one row per input
//! field is emitted: position (1-based), name, type, length, precision and
//! format, optionally followed by the number of input rows.

use crate::pipeline::channel::StageOutputs;
use crate::pipeline::error::{PipelineResult, StageResultExt};
use crate::pipeline::stage::{InputSchemas, Transform};
use crate::row::{FieldDefinition, Row, RowType, Value, ValueType};
use serde::{Deserialize, Serialize};

fn default_row_count_field() -> String {
    "RowCount".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaStructureConfig {
    #[serde(default)]
    pub output_row_count: bool,
    #[serde(default = "default_row_count_field")]
    pub row_count_field: String,
}

impl Default for MetaStructureConfig {
    fn default() -> Self {
        Self {
            output_row_count: false,
            row_count_field: default_row_count_field(),
        }
    }
}

pub struct MetaStructure {
    name: String,
    config: MetaStructureConfig,
    input: RowType,
    rows: u64,
}

impl MetaStructure {
    pub fn new(name: &str, config: MetaStructureConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            input: RowType::empty(),
            rows: 0,
        }
    }

    fn describe(&self, position: usize, field: &FieldDefinition) -> Row {
        let mut values = vec![
            Value::Integer(position as i64 + 1),
            Value::String(field.name.clone()),
            Value::String(field.value_type.name().to_string()),
            field.length.map_or(Value::Null, |v| Value::Integer(v.into())),
            field.precision.map_or(Value::Null, |v| Value::Integer(v.into())),
            field.format.clone().map_or(Value::Null, Value::String),
        ];
        if self.config.output_row_count {
            values.push(Value::Integer(self.rows as i64));
        }
        Row::new(values)
    }
}

impl Transform for MetaStructure {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        self.input = inputs.single_main(&self.name)?;

        let mut fields = vec![
            FieldDefinition::new("Position", ValueType::Integer),
            FieldDefinition::new("Fieldname", ValueType::String),
            FieldDefinition::new("Type", ValueType::String),
            FieldDefinition::new("Length", ValueType::Integer),
            FieldDefinition::new("Precision", ValueType::Integer),
            FieldDefinition::new("Format", ValueType::String),
        ];
        if self.config.output_row_count {
            fields.push(FieldDefinition::new(
                self.config.row_count_field.clone(),
                ValueType::Integer,
            ));
        }
        RowType::new(fields).config_err(&self.name)
    }

    fn process_row(&mut self, _row: Row, _outputs: &mut StageOutputs) -> PipelineResult<()> {
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self, outputs: &mut StageOutputs) -> PipelineResult<()> {
        for (position, field) in self.input.fields().iter().enumerate() {
            outputs.put(self.describe(position, field))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::graph::HopRole;
    use crate::pipeline::stages::testing::{ints, run_transform};

    fn schemas() -> InputSchemas {
        let mut schemas = InputSchemas::new();
        schemas.add(
            "in",
            HopRole::Main,
            RowType::new(vec![
                FieldDefinition::new("id", ValueType::Integer).with_length(9),
                FieldDefinition::new("when", ValueType::Date).with_format("%Y-%m-%d"),
            ])
            .unwrap(),
        );
        schemas
    }

    #[test]
    fn test_describes_input_fields() {
        let mut stage = MetaStructure::new(
            "meta",
            MetaStructureConfig {
                output_row_count: true,
                ..Default::default()
            },
        );
        let out_type = stage.prepare(&schemas()).unwrap();
        assert_eq!(out_type.len(), 7);
        assert!(out_type.index_of("RowCount").is_some());

        let rows = ints(&[1, 2, 3])
            .into_iter()
            .map(|r| r.extend([Value::Null]))
            .collect();
        let outputs = run_transform(&mut stage, vec![("in", HopRole::Main, rows)], &["out"]).unwrap();
        let out = &outputs[0];
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].values(),
            &[
                Value::Integer(1),
                Value::from("id"),
                Value::from("Integer"),
                Value::Integer(9),
                Value::Null,
                Value::Null,
                Value::Integer(3),
            ]
        );
        assert_eq!(out[1].value(1), &Value::from("when"));
        assert_eq!(out[1].value(5), &Value::from("%Y-%m-%d"));
    }

    #[test]
    fn test_without_row_count() {
        let mut stage = MetaStructure::new("meta", MetaStructureConfig::default());
        assert_eq!(stage.prepare(&schemas()).unwrap().len(), 6);
    }
}
