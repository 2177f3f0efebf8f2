//! Constant: appends fixed values to every row.

use crate::pipeline::channel::StageOutputs;
use crate::pipeline::error::{PipelineResult, StageResultExt};
use crate::pipeline::stage::{InputSchemas, Transform};
use crate::row::{FieldDefinition, Row, RowType, Value, ValueType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    /// Text parsed into `value_type`. Empty means null.
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ConstantField {
    pub fn new(name: impl Into<String>, value_type: ValueType, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type,
            value: value.into(),
            format: None,
        }
    }

    fn definition(&self) -> FieldDefinition {
        let def = FieldDefinition::new(self.name.clone(), self.value_type);
        match &self.format {
            Some(format) => def.with_format(format.clone()),
            None => def,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstantConfig {
    pub fields: Vec<ConstantField>,
}

pub struct ConstantStage {
    name: String,
    config: ConstantConfig,
    values: Vec<Value>,
}

impl ConstantStage {
    pub fn new(name: &str, config: ConstantConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            values: Vec::new(),
        }
    }
}

impl Transform for ConstantStage {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        let input = inputs.single_main(&self.name)?;
        let definitions: Vec<FieldDefinition> =
            self.config.fields.iter().map(ConstantField::definition).collect();

        self.values = definitions
            .iter()
            .zip(&self.config.fields)
            .map(|(def, field)| def.parse(&field.value))
            .collect::<Result<_, _>>()
            .config_err(&self.name)?;

        input.append_all(definitions).config_err(&self.name)
    }

    fn process_row(&mut self, row: Row, outputs: &mut StageOutputs) -> PipelineResult<()> {
        outputs.put(row.extend(self.values.iter().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::graph::HopRole;
    use crate::pipeline::stages::testing::{int_schema, ints, run_transform};

    #[test]
    fn test_constant_appends_values() {
        let mut stage = ConstantStage::new(
            "const",
            ConstantConfig {
                fields: vec![
                    ConstantField::new("branch", ValueType::String, "A"),
                    ConstantField::new("weight", ValueType::Number, "0.5"),
                ],
            },
        );
        let out_type = stage.prepare(&int_schema("in")).unwrap();
        assert_eq!(out_type.field_names().collect::<Vec<_>>(), vec!["id", "branch", "weight"]);

        let outputs = run_transform(&mut stage, vec![("in", HopRole::Main, ints(&[7]))], &["out"]).unwrap();
        assert_eq!(
            outputs[0][0].values(),
            &[Value::Integer(7), Value::from("A"), Value::Number(0.5)]
        );
    }

    #[test]
    fn test_constant_bad_value() {
        let mut stage = ConstantStage::new(
            "const",
            ConstantConfig {
                fields: vec![ConstantField::new("n", ValueType::Integer, "abc")],
            },
        );
        assert!(stage.prepare(&int_schema("in")).is_err());
    }

    #[test]
    fn test_constant_name_clash() {
        let mut stage = ConstantStage::new(
            "const",
            ConstantConfig {
                fields: vec![ConstantField::new("id", ValueType::Integer, "1")],
            },
        );
        assert!(stage.prepare(&int_schema("in")).is_err());
    }
}
