//! SwitchCase: routes each row to exactly one target by field value.
//!
//! Case values are written as text and converted to the switch field's type
//! when the stage is prepared. Cases are tried in order and the first equal
//! one wins; rows matching no case go to the default target. An empty case
//! value matches null.

use crate::pipeline::error::{PipelineError, PipelineResult, StageResultExt};
use crate::pipeline::stage::{InputSchemas, StageIo, Transform};
use crate::row::{RowType, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCaseTarget {
    pub value: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCaseConfig {
    pub field: String,
    #[serde(default)]
    pub cases: Vec<SwitchCaseTarget>,
    pub default_target: String,
    /// Format mask for parsing case values, e.g. for dates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_format: Option<String>,
}

impl SwitchCaseConfig {
    /// Every distinct target, cases first, default last.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::with_capacity(self.cases.len() + 1);
        for name in self
            .cases
            .iter()
            .map(|c| c.target.as_str())
            .chain(std::iter::once(self.default_target.as_str()))
        {
            if !targets.contains(&name) {
                targets.push(name);
            }
        }
        targets
    }
}

pub struct SwitchCase {
    name: String,
    config: SwitchCaseConfig,
    field_index: usize,
    case_values: Vec<Value>,
}

impl SwitchCase {
    pub fn new(name: &str, config: SwitchCaseConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            field_index: 0,
            case_values: Vec::new(),
        }
    }

    fn matches(case: &Value, value: &Value) -> bool {
        if case.is_null() {
            value.is_null()
        } else {
            value.compare(case) == Some(Ordering::Equal)
        }
    }
}

impl Transform for SwitchCase {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        let input = inputs.single_main(&self.name)?;
        self.field_index = input.require(&self.config.field).config_err(&self.name)?;

        let field_type = input.fields()[self.field_index].value_type;
        self.case_values = self
            .config
            .cases
            .iter()
            .map(|c| field_type.parse(&c.value, self.config.case_format.as_deref()))
            .collect::<Result<_, _>>()
            .config_err(&self.name)?;

        Ok(input)
    }

    fn execute(&mut self, io: &mut StageIo) -> PipelineResult<()> {
        let port = |target: &str| {
            io.outputs
                .index_of(target)
                .ok_or_else(|| PipelineError::MissingTarget {
                    stage: self.name.clone(),
                    target: target.to_string(),
                })
        };
        let case_ports = self
            .config
            .cases
            .iter()
            .map(|c| port(&c.target))
            .collect::<PipelineResult<Vec<usize>>>()?;
        let default_port = port(&self.config.default_target)?;

        let mut inputs = io.main_inputs();
        while let Some((_, row)) = inputs.take_any()? {
            let value = row.value(self.field_index);
            let index = self
                .case_values
                .iter()
                .position(|case| Self::matches(case, value))
                .map_or(default_port, |i| case_ports[i]);
            io.outputs.put_to(index, row)?;
        }
        Ok(())
    }
}
