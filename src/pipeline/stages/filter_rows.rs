//! FilterRows: routes rows on a condition.
//!
//! With explicit targets, matching rows go to `send_true_to` and the rest to
//! `send_false_to`; a missing target drops that side. Once any target is set,
//! every output hop must be one of them. Without targets the stage is a plain
//! filter: matching rows go to every output hop.

use crate::pipeline::condition::{BoundCondition, Condition};
use crate::pipeline::error::{PipelineError, PipelineResult, StageResultExt};
use crate::pipeline::stage::{InputSchemas, StageIo, Transform};
use crate::row::RowType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRowsConfig {
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_true_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_false_to: Option<String>,
}

impl FilterRowsConfig {
    pub fn targets(&self) -> Vec<&str> {
        self.send_true_to
            .iter()
            .chain(self.send_false_to.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn has_targets(&self) -> bool {
        self.send_true_to.is_some() || self.send_false_to.is_some()
    }
}

pub struct FilterRows {
    name: String,
    config: FilterRowsConfig,
    condition: Option<BoundCondition>,
}

/// Resolved destination for one side of the condition.
#[derive(Clone, Copy)]
enum Route {
    All,
    Port(usize),
    Drop,
}

impl FilterRows {
    pub fn new(name: &str, config: FilterRowsConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            condition: None,
        }
    }

    fn resolve(&self, io: &StageIo, target: &Option<String>) -> PipelineResult<Route> {
        match target {
            Some(target) => io
                .outputs
                .index_of(target)
                .map(Route::Port)
                .ok_or_else(|| PipelineError::MissingTarget {
                    stage: self.name.clone(),
                    target: target.clone(),
                }),
            None => Ok(Route::Drop),
        }
    }
}

impl Transform for FilterRows {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        let input = inputs.single_main(&self.name)?;
        self.condition = Some(self.config.condition.bind(&input).config_err(&self.name)?);
        Ok(input)
    }

    fn execute(&mut self, io: &mut StageIo) -> PipelineResult<()> {
        let condition = self.condition.clone().ok_or_else(|| {
            PipelineError::configuration(&self.name, "condition was not prepared")
        })?;

        let (on_true, on_false) = if self.config.has_targets() {
            (
                self.resolve(io, &self.config.send_true_to)?,
                self.resolve(io, &self.config.send_false_to)?,
            )
        } else {
            (Route::All, Route::Drop)
        };

        let mut inputs = io.main_inputs();
        while let Some((_, row)) = inputs.take_any()? {
            let route = if condition.evaluate(&row) { on_true } else { on_false };
            match route {
                Route::All => io.outputs.put(row)?,
                Route::Port(index) => io.outputs.put_to(index, row)?,
                Route::Drop => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::condition::{ConditionFunction, Operand};
    use crate::pipeline::graph::HopRole;
    use crate::pipeline::stages::testing::{int_schema, ints, run_transform};

    fn below(limit: i64) -> Condition {
        Condition::compare("id", ConditionFunction::Smaller, Operand::value(limit))
    }

    fn values(rows: &[crate::row::Row]) -> Vec<i64> {
        rows.iter().map(|r| r.value(0).as_i64().unwrap()).collect()
    }

    #[test]
    fn test_filter_routes_both_sides() {
        let mut stage = FilterRows::new(
            "filter",
            FilterRowsConfig {
                condition: below(3),
                send_true_to: Some("A".into()),
                send_false_to: Some("B".into()),
            },
        );
        stage.prepare(&int_schema("in")).unwrap();
        let outputs = run_transform(
            &mut stage,
            vec![("in", HopRole::Main, ints(&[1, 5, 2, 9]))],
            &["A", "B"],
        )
        .unwrap();
        assert_eq!(values(&outputs[0]), vec![1, 2]);
        assert_eq!(values(&outputs[1]), vec![5, 9]);
    }

    #[test]
    fn test_filter_without_targets_broadcasts_matches() {
        let mut stage = FilterRows::new(
            "filter",
            FilterRowsConfig {
                condition: below(3),
                send_true_to: None,
                send_false_to: None,
            },
        );
        stage.prepare(&int_schema("in")).unwrap();
        let outputs = run_transform(
            &mut stage,
            vec![("in", HopRole::Main, ints(&[1, 5, 2]))],
            &["A", "B"],
        )
        .unwrap();
        assert_eq!(values(&outputs[0]), vec![1, 2]);
        assert_eq!(values(&outputs[1]), vec![1, 2]);
    }

    #[test]
    fn test_filter_type_mismatch_is_configuration_error() {
        let mut stage = FilterRows::new(
            "filter",
            FilterRowsConfig {
                condition: Condition::compare("id", ConditionFunction::Smaller, Operand::value("k"))
                    .negate(),
                send_true_to: Some("A".into()),
                send_false_to: Some("B".into()),
            },
        );
        let err = stage.prepare(&int_schema("in")).unwrap_err();
        assert!(matches!(
            &err,
            PipelineError::Configuration { stage, message }
                if stage == "filter" && message.contains("cannot compare 'id'")
        ));
    }

    #[test]
    fn test_filter_unknown_field() {
        let mut stage = FilterRows::new(
            "filter",
            FilterRowsConfig {
                condition: Condition::test("nope", ConditionFunction::IsNull),
                send_true_to: None,
                send_false_to: None,
            },
        );
        assert!(matches!(
            stage.prepare(&int_schema("in")),
            Err(PipelineError::Configuration { .. })
        ));
    }
}
