//! GroupBy: one output row per group of rows sharing key values.
//!
//! Two strategies:
//! - **Sorted** (default): input must arrive grouped on the key fields. A
//!   group is flushed as soon as the key changes, so only one group is held
//!   in memory.
//! - **Hashed**: any input order. Groups are held until end of stream and
//!   emitted in the order their keys were first seen.
//!
//! Output rows are the group fields followed by one field per aggregate.

use crate::pipeline::channel::StageOutputs;
use crate::pipeline::error::{PipelineError, PipelineResult, StageResultExt};
use crate::pipeline::stage::{InputSchemas, Transform};
use crate::pipeline::stages::aggregate::{Accumulator, AggregateSpec, BoundAggregate};
use crate::row::{Row, RowKey, RowType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupStrategy {
    #[default]
    Sorted,
    Hashed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupByConfig {
    #[serde(default)]
    pub group_fields: Vec<String>,
    #[serde(default)]
    pub aggregates: Vec<AggregateSpec>,
    #[serde(default)]
    pub strategy: GroupStrategy,
    /// Emit one row even for empty input when there are no group fields.
    #[serde(default)]
    pub always_emit: bool,
}

type Group = (RowKey, Vec<Accumulator>);

pub struct GroupBy {
    name: String,
    config: GroupByConfig,
    group_indices: Vec<usize>,
    aggregates: Vec<BoundAggregate>,
    current: Option<Group>,
    groups: Vec<Group>,
    index: HashMap<RowKey, usize>,
    emitted: u64,
}

impl GroupBy {
    pub fn new(name: &str, config: GroupByConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            group_indices: Vec::new(),
            aggregates: Vec::new(),
            current: None,
            groups: Vec::new(),
            index: HashMap::new(),
            emitted: 0,
        }
    }

    fn new_accumulators(&self) -> Vec<Accumulator> {
        self.aggregates.iter().map(BoundAggregate::accumulator).collect()
    }

    fn fold(&self, accumulators: &mut [Accumulator], row: &Row) -> PipelineResult<()> {
        for (acc, agg) in accumulators.iter_mut().zip(&self.aggregates) {
            acc.add(row.value(agg.source())).row_err(&self.name)?;
        }
        Ok(())
    }

    fn emit(&mut self, group: Group, outputs: &mut StageOutputs) -> PipelineResult<()> {
        let (key, accumulators) = group;
        let mut values = key.into_values();
        values.extend(accumulators.into_iter().map(Accumulator::finish));
        self.emitted += 1;
        outputs.put(Row::new(values))
    }
}

impl Transform for GroupBy {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        let input = inputs.single_main(&self.name)?;

        let mut fields = Vec::new();
        self.group_indices.clear();
        for name in &self.config.group_fields {
            let index = input.require(name).config_err(&self.name)?;
            self.group_indices.push(index);
            fields.push(input.fields()[index].clone());
        }

        self.aggregates.clear();
        for spec in &self.config.aggregates {
            let (bound, field) = BoundAggregate::bind(spec, &input, &self.name)?;
            self.aggregates.push(bound);
            fields.push(field);
        }

        RowType::new(fields).map_err(|e| {
            PipelineError::configuration(&self.name, format!("output layout: {}", e))
        })
    }

    fn process_row(&mut self, row: Row, outputs: &mut StageOutputs) -> PipelineResult<()> {
        let key = RowKey::from_row(&row, &self.group_indices);

        match self.config.strategy {
            GroupStrategy::Sorted => {
                let mut group = match self.current.take() {
                    Some(group) if group.0 == key => group,
                    Some(finished) => {
                        self.emit(finished, outputs)?;
                        (key, self.new_accumulators())
                    }
                    None => (key, self.new_accumulators()),
                };
                self.fold(&mut group.1, &row)?;
                self.current = Some(group);
            }
            GroupStrategy::Hashed => {
                let slot = match self.index.get(&key) {
                    Some(&slot) => slot,
                    None => {
                        let slot = self.groups.len();
                        self.index.insert(key.clone(), slot);
                        let accumulators = self.new_accumulators();
                        self.groups.push((key, accumulators));
                        slot
                    }
                };
                let mut accumulators = std::mem::take(&mut self.groups[slot].1);
                let result = self.fold(&mut accumulators, &row);
                self.groups[slot].1 = accumulators;
                result?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, outputs: &mut StageOutputs) -> PipelineResult<()> {
        if let Some(group) = self.current.take() {
            self.emit(group, outputs)?;
        }
        self.index.clear();
        for group in std::mem::take(&mut self.groups) {
            self.emit(group, outputs)?;
        }

        if self.emitted == 0 && self.config.always_emit && self.group_indices.is_empty() {
            let empty = (RowKey::default(), self.new_accumulators());
            self.emit(empty, outputs)?;
        }
        tracing::debug!("Group by '{}' emitted {} groups", self.name, self.emitted);
        Ok(())
    }
}
