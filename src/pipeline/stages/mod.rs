//! Built-in stage kinds.
//!
//! Each submodule holds one stage: its serde configuration and its
//! [`Transform`](crate::pipeline::stage::Transform) or
//! [`RowSource`](crate::pipeline::stage::RowSource) implementation.

pub mod aggregate;
pub mod constant;
pub mod data_grid;
pub mod dummy;
pub mod filter_rows;
pub mod group_by;
pub mod merge_join;
pub mod meta_structure;
pub mod stream_lookup;
pub mod switch_case;
pub mod write_to_log;

pub use aggregate::{AggregateFunction, AggregateSpec};
pub use constant::{ConstantConfig, ConstantField, ConstantStage};
pub use data_grid::{DataGrid, DataGridConfig};
pub use dummy::Dummy;
pub use filter_rows::{FilterRows, FilterRowsConfig};
pub use group_by::{GroupBy, GroupByConfig, GroupStrategy};
pub use merge_join::{JoinType, MergeJoin, MergeJoinConfig};
pub use meta_structure::{MetaStructure, MetaStructureConfig};
pub use stream_lookup::{LookupKey, LookupValue, StreamLookup, StreamLookupConfig};
pub use switch_case::{SwitchCase, SwitchCaseConfig, SwitchCaseTarget};
pub use write_to_log::{LogLevel, WriteToLog, WriteToLogConfig};

/// Helpers for driving a single transform on the test thread.
#[cfg(test)]
pub(crate) mod testing {
    use crate::pipeline::channel::{row_channel, Poison};
    use crate::pipeline::error::PipelineResult;
    use crate::pipeline::graph::HopRole;
    use crate::pipeline::id::HopId;
    use crate::pipeline::stage::{InputSchemas, StageIo, Transform};
    use crate::row::{FieldDefinition, Row, RowType, Value, ValueType};

    const CAPACITY: usize = 4096;

    /// Feed pre-filled inputs through `stage.execute` and collect what each
    /// output received. `prepare` must already have been called.
    pub(crate) fn run_transform(
        stage: &mut impl Transform,
        inputs: Vec<(&str, HopRole, Vec<Row>)>,
        outputs: &[&str],
    ) -> PipelineResult<Vec<Vec<Row>>> {
        let poison = Poison::new();
        let mut io = StageIo::new("under_test");
        let mut hop = 0u32;

        for (from, role, rows) in inputs {
            let (mut tx, rx) = row_channel(HopId(hop), CAPACITY.max(rows.len() + 1), &poison);
            hop += 1;
            for row in rows {
                tx.put(row)?;
            }
            tx.signal_done()?;
            io.attach_input(from, role, rx);
        }

        let mut receivers = Vec::new();
        for target in outputs {
            let (tx, rx) = row_channel(HopId(hop), CAPACITY, &poison);
            hop += 1;
            io.outputs.attach(*target, tx);
            receivers.push(rx);
        }

        stage.execute(&mut io)?;
        io.outputs.signal_done()?;

        let mut collected = Vec::with_capacity(receivers.len());
        for mut rx in receivers {
            let mut rows = Vec::new();
            while let Some(row) = rx.take()? {
                rows.push(row);
            }
            collected.push(rows);
        }
        Ok(collected)
    }

    /// Single-field integer rows.
    pub(crate) fn ints(values: &[i64]) -> Vec<Row> {
        values
            .iter()
            .map(|v| Row::new(vec![Value::Integer(*v)]))
            .collect()
    }

    /// One main input from `from` carrying a single integer field `id`.
    pub(crate) fn int_schema(from: &str) -> InputSchemas {
        let mut schemas = InputSchemas::new();
        schemas.add(
            from,
            HopRole::Main,
            RowType::new(vec![FieldDefinition::new("id", ValueType::Integer)]).unwrap(),
        );
        schemas
    }
}
