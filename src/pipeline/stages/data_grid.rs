//! DataGrid: a source of rows written inline in the configuration.

use crate::pipeline::error::{PipelineError, PipelineResult, StageResultExt};
use crate::pipeline::stage::RowSource;
use crate::row::{FieldDefinition, Row, RowType};
use serde::{Deserialize, Serialize};

/// Inline rows given as text, parsed with each field's type and format.
/// An empty cell is null.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataGridConfig {
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

pub struct DataGrid {
    row_type: RowType,
    rows: Vec<Row>,
    position: usize,
}

impl DataGrid {
    /// Parse every cell up front so bad data fails before the run starts.
    pub fn new(stage: &str, config: &DataGridConfig) -> PipelineResult<Self> {
        let row_type = RowType::new(config.fields.clone()).config_err(stage)?;

        let mut rows = Vec::with_capacity(config.rows.len());
        for (line, cells) in config.rows.iter().enumerate() {
            if cells.len() != row_type.len() {
                return Err(PipelineError::configuration(
                    stage,
                    format!(
                        "grid row {} has {} cells, expected {}",
                        line + 1,
                        cells.len(),
                        row_type.len()
                    ),
                ));
            }
            let values = row_type
                .fields()
                .iter()
                .zip(cells)
                .map(|(field, cell)| field.parse(cell))
                .collect::<Result<Vec<_>, _>>()
                .config_err(stage)?;
            rows.push(Row::new(values));
        }

        Ok(Self {
            row_type,
            rows,
            position: 0,
        })
    }
}

impl RowSource for DataGrid {
    fn row_type(&self) -> RowType {
        self.row_type.clone()
    }

    fn open(&mut self) -> PipelineResult<()> {
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> PipelineResult<Option<Row>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }
}
