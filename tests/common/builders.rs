//! Test data builders for creating test objects

use rowflow::pipeline::stages::DataGridConfig;
use rowflow::pipeline::{PluginConfig, StageConfig};
use rowflow::{FieldDefinition, ValueType};

/// Builder for inline DataGrid sources
pub struct GridBuilder {
    fields: Vec<FieldDefinition>,
    rows: Vec<Vec<String>>,
}

impl GridBuilder {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, value_type: ValueType) -> Self {
        self.fields.push(FieldDefinition::new(name, value_type));
        self
    }

    pub fn row(mut self, cells: &[&str]) -> Self {
        self.rows.push(cells.iter().map(|c| c.to_string()).collect());
        self
    }

    /// `count` rows of `(i, text)` for a two-field grid.
    pub fn numbered(mut self, count: usize, text: &str) -> Self {
        for i in 0..count {
            self.rows.push(vec![i.to_string(), text.to_string()]);
        }
        self
    }

    pub fn build(self) -> StageConfig {
        StageConfig::DataGrid(DataGridConfig {
            fields: self.fields,
            rows: self.rows,
        })
    }
}

/// Stage config for a plugin registered under `id`.
pub fn plugin(id: &str) -> StageConfig {
    StageConfig::Plugin(PluginConfig::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_builder() {
        let config = GridBuilder::new()
            .field("state", ValueType::String)
            .row(&["CA"])
            .build();

        let StageConfig::DataGrid(grid) = config else {
            panic!("expected a grid");
        };
        assert_eq!(grid.fields[0].name, "state");
        assert_eq!(grid.rows, vec![vec!["CA".to_string()]]);
    }
}
