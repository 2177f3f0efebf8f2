//! Pipeline definition files.
//!
//! A definition lists stages (a unique name plus a `kind`-tagged
//! configuration) and the hops between them:
//!
//! ```toml
//! name = "orders"
//!
//! [[stages]]
//! name = "in"
//! kind = "DataGrid"
//! fields = [{ name = "state", type = "String" }]
//! rows = [["CA"], ["NY"]]
//!
//! [[stages]]
//! name = "out"
//! kind = "Dummy"
//!
//! [[hops]]
//! from = "in"
//! to = "out"
//! ```

use crate::error::{Result, RowflowError};
use crate::pipeline::{PipelineGraph, PipelineResult, StageConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    #[serde(flatten)]
    pub config: StageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopDefinition {
    pub from: String,
    pub to: String,
    /// Carries reference data rather than the main row stream.
    #[serde(default)]
    pub info: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
    #[serde(default)]
    pub hops: Vec<HopDefinition>,
}

enum Format {
    Toml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Format::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Format::Json),
            _ => Err(RowflowError::Config(format!(
                "Pipeline definition {:?} must end in .toml or .json",
                path
            ))),
        }
    }
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn stage(mut self, name: impl Into<String>, config: StageConfig) -> Self {
        self.stages.push(StageDefinition {
            name: name.into(),
            config,
        });
        self
    }

    pub fn hop(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.hops.push(HopDefinition {
            from: from.into(),
            to: to.into(),
            info: false,
        });
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RowflowError::Serialization(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| RowflowError::Serialization(e.to_string()))
    }

    /// Load a definition, picking the format from the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            RowflowError::Config(format!("Failed to read pipeline definition {:?}: {}", path, e))
        })?;

        let definition = match format {
            Format::Toml => Self::from_toml_str(&content),
            Format::Json => Self::from_json_str(&content),
        }
        .map_err(|e| e.with_context(format!("Failed to parse pipeline definition {:?}", path)))?;

        tracing::debug!(
            "Loaded pipeline definition '{}' from {:?}: {} stages, {} hops",
            definition.name,
            path,
            definition.stages.len(),
            definition.hops.len()
        );
        Ok(definition)
    }

    /// Save a definition, picking the format from the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match Format::of(path)? {
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| RowflowError::Serialization(e.to_string()))?,
            Format::Json => serde_json::to_string_pretty(self)
                .map_err(|e| RowflowError::Serialization(e.to_string()))?,
        };
        std::fs::write(path, content).map_err(|e| {
            RowflowError::Config(format!("Failed to write pipeline definition {:?}: {}", path, e))
        })
    }

    /// Build and validate the graph this definition describes.
    pub fn into_graph(self) -> PipelineResult<PipelineGraph> {
        let mut builder = PipelineGraph::builder();
        for stage in self.stages {
            builder.add_stage(stage.name, stage.config)?;
        }
        for hop in &self.hops {
            if hop.info {
                builder.add_info_hop(&hop.from, &hop.to)?;
            } else {
                builder.add_hop(&hop.from, &hop.to)?;
            }
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use tempfile::tempdir;

    const ORDERS: &str = r#"
        name = "orders"

        [[stages]]
        name = "in"
        kind = "DataGrid"
        fields = [{ name = "state", type = "String" }, { name = "amount", type = "Integer" }]
        rows = [["CA", "10"], ["NY", "5"]]

        [[stages]]
        name = "out"
        kind = "Dummy"

        [[hops]]
        from = "in"
        to = "out"
    "#;

    #[test]
    fn test_parse_toml() {
        let definition = PipelineDefinition::from_toml_str(ORDERS).unwrap();
        assert_eq!(definition.name, "orders");
        assert_eq!(definition.stages.len(), 2);
        assert_eq!(definition.stages[1].config, StageConfig::Dummy);
        assert!(!definition.hops[0].info);

        let graph = definition.into_graph().unwrap();
        assert_eq!(graph.stats().total_stages, 2);
    }

    #[test]
    fn test_round_trip_through_files() {
        let dir = tempdir().unwrap();
        let definition = PipelineDefinition::from_toml_str(ORDERS).unwrap();

        for file in ["orders.toml", "orders.json"] {
            let path = dir.path().join(file);
            definition.save(&path).unwrap();
            assert_eq!(PipelineDefinition::load(&path).unwrap(), definition);
        }
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempdir().unwrap();
        let result = PipelineDefinition::new("x").save(dir.path().join("x.yaml"));
        assert!(matches!(result, Err(RowflowError::Config(_))));
    }

    #[test]
    fn test_cycle_in_definition() {
        let definition = PipelineDefinition::new("loop")
            .stage("a", StageConfig::Dummy)
            .stage("b", StageConfig::Dummy)
            .hop("a", "b")
            .hop("b", "a");
        assert!(matches!(definition.into_graph(), Err(PipelineError::CycleDetected)));
    }

    #[test]
    fn test_unknown_kind() {
        let result = PipelineDefinition::from_json_str(
            r#"{"stages": [{"name": "a", "kind": "Teleport"}]}"#,
        );
        assert!(matches!(result, Err(RowflowError::Serialization(_))));
    }
}
