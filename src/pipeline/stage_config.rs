//! Serializable stage configurations.
//!
//! A [`StageConfig`] is everything a pipeline definition says about one stage.
//! The graph uses it for validation (which hops a stage needs, which targets it
//! routes to); the [`StageRegistry`](crate::pipeline::registry::StageRegistry)
//! turns it into a runnable stage.

use crate::pipeline::stages::{
    ConstantConfig, DataGridConfig, FilterRowsConfig, GroupByConfig, MergeJoinConfig,
    MetaStructureConfig, StreamLookupConfig, SwitchCaseConfig, WriteToLogConfig,
};
use serde::{Deserialize, Serialize};

/// A stage implemented outside the crate, created by a registered factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub plugin_id: String,
    /// Opaque settings handed to the factory.
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl PluginConfig {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            properties: serde_json::Value::Null,
        }
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StageConfig {
    DataGrid(DataGridConfig),
    Dummy,
    Constant(ConstantConfig),
    FilterRows(FilterRowsConfig),
    SwitchCase(SwitchCaseConfig),
    MergeJoin(MergeJoinConfig),
    StreamLookup(StreamLookupConfig),
    GroupBy(GroupByConfig),
    WriteToLog(WriteToLogConfig),
    MetaStructure(MetaStructureConfig),
    Plugin(PluginConfig),
}

impl StageConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StageConfig::DataGrid(_) => "DataGrid",
            StageConfig::Dummy => "Dummy",
            StageConfig::Constant(_) => "Constant",
            StageConfig::FilterRows(_) => "FilterRows",
            StageConfig::SwitchCase(_) => "SwitchCase",
            StageConfig::MergeJoin(_) => "MergeJoin",
            StageConfig::StreamLookup(_) => "StreamLookup",
            StageConfig::GroupBy(_) => "GroupBy",
            StageConfig::WriteToLog(_) => "WriteToLog",
            StageConfig::MetaStructure(_) => "MetaStructure",
            StageConfig::Plugin(_) => "Plugin",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StageConfig::DataGrid(_) => "Data Grid",
            StageConfig::Dummy => "Dummy",
            StageConfig::Constant(_) => "Add Constants",
            StageConfig::FilterRows(_) => "Filter Rows",
            StageConfig::SwitchCase(_) => "Switch / Case",
            StageConfig::MergeJoin(_) => "Merge Join",
            StageConfig::StreamLookup(_) => "Stream Lookup",
            StageConfig::GroupBy(_) => "Group By",
            StageConfig::WriteToLog(_) => "Write to Log",
            StageConfig::MetaStructure(_) => "Metadata Structure",
            StageConfig::Plugin(_) => "Plugin",
        }
    }

    /// Built-in sources never accept incoming hops. Plugins are checked
    /// once the registry has created them.
    pub fn is_source(&self) -> bool {
        matches!(self, StageConfig::DataGrid(_))
    }

    pub fn accepts_info_hops(&self) -> bool {
        matches!(
            self,
            StageConfig::StreamLookup(_) | StageConfig::MergeJoin(_) | StageConfig::Plugin(_)
        )
    }

    /// Upstream stages whose hops into this stage carry reference data.
    pub fn info_sources(&self) -> Vec<&str> {
        match self {
            StageConfig::StreamLookup(c) => vec![c.lookup_stage.as_str()],
            _ => Vec::new(),
        }
    }

    /// Upstream stages this configuration reads by name.
    pub fn referenced_inputs(&self) -> Vec<&str> {
        match self {
            StageConfig::MergeJoin(c) => vec![c.left_stage.as_str(), c.right_stage.as_str()],
            StageConfig::StreamLookup(c) => vec![c.lookup_stage.as_str()],
            _ => Vec::new(),
        }
    }

    /// Downstream stages this configuration routes to by name.
    pub fn declared_targets(&self) -> Vec<&str> {
        match self {
            StageConfig::SwitchCase(c) => c.targets(),
            StageConfig::FilterRows(c) => c.targets(),
            _ => Vec::new(),
        }
    }

    /// Whether every output hop must be a declared target.
    pub fn routes_exclusively(&self) -> bool {
        match self {
            StageConfig::SwitchCase(_) => true,
            StageConfig::FilterRows(c) => c.has_targets(),
            _ => false,
        }
    }
}

impl std::fmt::Display for StageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
