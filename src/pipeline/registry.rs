//! Stage factory: turns stage definitions into runnable stages.
//!
//! Built-in kinds are created directly from their [`StageConfig`]. Stages of
//! kind `Plugin` are looked up by `plugin_id` among factories registered by
//! the caller, which is also how callers plug in their own sources and sinks.

use crate::adapters::{MemorySink, MemorySinkHandle, MemorySource};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph::StageDef;
use crate::pipeline::stage::{AnyStage, BuiltinStage, RowSink, RowSource, Transform};
use crate::pipeline::stage_config::StageConfig;
use crate::pipeline::stages::{
    ConstantStage, DataGrid, Dummy, FilterRows, GroupBy, MergeJoin, MetaStructure, StreamLookup,
    SwitchCase, WriteToLog,
};
use crate::row::{Row, RowType};
use std::collections::HashMap;

/// What a plugin factory is asked to build.
#[derive(Debug, Clone, Copy)]
pub struct PluginRequest<'a> {
    /// Name of the stage in the graph.
    pub stage: &'a str,
    pub plugin_id: &'a str,
    pub properties: &'a serde_json::Value,
}

/// A stage built by a plugin factory.
pub enum PluginStage {
    Source(Box<dyn RowSource>),
    Sink(Box<dyn RowSink>),
    Transform(Box<dyn Transform>),
}

impl From<PluginStage> for AnyStage {
    fn from(stage: PluginStage) -> Self {
        match stage {
            PluginStage::Source(s) => AnyStage::Source(s),
            PluginStage::Sink(s) => AnyStage::Sink(s),
            PluginStage::Transform(t) => AnyStage::Plugin(t),
        }
    }
}

type PluginFactory = Box<dyn Fn(&PluginRequest<'_>) -> anyhow::Result<PluginStage> + Send + Sync>;

#[derive(Default)]
pub struct StageRegistry {
    plugins: HashMap<String, PluginFactory>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `plugin_id`, replacing any previous one.
    pub fn register<F>(&mut self, plugin_id: impl Into<String>, factory: F)
    where
        F: Fn(&PluginRequest<'_>) -> anyhow::Result<PluginStage> + Send + Sync + 'static,
    {
        let plugin_id = plugin_id.into();
        if self.plugins.insert(plugin_id.clone(), Box::new(factory)).is_some() {
            tracing::warn!("Plugin '{}' registered twice, keeping the latest", plugin_id);
        }
    }

    /// Register a source that replays `rows` each time it is created.
    pub fn register_memory_source(
        &mut self,
        plugin_id: impl Into<String>,
        row_type: RowType,
        rows: Vec<Row>,
    ) {
        self.register(plugin_id, move |_| {
            Ok(PluginStage::Source(Box::new(MemorySource::new(
                row_type.clone(),
                rows.clone(),
            ))))
        });
    }

    /// Register a collecting sink and return the handle to read it back.
    pub fn register_memory_sink(&mut self, plugin_id: impl Into<String>) -> MemorySinkHandle {
        let handle = MemorySinkHandle::default();
        let shared = handle.clone();
        self.register(plugin_id, move |_| {
            Ok(PluginStage::Sink(Box::new(MemorySink::with_handle(shared.clone()))))
        });
        handle
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    /// Instantiate the stage described by `def`.
    pub fn create(&self, def: &StageDef) -> PipelineResult<AnyStage> {
        let name = def.name.as_str();
        let builtin = match &def.config {
            StageConfig::DataGrid(c) => return Ok(AnyStage::Source(Box::new(DataGrid::new(name, c)?))),
            StageConfig::Plugin(c) => {
                let factory = self.plugins.get(&c.plugin_id).ok_or_else(|| {
                    PipelineError::configuration(
                        name,
                        format!("no plugin registered as '{}'", c.plugin_id),
                    )
                })?;
                let request = PluginRequest {
                    stage: name,
                    plugin_id: &c.plugin_id,
                    properties: &c.properties,
                };
                let stage = factory(&request)
                    .map_err(|e| PipelineError::configuration(name, format!("{:#}", e)))?;
                return Ok(stage.into());
            }
            StageConfig::Dummy => BuiltinStage::Dummy(Dummy::new(name)),
            StageConfig::Constant(c) => BuiltinStage::Constant(ConstantStage::new(name, c.clone())),
            StageConfig::FilterRows(c) => BuiltinStage::FilterRows(FilterRows::new(name, c.clone())),
            StageConfig::SwitchCase(c) => BuiltinStage::SwitchCase(SwitchCase::new(name, c.clone())),
            StageConfig::MergeJoin(c) => BuiltinStage::MergeJoin(MergeJoin::new(name, c.clone())),
            StageConfig::StreamLookup(c) => {
                BuiltinStage::StreamLookup(StreamLookup::new(name, c.clone()))
            }
            StageConfig::GroupBy(c) => BuiltinStage::GroupBy(GroupBy::new(name, c.clone())),
            StageConfig::WriteToLog(c) => BuiltinStage::WriteToLog(WriteToLog::new(name, c.clone())),
            StageConfig::MetaStructure(c) => {
                BuiltinStage::MetaStructure(MetaStructure::new(name, c.clone()))
            }
        };
        Ok(AnyStage::Builtin(builtin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::StageId;
    use crate::pipeline::stage_config::PluginConfig;

    fn def(name: &str, config: StageConfig) -> StageDef {
        StageDef {
            id: StageId(0),
            name: name.to_string(),
            config,
        }
    }

    #[test]
    fn test_create_builtins() {
        let registry = StageRegistry::new();
        let stage = registry.create(&def("d", StageConfig::Dummy)).unwrap();
        assert_eq!(stage.kind_name(), "Dummy");

        let grid = registry
            .create(&def("g", StageConfig::DataGrid(Default::default())))
            .unwrap();
        assert!(grid.is_source());
    }

    #[test]
    fn test_unknown_plugin() {
        let registry = StageRegistry::new();
        let result = registry.create(&def("p", StageConfig::Plugin(PluginConfig::new("nope"))));
        assert!(matches!(result, Err(PipelineError::Configuration { stage, .. }) if stage == "p"));
    }

    #[test]
    fn test_plugin_factory_sees_request() {
        let mut registry = StageRegistry::new();
        registry.register("check", |request| {
            anyhow::ensure!(request.stage == "p", "wrong stage {}", request.stage);
            anyhow::ensure!(request.properties["limit"] == 3, "missing limit");
            Ok(PluginStage::Transform(Box::new(Dummy::new(request.stage))))
        });
        assert!(registry.contains("check"));

        let config = PluginConfig::new("check").with_properties(serde_json::json!({ "limit": 3 }));
        let stage = registry.create(&def("p", StageConfig::Plugin(config))).unwrap();
        assert_eq!(stage.kind_name(), "Plugin");
    }

    #[test]
    fn test_plugin_factory_error_is_configuration() {
        let mut registry = StageRegistry::new();
        registry.register("broken", |_| anyhow::bail!("cannot connect"));
        let err = registry
            .create(&def("p", StageConfig::Plugin(PluginConfig::new("broken"))))
            .err()
            .unwrap();
        assert!(err.to_string().contains("cannot connect"));
    }

    #[test]
    fn test_memory_sink_registration() {
        let mut registry = StageRegistry::new();
        let handle = registry.register_memory_sink("out");
        let stage = registry
            .create(&def("out", StageConfig::Plugin(PluginConfig::new("out"))))
            .unwrap();
        assert!(stage.is_sink());
        assert!(handle.is_empty());
    }
}
