//! # rowflow: metadata-driven row pipelines
//!
//! A pipeline is a directed acyclic graph of named stages. Sources emit typed
//! rows, transforms filter, route, join, look up and aggregate them, and sinks
//! consume them. Stages are described by serializable configurations, so a
//! whole pipeline can be loaded from a TOML or JSON definition file.
//!
//! ## Architecture
//!
//! - **Row model** (`row`): typed values, row layouts, immutable shared rows
//! - **Engine** (`pipeline`): graph validation, one worker thread per stage,
//!   bounded channels per hop, run-wide failure propagation
//! - **Adapters** (`adapters`): in-memory sources and sinks
//! - **Configuration** (`config`): engine settings and pipeline definitions
//!
//! ## Example
//!
//! ```ignore
//! use rowflow::{
//!     config::{EngineConfig, PipelineDefinition},
//!     pipeline::{Pipeline, StageRegistry},
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::load_or_default("rowflow.toml");
//!     let _guard = rowflow::logging::init(&config.logging)?;
//!
//!     let mut registry = StageRegistry::new();
//!     let output = registry.register_memory_sink("collect");
//!
//!     let graph = PipelineDefinition::load("orders.toml")?.into_graph()?;
//!     let report = Pipeline::new(graph, config).run(&registry)?;
//!
//!     for row in output.rows() {
//!         println!("{:?}", row);
//!     }
//!     println!("done in {:?}", report.elapsed);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod row;

// Re-export commonly used types
pub use adapters::{MemorySink, MemorySinkHandle, MemorySource};
pub use config::{EngineConfig, PipelineDefinition};
pub use error::{Result, RowflowError};
pub use pipeline::{Pipeline, PipelineError, PipelineGraph, RunReport, StageConfig, StageRegistry};
pub use row::{FieldDefinition, Row, RowType, Value, ValueType};
