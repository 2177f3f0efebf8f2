//! Configuration module for rowflow
//!
//! Two kinds of files are read from disk:
//! - Engine settings ([`EngineConfig`]): channel sizing and logging, in TOML.
//! - Pipeline definitions ([`PipelineDefinition`]): stages and hops, in TOML
//!   or JSON depending on the file extension.
//!
//! # Example
//!
//! ```ignore
//! use rowflow::config::{EngineConfig, PipelineDefinition};
//! use rowflow::pipeline::{Pipeline, StageRegistry};
//!
//! let config = EngineConfig::load_or_default("rowflow.toml");
//! let graph = PipelineDefinition::load("orders.toml")?.into_graph()?;
//! let report = Pipeline::new(graph, config).run(&StageRegistry::new())?;
//! ```

pub mod definition;

pub use definition::{HopDefinition, PipelineDefinition, StageDefinition};

use crate::error::{Result, RowflowError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of rows per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default channel capacity, in batches
pub const DEFAULT_CHANNEL_BATCHES: usize = 2;

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,rowflow=debug";

/// Engine settings shared by every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows per batch; the unit channel capacity is measured in
    pub batch_size: usize,

    /// How many batches each hop buffers before its producer blocks
    pub channel_batches: usize,

    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            channel_batches: DEFAULT_CHANNEL_BATCHES,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Capacity of every hop channel, in rows. Never zero.
    pub fn channel_capacity(&self) -> usize {
        self.batch_size.saturating_mul(self.channel_batches).max(1)
    }

    /// Load engine settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RowflowError::Config(format!("Failed to read engine config {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            RowflowError::Config(format!("Failed to parse engine config {:?}: {}", path, e))
        })
    }

    /// Load engine settings, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load engine config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save engine settings as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RowflowError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            RowflowError::Serialization(format!("Failed to serialize engine config: {}", e))
        })?;

        std::fs::write(path, content).map_err(|e| {
            RowflowError::Config(format!("Failed to write engine config {:?}: {}", path, e))
        })
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is not set
    pub filter: String,

    /// Also write logs to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
        }
    }
}
