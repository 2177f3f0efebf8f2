//! WriteToLog: logs each row and passes it on unchanged.

use crate::pipeline::channel::StageOutputs;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::stage::{InputSchemas, Transform};
use crate::row::{Row, RowType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WriteToLogConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Log at most this many rows; the rest still pass through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

pub struct WriteToLog {
    name: String,
    config: WriteToLogConfig,
    row_type: RowType,
    logged: u64,
}

impl WriteToLog {
    pub fn new(name: &str, config: WriteToLogConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            row_type: RowType::empty(),
            logged: 0,
        }
    }

    fn format_row(&self, row: &Row) -> String {
        let fields = self
            .row_type
            .field_names()
            .zip(row.values())
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ");
        match &self.config.prefix {
            Some(prefix) => format!("{} {}", prefix, fields),
            None => fields,
        }
    }
}

impl Transform for WriteToLog {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        self.row_type = inputs.single_main(&self.name)?;
        Ok(self.row_type.clone())
    }

    fn process_row(&mut self, row: Row, outputs: &mut StageOutputs) -> PipelineResult<()> {
        if self.config.limit.map_or(true, |limit| self.logged < limit) {
            self.logged += 1;
            let line = self.format_row(&row);
            let stage = &self.name;
            match self.config.level {
                LogLevel::Error => tracing::error!("[{}] {}", stage, line),
                LogLevel::Warn => tracing::warn!("[{}] {}", stage, line),
                LogLevel::Info => tracing::info!("[{}] {}", stage, line),
                LogLevel::Debug => tracing::debug!("[{}] {}", stage, line),
                LogLevel::Trace => tracing::trace!("[{}] {}", stage, line),
            }
        }
        outputs.put(row)
    }
}
