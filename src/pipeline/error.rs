//! Pipeline-specific error types.

use crate::pipeline::executor::RunState;
use crate::pipeline::id::HopId;
use thiserror::Error;

/// Errors raised while building, preparing or running a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Cycle detected in pipeline graph")]
    CycleDetected,

    #[error("Invalid hop: {0}")]
    InvalidHop(String),

    #[error("Stage '{stage}' routes to '{target}' but has no hop to it")]
    MissingTarget { stage: String, target: String },

    #[error("Stage '{stage}' has a hop to '{target}' that none of its targets name")]
    UnexpectedTarget { stage: String, target: String },

    #[error("Configuration error in stage '{stage}': {message}")]
    Configuration { stage: String, message: String },

    #[error("Stage '{stage}' failed: {message}")]
    RowProcessing { stage: String, message: String },

    #[error("Row channel poisoned")]
    ChannelPoisoned,

    #[error("Row put on {0:?} after end of stream")]
    ChannelClosed(HopId),

    #[error("Pipeline cannot run from state {0}")]
    InvalidState(RunState),

    #[error("Failed to spawn worker for stage '{stage}': {source}")]
    WorkerSpawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The graph itself is malformed. Raised before anything runs.
    GraphValidation,
    /// A stage's configuration is inconsistent with its inputs.
    Configuration,
    /// A stage failed while handling rows.
    RowProcessing,
    /// Engine plumbing: poisoned channels, invalid lifecycle calls.
    Internal,
}

impl PipelineError {
    pub fn configuration(stage: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Configuration {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn row_processing(stage: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::RowProcessing {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::DuplicateStage(_)
            | PipelineError::UnknownStage(_)
            | PipelineError::CycleDetected
            | PipelineError::InvalidHop(_)
            | PipelineError::MissingTarget { .. }
            | PipelineError::UnexpectedTarget { .. } => ErrorKind::GraphValidation,
            PipelineError::Configuration { .. } => ErrorKind::Configuration,
            PipelineError::RowProcessing { .. } => ErrorKind::RowProcessing,
            PipelineError::ChannelPoisoned
            | PipelineError::ChannelClosed(_)
            | PipelineError::InvalidState(_)
            | PipelineError::WorkerSpawn { .. } => ErrorKind::Internal,
        }
    }

    /// Whether this error only reports that another stage already failed.
    pub fn is_poisoned(&self) -> bool {
        matches!(self, PipelineError::ChannelPoisoned)
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Attaches a stage name to foreign errors.
pub trait StageResultExt<T> {
    /// Report the error as a configuration problem of `stage`.
    fn config_err(self, stage: &str) -> PipelineResult<T>;

    /// Report the error as a row-processing failure of `stage`.
    fn row_err(self, stage: &str) -> PipelineResult<T>;
}

impl<T, E: std::fmt::Display> StageResultExt<T> for std::result::Result<T, E> {
    fn config_err(self, stage: &str) -> PipelineResult<T> {
        self.map_err(|e| PipelineError::configuration(stage, e.to_string()))
    }

    fn row_err(self, stage: &str) -> PipelineResult<T> {
        self.map_err(|e| PipelineError::row_processing(stage, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowError;

    #[test]
    fn test_error_kinds() {
        assert_eq!(PipelineError::CycleDetected.kind(), ErrorKind::GraphValidation);
        assert_eq!(
            PipelineError::configuration("s", "bad").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            PipelineError::row_processing("s", "bad").kind(),
            ErrorKind::RowProcessing
        );
        assert_eq!(PipelineError::ChannelPoisoned.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_stage_result_ext() {
        let result: Result<(), RowError> = Err(RowError::UnknownField("state".into()));
        let err = result.config_err("lookup").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error in stage 'lookup': unknown field 'state'"
        );
    }
}
