//! Error handling for rowflow
//!
//! Pipeline construction and execution report [`PipelineError`]. This module
//! wraps it together with the errors of loading configuration and pipeline
//! definitions from disk.

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Errors outside the engine itself: files, formats, and engine errors
/// surfaced through them.
#[derive(Error, Debug)]
pub enum RowflowError {
    /// Bad engine settings or an unreadable definition file
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML or JSON that does not match the expected shape
    #[error("Malformed document: {0}")]
    Serialization(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// An error wrapped with what was being attempted
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RowflowError>,
    },
}

impl RowflowError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RowflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The pipeline error underneath any context layers.
    pub fn as_pipeline(&self) -> Option<&PipelineError> {
        match self {
            RowflowError::Pipeline(e) => Some(e),
            RowflowError::WithContext { source, .. } => source.as_pipeline(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RowflowError>;

/// Attach a description of the failed step to an error result.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`], building the message only on error.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| RowflowError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| RowflowError::from(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_message() {
        let err = RowflowError::Config("missing stages".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: missing stages");
    }

    #[test]
    fn test_context_layers_nest() {
        let err = RowflowError::Serialization("bad toml".to_string())
            .with_context("Parsing stages")
            .with_context("Loading orders.toml");
        assert_eq!(
            err.to_string(),
            "Loading orders.toml: Parsing stages: Malformed document: bad toml"
        );
        assert!(err.as_pipeline().is_none());
    }

    #[test]
    fn test_pipeline_error_context() {
        let result: std::result::Result<(), PipelineError> = Err(PipelineError::CycleDetected);
        let err = result.context("Building graph").unwrap_err();
        assert_eq!(err.to_string(), "Building graph: Cycle detected in pipeline graph");
        assert!(matches!(err.as_pipeline(), Some(PipelineError::CycleDetected)));
    }
}
