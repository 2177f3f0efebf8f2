//! Tracing subscriber setup.
//!
//! Libraries only emit `tracing` events; binaries and tests that want to see
//! them call [`init`] once at startup.

use crate::config::LoggingConfig;
use crate::error::{Result, RowflowError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install a global subscriber: a console `fmt` layer, plus a non-blocking
/// file layer when `config.log_file` is set.
///
/// `RUST_LOG` takes precedence over `config.filter`. The returned guard
/// flushes the file writer on drop and must outlive the run. When a global
/// subscriber is already installed nothing changes and `Ok(None)` is
/// returned.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            RowflowError::Config(format!("Invalid log filter '{}': {}", config.filter, e))
        })?,
    };

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                RowflowError::Config(format!("Log file path {:?} has no file name", path))
            })?;
            std::fs::create_dir_all(directory)?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init();

    match installed {
        Ok(()) => {
            tracing::debug!("Logging initialized");
            Ok(guard)
        }
        Err(_) => Ok(None),
    }
}
