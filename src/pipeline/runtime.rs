//! Per-stage driver run on each worker thread.
//!
//! A [`StageRuntime`] owns one instantiated stage. The engine calls
//! [`prepare`](StageRuntime::prepare) on its own thread in topological order,
//! then moves the runtime onto a worker and calls [`run`](StageRuntime::run).
//! Whatever the stage kind, `run` ends by signalling completion on every
//! output hop.

use crate::pipeline::error::{PipelineError, PipelineResult, StageResultExt};
use crate::pipeline::stage::{AnyStage, InputSchemas, RowSink, RowSource, StageIo};
use crate::row::RowType;
use std::time::{Duration, Instant};

/// Counters for one stage of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageStats {
    pub stage: String,
    pub rows_read: u64,
    pub rows_written: u64,
    pub elapsed: Duration,
}

pub struct StageRuntime {
    name: String,
    stage: AnyStage,
    /// Layout of the main input, used to open sinks.
    input_type: RowType,
}

impl StageRuntime {
    pub fn new(name: impl Into<String>, stage: AnyStage) -> Self {
        Self {
            name: name.into(),
            stage,
            input_type: RowType::empty(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind_name(&self) -> &'static str {
        self.stage.kind_name()
    }

    /// Resolve the stage against its input layouts and return the layout it
    /// emits. Sinks emit nothing and return an empty layout.
    pub fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        match &mut self.stage {
            AnyStage::Builtin(stage) => stage.prepare(inputs),
            AnyStage::Plugin(stage) => stage.prepare(inputs),
            AnyStage::Source(source) => {
                if !inputs.is_empty() {
                    return Err(PipelineError::InvalidHop(format!(
                        "source stage '{}' cannot receive hops",
                        self.name
                    )));
                }
                Ok(source.row_type())
            }
            AnyStage::Sink(_) => {
                self.input_type = inputs.single_main(&self.name)?;
                Ok(RowType::empty())
            }
        }
    }

    /// Drive the stage to completion on the current thread.
    pub fn run(&mut self, io: &mut StageIo) -> PipelineResult<StageStats> {
        let start = Instant::now();
        tracing::debug!("Stage '{}' ({}) started", self.name, self.stage.kind_name());

        let mut rows_written = None;
        match &mut self.stage {
            AnyStage::Builtin(stage) => stage.execute(io)?,
            AnyStage::Plugin(stage) => stage.execute(io)?,
            AnyStage::Source(source) => drain_source(&self.name, source.as_mut(), io)?,
            AnyStage::Sink(sink) => {
                rows_written = Some(fill_sink(&self.name, sink.as_mut(), &self.input_type, io)?);
            }
        }
        io.outputs.signal_done()?;

        let stats = StageStats {
            stage: self.name.clone(),
            rows_read: io.rows_read(),
            rows_written: rows_written.unwrap_or_else(|| io.outputs.rows_written()),
            elapsed: start.elapsed(),
        };
        tracing::info!(
            "Stage '{}' finished: {} rows read, {} rows written in {:?}",
            stats.stage,
            stats.rows_read,
            stats.rows_written,
            stats.elapsed
        );
        Ok(stats)
    }
}

fn drain_source(name: &str, source: &mut dyn RowSource, io: &mut StageIo) -> PipelineResult<()> {
    let row_type = source.row_type();
    source.open()?;
    while let Some(row) = source.next()? {
        row_type.check(&row).row_err(name)?;
        io.outputs.put(row)?;
    }
    source.close()
}

fn fill_sink(
    name: &str,
    sink: &mut dyn RowSink,
    row_type: &RowType,
    io: &mut StageIo,
) -> PipelineResult<u64> {
    if !io.outputs.is_empty() {
        return Err(PipelineError::InvalidHop(format!(
            "sink stage '{}' cannot send hops",
            name
        )));
    }
    sink.open(row_type)?;
    let mut written = 0;
    let mut inputs = io.main_inputs();
    while let Some((_, row)) = inputs.take_any()? {
        sink.write(&row)?;
        written += 1;
    }
    sink.close()?;
    Ok(written)
}
