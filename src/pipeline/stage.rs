//! Stage abstraction for the pipeline.
//!
//! Three traits cover what a stage can be:
//! - **`RowSource`**: produces rows, no inputs.
//! - **`RowSink`**: consumes rows, no outputs.
//! - **`Transform`**: reads input hops and writes output hops.
//!
//! Built-in transforms are dispatched through the **`BuiltinStage`** enum; the
//! compiler can inline match arms and no boxing happens per stage. Plugins
//! registered at runtime come in as trait objects. `AnyStage` wraps both so the
//! runtime drives them uniformly.

use crate::pipeline::channel::{InputSet, RowReceiver, StageOutputs};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph::HopRole;
use crate::pipeline::stages::{
    ConstantStage, Dummy, FilterRows, GroupBy, MergeJoin, MetaStructure, StreamLookup,
    SwitchCase, WriteToLog,
};
use crate::row::{Row, RowType};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Row layouts arriving at a stage, per upstream stage.
#[derive(Debug, Clone, Default)]
pub struct InputSchemas {
    main: Vec<(String, RowType)>,
    info: Vec<(String, RowType)>,
}

impl InputSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, from: impl Into<String>, role: HopRole, row_type: RowType) {
        match role {
            HopRole::Main => self.main.push((from.into(), row_type)),
            HopRole::Info => self.info.push((from.into(), row_type)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.info.is_empty()
    }

    pub fn main(&self) -> &[(String, RowType)] {
        &self.main
    }

    /// Layout of a main input by upstream stage name.
    pub fn main_from(&self, stage: &str) -> Option<&RowType> {
        self.main.iter().find(|(s, _)| s == stage).map(|(_, t)| t)
    }

    /// Layout of an info input by upstream stage name.
    pub fn info_from(&self, stage: &str) -> Option<&RowType> {
        self.info.iter().find(|(s, _)| s == stage).map(|(_, t)| t)
    }

    /// The one layout shared by all main inputs.
    ///
    /// Stages without main inputs see an empty layout. Merging streams with
    /// different layouts is a configuration error.
    pub fn single_main(&self, stage: &str) -> PipelineResult<RowType> {
        let Some((first_name, first)) = self.main.first() else {
            return Ok(RowType::empty());
        };
        if let Some((other_name, _)) = self
            .main
            .iter()
            .skip(1)
            .find(|(_, t)| !t.is_compatible_with(first))
        {
            return Err(PipelineError::configuration(
                stage,
                format!(
                    "inputs from '{}' and '{}' have different row layouts",
                    first_name, other_name
                ),
            ));
        }
        Ok(first.clone())
    }
}

/// Channel ends handed to a stage worker.
pub struct StageIo {
    stage: String,
    main: Vec<(String, RowReceiver)>,
    info: Vec<(String, RowReceiver)>,
    rows_read: Arc<AtomicU64>,
    pub outputs: StageOutputs,
}

impl StageIo {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            main: Vec::new(),
            info: Vec::new(),
            rows_read: Arc::new(AtomicU64::new(0)),
            outputs: StageOutputs::new(),
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub(crate) fn attach_input(&mut self, from: impl Into<String>, role: HopRole, mut rx: RowReceiver) {
        rx.count_into(self.rows_read.clone());
        match role {
            HopRole::Main => self.main.push((from.into(), rx)),
            HopRole::Info => self.info.push((from.into(), rx)),
        }
    }

    /// Take every main input receiver, in hop order.
    pub fn take_main(&mut self) -> Vec<RowReceiver> {
        std::mem::take(&mut self.main)
            .into_iter()
            .map(|(_, rx)| rx)
            .collect()
    }

    /// Take every main input as one arrival-ordered set.
    pub fn main_inputs(&mut self) -> InputSet {
        InputSet::new(self.take_main())
    }

    /// Take the input (main or info) coming from `from`.
    pub fn take_input(&mut self, from: &str) -> Option<RowReceiver> {
        if let Some(pos) = self.main.iter().position(|(s, _)| s == from) {
            return Some(self.main.remove(pos).1);
        }
        self.take_info(from)
    }

    pub fn take_info(&mut self, from: &str) -> Option<RowReceiver> {
        let pos = self.info.iter().position(|(s, _)| s == from)?;
        Some(self.info.remove(pos).1)
    }

    /// Like [`take_input`](Self::take_input), failing with a configuration
    /// error when the hop is missing.
    pub fn require_input(&mut self, from: &str) -> PipelineResult<RowReceiver> {
        let stage = self.stage.clone();
        self.take_input(from).ok_or_else(|| {
            PipelineError::configuration(stage, format!("no input hop from '{}'", from))
        })
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// A stage that reads hops and writes hops.
///
/// `prepare` runs once on the engine thread before any worker starts; it sees
/// the layouts of all inputs and returns the layout of the rows it emits.
/// `execute` then runs on the stage's own worker. The default loop reads the
/// main inputs in arrival order, calling [`process_row`](Self::process_row)
/// per row and [`finish`](Self::finish) at end of stream.
pub trait Transform: Send {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType>;

    fn execute(&mut self, io: &mut StageIo) -> PipelineResult<()> {
        let mut inputs = io.main_inputs();
        while let Some((_, row)) = inputs.take_any()? {
            self.process_row(row, &mut io.outputs)?;
        }
        self.finish(&mut io.outputs)
    }

    fn process_row(&mut self, _row: Row, _outputs: &mut StageOutputs) -> PipelineResult<()> {
        Ok(())
    }

    /// Emit anything buffered. Completion is signalled by the runtime.
    fn finish(&mut self, _outputs: &mut StageOutputs) -> PipelineResult<()> {
        Ok(())
    }
}

/// Where rows enter a pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait RowSource: Send {
    /// Layout of every row this source yields.
    fn row_type(&self) -> RowType;

    fn open(&mut self) -> PipelineResult<()> {
        Ok(())
    }

    /// Next row, `None` when exhausted.
    fn next(&mut self) -> PipelineResult<Option<Row>>;

    fn close(&mut self) -> PipelineResult<()> {
        Ok(())
    }
}

/// Where rows leave a pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait RowSink: Send {
    fn open(&mut self, _row_type: &RowType) -> PipelineResult<()> {
        Ok(())
    }

    fn write(&mut self, row: &Row) -> PipelineResult<()>;

    /// Called once after the last row. Not called when the run fails.
    fn close(&mut self) -> PipelineResult<()> {
        Ok(())
    }
}

/// Enum dispatch for built-in transforms.
pub enum BuiltinStage {
    Dummy(Dummy),
    Constant(ConstantStage),
    FilterRows(FilterRows),
    SwitchCase(SwitchCase),
    MergeJoin(MergeJoin),
    StreamLookup(StreamLookup),
    GroupBy(GroupBy),
    WriteToLog(WriteToLog),
    MetaStructure(MetaStructure),
}

impl BuiltinStage {
    pub fn kind_name(&self) -> &'static str {
        match self {
            BuiltinStage::Dummy(_) => "Dummy",
            BuiltinStage::Constant(_) => "Constant",
            BuiltinStage::FilterRows(_) => "FilterRows",
            BuiltinStage::SwitchCase(_) => "SwitchCase",
            BuiltinStage::MergeJoin(_) => "MergeJoin",
            BuiltinStage::StreamLookup(_) => "StreamLookup",
            BuiltinStage::GroupBy(_) => "GroupBy",
            BuiltinStage::WriteToLog(_) => "WriteToLog",
            BuiltinStage::MetaStructure(_) => "MetaStructure",
        }
    }

    pub fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        match self {
            BuiltinStage::Dummy(s) => s.prepare(inputs),
            BuiltinStage::Constant(s) => s.prepare(inputs),
            BuiltinStage::FilterRows(s) => s.prepare(inputs),
            BuiltinStage::SwitchCase(s) => s.prepare(inputs),
            BuiltinStage::MergeJoin(s) => s.prepare(inputs),
            BuiltinStage::StreamLookup(s) => s.prepare(inputs),
            BuiltinStage::GroupBy(s) => s.prepare(inputs),
            BuiltinStage::WriteToLog(s) => s.prepare(inputs),
            BuiltinStage::MetaStructure(s) => s.prepare(inputs),
        }
    }

    pub fn execute(&mut self, io: &mut StageIo) -> PipelineResult<()> {
        match self {
            BuiltinStage::Dummy(s) => s.execute(io),
            BuiltinStage::Constant(s) => s.execute(io),
            BuiltinStage::FilterRows(s) => s.execute(io),
            BuiltinStage::SwitchCase(s) => s.execute(io),
            BuiltinStage::MergeJoin(s) => s.execute(io),
            BuiltinStage::StreamLookup(s) => s.execute(io),
            BuiltinStage::GroupBy(s) => s.execute(io),
            BuiltinStage::WriteToLog(s) => s.execute(io),
            BuiltinStage::MetaStructure(s) => s.execute(io),
        }
    }
}

/// Any stage: a built-in transform, an adapter, or a plugin transform.
pub enum AnyStage {
    Builtin(BuiltinStage),
    Source(Box<dyn RowSource>),
    Sink(Box<dyn RowSink>),
    Plugin(Box<dyn Transform>),
}

impl AnyStage {
    pub fn kind_name(&self) -> &'static str {
        match self {
            AnyStage::Builtin(b) => b.kind_name(),
            AnyStage::Source(_) => "Source",
            AnyStage::Sink(_) => "Sink",
            AnyStage::Plugin(_) => "Plugin",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, AnyStage::Source(_))
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, AnyStage::Sink(_))
    }
}
