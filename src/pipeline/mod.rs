//! Stage-graph pipeline engine.
//!
//! Rows flow through named stages connected by hops. Every stage runs on its
//! own thread and every hop is a bounded channel, so a slow consumer throttles
//! its producers all the way back to the sources.
//!
//! # Architecture
//!
//! ```text
//! [DataGrid] ──► [FilterRows] ──► [GroupBy] ──► [sink]
//!                            └──► [Dummy]
//! [customers] ──► [MergeJoin] ◄── [states]
//! ```
//!
//! # Design
//!
//! - **Enum dispatch for built-ins**: `BuiltinStage` covers every built-in
//!   transform, plugins come in as trait objects through `AnyStage`.
//! - **Shared immutable rows**: fanning out a row clones a pointer.
//! - **Explicit end of stream**: hops carry a done marker, so a dead producer
//!   is never mistaken for a finished one.
//! - **Run-wide poisoning**: the first failure unblocks and stops every
//!   worker.

pub mod channel;
pub mod compiled_plan;
pub mod compiler;
pub mod condition;
pub mod error;
pub mod executor;
pub mod graph;
pub mod id;
pub mod registry;
pub mod runtime;
pub mod stage;
pub mod stage_config;
pub mod stages;

pub use channel::{row_channel, InputSet, Poison, RowReceiver, RowSender, StageOutputs};
pub use compiled_plan::{CompiledPlan, PlanStats};
pub use condition::{BoundCondition, Condition, ConditionFunction, Operand};
pub use error::{ErrorKind, PipelineError, PipelineResult, StageResultExt};
pub use executor::{Pipeline, RunReport, RunState};
pub use graph::{Hop, HopRole, PipelineGraph, PipelineGraphBuilder, StageDef};
pub use id::{HopId, StageId};
pub use registry::{PluginRequest, PluginStage, StageRegistry};
pub use runtime::StageStats;
pub use stage::{AnyStage, InputSchemas, RowSink, RowSource, StageIo, Transform};
pub use stage_config::{PluginConfig, StageConfig};
