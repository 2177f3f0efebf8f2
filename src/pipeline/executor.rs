//! Pipeline executor: one worker thread per stage.
//!
//! A run goes through three phases:
//! 1. **Prepare.** On the calling thread, every stage is created through the
//!    registry and prepared in topological order, so each stage sees the
//!    row layouts its upstreams emit. Any error here fails the run before a
//!    single thread starts.
//! 2. **Wire.** Each hop becomes a bounded channel; all channels share one
//!    [`Poison`] switch.
//! 3. **Execute.** Each stage runs on its own named thread. Workers report
//!    back over an exit channel. The first real failure trips the poison
//!    switch, which wakes every blocked worker so the whole run unwinds;
//!    failures caused by the poisoning itself are discarded.
//!
//! ```text
//!   caller ─ run() ─► prepare ─► wire ─► spawn ─┬─► stage worker ─┐
//!                                               ├─► stage worker ─┼─► exits ─► RunReport
//!                                               └─► stage worker ─┘
//! ```

use crate::config::EngineConfig;
use crate::pipeline::channel::{row_channel, Poison};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph::PipelineGraph;
use crate::pipeline::registry::StageRegistry;
use crate::pipeline::runtime::{StageRuntime, StageStats};
use crate::pipeline::stage::{InputSchemas, StageIo};
use crate::row::RowType;
use crossbeam_channel::unbounded;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lifecycle of a [`Pipeline`]. A pipeline runs at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Built,
    Running,
    Finished,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Built => "Built",
            RunState::Running => "Running",
            RunState::Finished => "Finished",
            RunState::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    /// Per-stage counters, in topological order.
    pub stages: Vec<StageStats>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn stage(&self, name: &str) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

struct WorkerExit {
    index: usize,
    result: PipelineResult<StageStats>,
}

pub struct Pipeline {
    graph: PipelineGraph,
    config: EngineConfig,
    state: RunState,
}

impl Pipeline {
    pub fn new(graph: PipelineGraph, config: EngineConfig) -> Self {
        Self {
            graph,
            config,
            state: RunState::Built,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the pipeline to completion, blocking the calling thread.
    ///
    /// Fails with the first stage error when any stage fails; the state is
    /// then [`RunState::Failed`].
    pub fn run(&mut self, registry: &StageRegistry) -> PipelineResult<RunReport> {
        if self.state != RunState::Built {
            return Err(PipelineError::InvalidState(self.state));
        }
        self.state = RunState::Running;

        let stats = self.graph.stats();
        tracing::info!(
            "Running pipeline: {} stages, {} hops ({} info), {} sources, {} sinks, channel capacity {}",
            stats.total_stages,
            stats.total_hops,
            stats.info_hops,
            stats.source_stages,
            stats.sink_stages,
            self.config.channel_capacity()
        );

        let start = Instant::now();
        let result = self.prepare(registry).and_then(|runtimes| self.execute(runtimes));
        match result {
            Ok(stages) => {
                self.state = RunState::Finished;
                let elapsed = start.elapsed();
                tracing::info!("Pipeline finished in {:?}", elapsed);
                Ok(RunReport {
                    state: self.state,
                    stages,
                    elapsed,
                })
            }
            Err(e) => {
                self.state = RunState::Failed;
                tracing::error!("Pipeline failed: {}", e);
                Err(e)
            }
        }
    }

    /// Create and prepare every stage. Returns runtimes indexed by stage id.
    fn prepare(&self, registry: &StageRegistry) -> PipelineResult<Vec<StageRuntime>> {
        let count = self.graph.stages().len();
        let mut runtimes: Vec<Option<StageRuntime>> = (0..count).map(|_| None).collect();
        let mut output_types: Vec<Option<RowType>> = vec![None; count];

        for &id in self.graph.topological_order() {
            let def = &self.graph.stages()[id.index()];
            let stage = registry.create(def)?;

            if stage.is_sink() && self.graph.outputs_of(id).next().is_some() {
                return Err(PipelineError::InvalidHop(format!(
                    "sink stage '{}' cannot send hops",
                    def.name
                )));
            }

            let mut schemas = InputSchemas::new();
            for hop in self.graph.inputs_of(id) {
                let upstream = &self.graph.stages()[hop.from.index()];
                let row_type = output_types[hop.from.index()].clone().ok_or_else(|| {
                    PipelineError::InvalidHop(format!(
                        "stage '{}' prepared before its upstream '{}'",
                        def.name, upstream.name
                    ))
                })?;
                schemas.add(upstream.name.clone(), hop.role, row_type);
            }

            let mut runtime = StageRuntime::new(def.name.clone(), stage);
            let output = runtime.prepare(&schemas)?;
            tracing::debug!(
                "Prepared stage '{}' ({}): {} output fields",
                def.name,
                runtime.kind_name(),
                output.len()
            );
            output_types[id.index()] = Some(output);
            runtimes[id.index()] = Some(runtime);
        }

        Ok(runtimes.into_iter().flatten().collect())
    }

    /// Build the channel ends of every stage, indexed by stage id.
    fn wire(&self, poison: &Poison) -> Vec<StageIo> {
        let capacity = self.config.channel_capacity();
        let stages = self.graph.stages();
        let mut ios: Vec<StageIo> = stages.iter().map(|s| StageIo::new(s.name.clone())).collect();

        for hop in self.graph.hops() {
            let (tx, rx) = row_channel(hop.id, capacity, poison);
            ios[hop.from.index()]
                .outputs
                .attach(stages[hop.to.index()].name.clone(), tx);
            ios[hop.to.index()].attach_input(stages[hop.from.index()].name.clone(), hop.role, rx);
        }
        ios
    }

    fn execute(&self, runtimes: Vec<StageRuntime>) -> PipelineResult<Vec<StageStats>> {
        let poison = Poison::new();
        let ios = self.wire(&poison);
        let (exit_tx, exit_rx) = unbounded::<WorkerExit>();

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(runtimes.len());
        let mut spawn_error = None;

        for (index, (mut runtime, mut io)) in runtimes.into_iter().zip(ios).enumerate() {
            let exit_tx = exit_tx.clone();
            let name = runtime.name().to_string();
            let spawned = thread::Builder::new()
                .name(format!("stage-{}", name))
                .spawn(move || {
                    let result = catch_unwind(AssertUnwindSafe(|| runtime.run(&mut io)))
                        .unwrap_or_else(|payload| {
                            Err(PipelineError::row_processing(
                                runtime.name(),
                                format!("worker panicked: {}", panic_message(payload.as_ref())),
                            ))
                        });
                    // Report before the channel ends drop, so downstream
                    // disconnects are never mistaken for the root cause.
                    let _ = exit_tx.send(WorkerExit { index, result });
                    drop(io);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    spawn_error = Some(PipelineError::WorkerSpawn { stage: name, source });
                    break;
                }
            }
        }
        drop(exit_tx);

        if spawn_error.is_some() {
            poison.poison();
        }

        let mut stats: Vec<Option<StageStats>> = (0..self.graph.stages().len()).map(|_| None).collect();
        let mut first_error = spawn_error;
        let mut poisoned_error = None;

        for exit in exit_rx.iter() {
            match exit.result {
                Ok(stage_stats) => stats[exit.index] = Some(stage_stats),
                Err(e) if e.is_poisoned() => {
                    poison.poison();
                    tracing::debug!("Stage {} stopped: {}", exit.index, e);
                    poisoned_error.get_or_insert(e);
                }
                Err(e) => {
                    if first_error.is_none() {
                        if poison.poison() {
                            tracing::warn!("Poisoning all channels after: {}", e);
                        }
                        first_error = Some(e);
                    } else {
                        tracing::debug!("Discarding follow-on error: {}", e);
                    }
                }
            }
        }

        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Stage worker panicked outside its stage");
            }
        }

        if let Some(e) = first_error.or(poisoned_error) {
            return Err(e);
        }

        let order = self.graph.topological_order();
        Ok(order
            .iter()
            .filter_map(|id| stats[id.index()].take())
            .collect())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
