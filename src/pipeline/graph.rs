//! Pipeline graph: named stages connected by directed hops.
//!
//! Graphs are assembled with [`PipelineGraphBuilder`] and validated once in
//! [`PipelineGraphBuilder::build`]. A built [`PipelineGraph`] is immutable; it
//! carries its topological order and the resolved role of every hop, so the
//! engine never has to look anything up by name while rows flow.
//!
//! ```text
//!   customers ──► join ──► out          main hops carry the row stream
//!   states ─────►┘
//!   totals ─ ─ ─► lookup                info hops carry reference data
//! ```

use crate::pipeline::compiled_plan::{CompiledPlan, PlanStats};
use crate::pipeline::compiler::GraphCompiler;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{HopId, StageId};
use crate::pipeline::stage_config::StageConfig;
use std::collections::HashMap;

/// A named stage and its configuration.
#[derive(Debug, Clone)]
pub struct StageDef {
    pub id: StageId,
    pub name: String,
    pub config: StageConfig,
}

/// What a hop carries into its target stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopRole {
    /// The row stream the stage transforms.
    Main,
    /// Reference data the stage reads completely before its main stream.
    Info,
}

/// A directed connection between two stages.
#[derive(Debug, Clone)]
pub struct Hop {
    pub id: HopId,
    pub from: StageId,
    pub to: StageId,
    pub role: HopRole,
}

/// Incremental graph construction.
#[derive(Debug, Default)]
pub struct PipelineGraphBuilder {
    stages: Vec<StageDef>,
    hops: Vec<Hop>,
    by_name: HashMap<String, StageId>,
}

impl PipelineGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage. Names are unique within a graph.
    pub fn add_stage(
        &mut self,
        name: impl Into<String>,
        config: StageConfig,
    ) -> PipelineResult<StageId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(PipelineError::DuplicateStage(name));
        }
        let id = StageId(self.stages.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.stages.push(StageDef { id, name, config });
        Ok(id)
    }

    /// Connect `from` to `to` with a main hop.
    pub fn add_hop(&mut self, from: &str, to: &str) -> PipelineResult<HopId> {
        self.add_hop_with_role(from, to, HopRole::Main)
    }

    /// Connect `from` to `to` with an info hop.
    pub fn add_info_hop(&mut self, from: &str, to: &str) -> PipelineResult<HopId> {
        self.add_hop_with_role(from, to, HopRole::Info)
    }

    pub fn add_hop_with_role(
        &mut self,
        from: &str,
        to: &str,
        role: HopRole,
    ) -> PipelineResult<HopId> {
        let from_id = self.stage_id(from)?;
        let to_id = self.stage_id(to)?;
        if self.hops.iter().any(|h| h.from == from_id && h.to == to_id) {
            return Err(PipelineError::InvalidHop(format!(
                "duplicate hop {} -> {}",
                from, to
            )));
        }

        let id = HopId(self.hops.len() as u32);
        self.hops.push(Hop {
            id,
            from: from_id,
            to: to_id,
            role,
        });
        Ok(id)
    }

    pub fn get_stage(&self, name: &str) -> Option<&StageDef> {
        self.by_name.get(name).map(|id| &self.stages[id.index()])
    }

    /// Mutable access to a stage's configuration before the graph is built.
    pub fn config_mut(&mut self, name: &str) -> Option<&mut StageConfig> {
        let id = *self.by_name.get(name)?;
        Some(&mut self.stages[id.index()].config)
    }

    /// Validate the graph and compute its execution order.
    pub fn build(mut self) -> PipelineResult<PipelineGraph> {
        self.resolve_info_hops();
        let plan = GraphCompiler::compile(&self.stages, &self.hops)?;

        let graph = PipelineGraph {
            stages: self.stages,
            hops: self.hops,
            by_name: self.by_name,
            plan,
        };
        graph.validate()?;

        tracing::debug!(
            "Built pipeline graph: {} stages, {} hops",
            graph.stages.len(),
            graph.hops.len()
        );
        Ok(graph)
    }

    fn stage_id(&self, name: &str) -> PipelineResult<StageId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| PipelineError::UnknownStage(name.to_string()))
    }

    /// Hops from a stage that a consumer names as its info source carry
    /// reference data, whichever way they were added.
    fn resolve_info_hops(&mut self) {
        for hop in &mut self.hops {
            let target = &self.stages[hop.to.index()];
            let source = &self.stages[hop.from.index()].name;
            if target.config.info_sources().contains(&source.as_str()) {
                hop.role = HopRole::Info;
            }
        }
    }
}

/// A validated, immutable stage graph.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    stages: Vec<StageDef>,
    hops: Vec<Hop>,
    by_name: HashMap<String, StageId>,
    plan: CompiledPlan,
}

impl PipelineGraph {
    pub fn builder() -> PipelineGraphBuilder {
        PipelineGraphBuilder::new()
    }

    pub fn stages(&self) -> &[StageDef] {
        &self.stages
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn stage(&self, name: &str) -> Option<&StageDef> {
        self.by_name.get(name).map(|id| &self.stages[id.index()])
    }

    pub fn stage_by_id(&self, id: StageId) -> Option<&StageDef> {
        self.stages.get(id.index())
    }

    /// Stages ordered so that every stage comes after all its upstreams.
    pub fn topological_order(&self) -> &[StageId] {
        &self.plan.order
    }

    pub fn inputs_of(&self, id: StageId) -> impl Iterator<Item = &Hop> {
        self.hops.iter().filter(move |h| h.to == id)
    }

    pub fn outputs_of(&self, id: StageId) -> impl Iterator<Item = &Hop> {
        self.hops.iter().filter(move |h| h.from == id)
    }

    /// Stages without incoming hops.
    pub fn sources(&self) -> &[StageId] {
        &self.plan.sources
    }

    /// Stages without outgoing hops.
    pub fn sinks(&self) -> &[StageId] {
        &self.plan.sinks
    }

    pub fn stats(&self) -> &PlanStats {
        &self.plan.stats
    }

    fn name_of(&self, id: StageId) -> &str {
        &self.stages[id.index()].name
    }

    fn validate(&self) -> PipelineResult<()> {
        for stage in &self.stages {
            let upstream: Vec<&str> = self.inputs_of(stage.id).map(|h| self.name_of(h.from)).collect();
            let downstream: Vec<&str> = self.outputs_of(stage.id).map(|h| self.name_of(h.to)).collect();

            if stage.config.is_source() && !upstream.is_empty() {
                return Err(PipelineError::InvalidHop(format!(
                    "source stage '{}' cannot receive hops",
                    stage.name
                )));
            }

            if !stage.config.accepts_info_hops() {
                if let Some(hop) = self
                    .inputs_of(stage.id)
                    .find(|h| h.role == HopRole::Info)
                {
                    return Err(PipelineError::InvalidHop(format!(
                        "stage '{}' does not read info hops, but '{}' sends one",
                        stage.name,
                        self.name_of(hop.from)
                    )));
                }
            }

            for input in stage.config.referenced_inputs() {
                if !upstream.contains(&input) {
                    return Err(PipelineError::InvalidHop(format!(
                        "stage '{}' reads from '{}' but there is no hop {} -> {}",
                        stage.name, input, input, stage.name
                    )));
                }
            }

            let targets = stage.config.declared_targets();
            for target in &targets {
                if !downstream.contains(target) {
                    return Err(PipelineError::MissingTarget {
                        stage: stage.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
            if stage.config.routes_exclusively() {
                if let Some(extra) = downstream.iter().find(|d| !targets.contains(d)) {
                    return Err(PipelineError::UnexpectedTarget {
                        stage: stage.name.clone(),
                        target: extra.to_string(),
                    });
                }
            }
        }

        for stage in self.stages.iter().filter(|s| {
            !s.config.is_source() && self.inputs_of(s.id).next().is_none()
        }) {
            tracing::warn!("Stage '{}' has no input hops and will see no rows", stage.name);
        }

        Ok(())
    }
}
