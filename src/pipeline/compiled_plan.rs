use crate::pipeline::id::StageId;

/// Execution plan computed once when a graph is built.
#[derive(Debug, Clone, Default)]
pub struct CompiledPlan {
    /// Every stage, upstream before downstream. Ties keep insertion order.
    pub order: Vec<StageId>,

    /// Stages with no incoming hops
    pub sources: Vec<StageId>,

    /// Stages with no outgoing hops
    pub sinks: Vec<StageId>,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub total_stages: usize,

    pub total_hops: usize,

    /// Hops carrying reference data rather than the main stream
    pub info_hops: usize,

    pub source_stages: usize,

    pub sink_stages: usize,

    /// Stages with neither inputs nor outputs
    pub isolated_stages: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
