use super::compiled_plan::{CompiledPlan, PlanStats};
use super::error::{PipelineError, PipelineResult};
use super::graph::{Hop, HopRole, StageDef};
use super::id::StageId;
use std::collections::VecDeque;

/// Orders a stage graph for execution.
pub struct GraphCompiler;

impl GraphCompiler {
    /// Compile stages and hops into a plan.
    ///
    /// Uses Kahn's algorithm. Stages that never reach in-degree zero sit on a
    /// cycle, which fails the whole graph with [`PipelineError::CycleDetected`].
    pub fn compile(stages: &[StageDef], hops: &[Hop]) -> PipelineResult<CompiledPlan> {
        let start_time = std::time::Instant::now();
        let n = stages.len();

        let (fwd_adj, bwd_adj) = Self::build_adjacency(n, hops);

        let sources: Vec<StageId> = (0..n)
            .filter(|&i| bwd_adj[i].is_empty())
            .map(|i| StageId(i as u32))
            .collect();
        let sinks: Vec<StageId> = (0..n)
            .filter(|&i| fwd_adj[i].is_empty())
            .map(|i| StageId(i as u32))
            .collect();

        let order = Self::topological_sort(&fwd_adj, &bwd_adj);
        if order.len() < n {
            let mut placed = vec![false; n];
            for id in &order {
                placed[id.index()] = true;
            }
            let cyclic: Vec<&str> = stages
                .iter()
                .filter(|s| !placed[s.id.index()])
                .map(|s| s.name.as_str())
                .collect();
            tracing::warn!("Stages on or behind a cycle: {:?}", cyclic);
            return Err(PipelineError::CycleDetected);
        }

        let isolated_stages = (0..n)
            .filter(|&i| fwd_adj[i].is_empty() && bwd_adj[i].is_empty())
            .count();

        let stats = PlanStats {
            total_stages: n,
            total_hops: hops.len(),
            info_hops: hops.iter().filter(|h| h.role == HopRole::Info).count(),
            source_stages: sources.len(),
            sink_stages: sinks.len(),
            isolated_stages,
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(CompiledPlan {
            order,
            sources,
            sinks,
            stats,
        })
    }

    /// Build forward and backward adjacency lists
    fn build_adjacency(n: usize, hops: &[Hop]) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
        let mut fwd_adj = vec![Vec::new(); n];
        let mut bwd_adj = vec![Vec::new(); n];

        for hop in hops {
            let from = hop.from.index();
            let to = hop.to.index();
            if from >= n || to >= n {
                continue;
            }
            fwd_adj[from].push(to);
            bwd_adj[to].push(from);
        }

        (fwd_adj, bwd_adj)
    }

    fn topological_sort(fwd_adj: &[Vec<usize>], bwd_adj: &[Vec<usize>]) -> Vec<StageId> {
        let n = fwd_adj.len();
        let mut in_degree: Vec<usize> = bwd_adj.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(n);

        while let Some(stage) = queue.pop_front() {
            result.push(StageId(stage as u32));

            for &neighbor in &fwd_adj[stage] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::HopId;
    use crate::pipeline::stage_config::StageConfig;
    use proptest::prelude::*;

    fn stages(n: usize) -> Vec<StageDef> {
        (0..n)
            .map(|i| StageDef {
                id: StageId(i as u32),
                name: format!("s{}", i),
                config: StageConfig::Dummy,
            })
            .collect()
    }

    fn hop(id: u32, from: u32, to: u32) -> Hop {
        Hop {
            id: HopId(id),
            from: StageId(from),
            to: StageId(to),
            role: HopRole::Main,
        }
    }

    fn position(order: &[StageId], id: u32) -> usize {
        order.iter().position(|s| s.0 == id).unwrap()
    }

    #[test]
    fn test_compile_empty() {
        let plan = GraphCompiler::compile(&[], &[]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.stats.total_stages, 0);
        assert_eq!(plan.stats.source_stages, 0);
    }

    #[test]
    fn test_compile_diamond() {
        // 0 → 1 → 3, 0 → 2 → 3
        let hops = vec![hop(0, 0, 1), hop(1, 0, 2), hop(2, 1, 3), hop(3, 2, 3)];
        let plan = GraphCompiler::compile(&stages(4), &hops).unwrap();

        assert_eq!(plan.order.len(), 4);
        assert_eq!(plan.order[0], StageId(0));
        assert_eq!(plan.order[3], StageId(3));
        assert_eq!(plan.sources, vec![StageId(0)]);
        assert_eq!(plan.sinks, vec![StageId(3)]);
        assert_eq!(plan.stats.total_hops, 4);
    }

    #[test]
    fn test_compile_counts_isolated() {
        let plan = GraphCompiler::compile(&stages(3), &[hop(0, 0, 1)]).unwrap();
        assert_eq!(plan.stats.isolated_stages, 1);
        assert_eq!(plan.stats.source_stages, 2);
        assert_eq!(plan.stats.sink_stages, 2);
    }

    #[test]
    fn test_compile_self_loop() {
        let result = GraphCompiler::compile(&stages(1), &[hop(0, 0, 0)]);
        assert!(matches!(result, Err(PipelineError::CycleDetected)));
    }

    #[test]
    fn test_compile_cycle() {
        let hops = vec![hop(0, 0, 1), hop(1, 1, 2), hop(2, 2, 1)];
        let result = GraphCompiler::compile(&stages(3), &hops);
        assert!(matches!(result, Err(PipelineError::CycleDetected)));
    }

    proptest! {
        #[test]
        fn prop_forward_edges_are_ordered(
            n in 1usize..12,
            raw in prop::collection::vec((0usize..12, 0usize..12), 0..30),
        ) {
            // Only edges from a lower to a higher index: always acyclic.
            let hops: Vec<Hop> = raw
                .into_iter()
                .filter(|(a, b)| a < b && *b < n)
                .enumerate()
                .map(|(i, (a, b))| hop(i as u32, a as u32, b as u32))
                .collect();

            let plan = GraphCompiler::compile(&stages(n), &hops).unwrap();
            prop_assert_eq!(plan.order.len(), n);
            for h in &hops {
                prop_assert!(position(&plan.order, h.from.0) < position(&plan.order, h.to.0));
            }
        }

        #[test]
        fn prop_back_edge_is_cycle(n in 2usize..10) {
            let mut hops: Vec<Hop> = (0..n - 1)
                .map(|i| hop(i as u32, i as u32, i as u32 + 1))
                .collect();
            hops.push(hop(n as u32, (n - 1) as u32, 0));
            let result = GraphCompiler::compile(&stages(n), &hops);
            prop_assert!(matches!(result, Err(PipelineError::CycleDetected)));
        }
    }
}
