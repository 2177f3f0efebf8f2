//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use rowflow::pipeline::{Pipeline, PipelineGraphBuilder, PipelineResult, RunReport, StageRegistry};
use rowflow::{EngineConfig, Row, Value};

/// Engine settings with tiny channels, so backpressure kicks in early.
pub fn small_channels() -> EngineConfig {
    EngineConfig {
        batch_size: 2,
        channel_batches: 2,
        ..Default::default()
    }
}

/// Build the graph and run it once.
pub fn run(builder: PipelineGraphBuilder, registry: &StageRegistry) -> PipelineResult<RunReport> {
    let graph = builder.build()?;
    Pipeline::new(graph, small_channels()).run(registry)
}

/// Rows rendered as display strings, for order-insensitive comparison.
pub fn rendered(rows: &[Row]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|r| r.values().iter().map(Value::to_string).collect())
        .collect()
}

/// Like [`rendered`], sorted.
pub fn sorted(rows: &[Row]) -> Vec<Vec<String>> {
    let mut out = rendered(rows);
    out.sort();
    out
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
