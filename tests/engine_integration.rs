//! Integration tests for the threaded engine
//!
//! These tests validate run-level behavior:
//! - Determinism of repeated runs
//! - Fan-out copies
//! - Failure and panic propagation with poisoning
//! - Running from a definition file

mod common;

use common::builders::{plugin, GridBuilder};
use common::{run, small_channels, sorted};
use rowflow::config::PipelineDefinition;
use rowflow::pipeline::stages::{SwitchCaseConfig, SwitchCaseTarget};
use rowflow::pipeline::{
    ErrorKind, InputSchemas, Pipeline, PipelineError, PipelineGraph, PipelineResult, PluginStage,
    RunState, StageConfig, StageOutputs, StageRegistry, Transform,
};
use rowflow::{MemorySinkHandle, Row, RowType, ValueType};
use tempfile::tempdir;

/// Passes rows on until the `at`-th, then fails or panics.
struct Faulty {
    name: String,
    at: u64,
    seen: u64,
    panic: bool,
}

impl Faulty {
    fn new(name: &str, at: u64, panic: bool) -> Self {
        Self {
            name: name.to_string(),
            at,
            seen: 0,
            panic,
        }
    }
}

impl Transform for Faulty {
    fn prepare(&mut self, inputs: &InputSchemas) -> PipelineResult<RowType> {
        inputs.single_main(&self.name)
    }

    fn process_row(&mut self, row: Row, outputs: &mut StageOutputs) -> PipelineResult<()> {
        self.seen += 1;
        if self.seen == self.at {
            if self.panic {
                panic!("exploded at row {}", self.seen);
            }
            return Err(PipelineError::row_processing(&self.name, "injected failure"));
        }
        outputs.put(row)
    }
}

fn big_grid(rows: usize) -> StageConfig {
    GridBuilder::new()
        .field("id", ValueType::Integer)
        .field("state", ValueType::String)
        .numbered(rows, "CA")
        .build()
}

/// in ─► faulty ─► pass ─► out
fn faulty_pipeline(panic: bool) -> (Pipeline, StageRegistry, MemorySinkHandle) {
    let mut registry = StageRegistry::new();
    let out = registry.register_memory_sink("out");
    registry.register("faulty", move |request| {
        Ok(PluginStage::Transform(Box::new(Faulty::new(
            request.stage,
            10,
            panic,
        ))))
    });

    let mut builder = PipelineGraph::builder();
    builder.add_stage("in", big_grid(10_000)).unwrap();
    builder.add_stage("faulty", plugin("faulty")).unwrap();
    builder.add_stage("pass", StageConfig::Dummy).unwrap();
    builder.add_stage("out", plugin("out")).unwrap();
    builder.add_hop("in", "faulty").unwrap();
    builder.add_hop("faulty", "pass").unwrap();
    builder.add_hop("pass", "out").unwrap();

    let pipeline = Pipeline::new(builder.build().unwrap(), small_channels());
    (pipeline, registry, out)
}

#[test]
fn test_row_error_fails_run() {
    let (mut pipeline, registry, out) = faulty_pipeline(false);

    let err = pipeline.run(&registry).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RowProcessing);
    assert!(matches!(
        &err,
        PipelineError::RowProcessing { stage, message } if stage == "faulty" && message == "injected failure"
    ));
    assert_eq!(pipeline.state(), RunState::Failed);

    // The sink saw at most the rows before the failure and was never closed.
    assert!(out.len() < 10);
    assert!(!out.is_closed());
}

#[test]
fn test_panic_becomes_row_error() {
    let (mut pipeline, registry, out) = faulty_pipeline(true);

    let err = pipeline.run(&registry).unwrap_err();
    match err {
        PipelineError::RowProcessing { stage, message } => {
            assert_eq!(stage, "faulty");
            assert!(message.contains("exploded at row 10"), "{}", message);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(pipeline.state(), RunState::Failed);
    assert!(!out.is_closed());
}

#[test]
fn test_failed_pipeline_cannot_rerun() {
    let (mut pipeline, registry, _out) = faulty_pipeline(false);
    assert!(pipeline.run(&registry).is_err());
    assert!(matches!(
        pipeline.run(&registry),
        Err(PipelineError::InvalidState(RunState::Failed))
    ));
}

fn switch_run() -> anyhow::Result<Vec<Vec<Vec<String>>>> {
    let mut registry = StageRegistry::new();
    let handles: Vec<MemorySinkHandle> = ["x", "y", "copy"]
        .iter()
        .map(|id| registry.register_memory_sink(*id))
        .collect();

    let mut grid = GridBuilder::new()
        .field("id", ValueType::Integer)
        .field("state", ValueType::String);
    for i in 0..500 {
        let state = ["CA", "NY", "TX"][i % 3];
        grid = grid.row(&[&i.to_string(), state]);
    }

    let mut builder = PipelineGraph::builder();
    builder.add_stage("in", grid.build())?;
    builder.add_stage("fan", StageConfig::Dummy)?;
    builder.add_stage(
        "switch",
        StageConfig::SwitchCase(SwitchCaseConfig {
            field: "state".into(),
            cases: vec![SwitchCaseTarget {
                value: "CA".into(),
                target: "x".into(),
            }],
            default_target: "y".into(),
            case_format: None,
        }),
    )?;
    builder.add_stage("x", plugin("x"))?;
    builder.add_stage("y", plugin("y"))?;
    builder.add_stage("copy", plugin("copy"))?;
    builder.add_hop("in", "fan")?;
    builder.add_hop("fan", "switch")?;
    builder.add_hop("fan", "copy")?;
    builder.add_hop("switch", "x")?;
    builder.add_hop("switch", "y")?;

    run(builder, &registry)?;
    Ok(handles.iter().map(|h| sorted(&h.rows())).collect())
}

#[test]
fn test_repeated_runs_are_deterministic() -> anyhow::Result<()> {
    let first = switch_run()?;
    let second = switch_run()?;
    assert_eq!(first, second);

    let [x, y, copy] = &first[..] else {
        panic!("expected three sinks");
    };
    assert_eq!(x.len(), 167);
    assert_eq!(y.len(), 333);
    // Fan-out duplicates rather than partitions.
    assert_eq!(copy.len(), 500);
    Ok(())
}

#[test]
fn test_configuration_error_reported_before_rows_flow() {
    let mut registry = StageRegistry::new();
    let out = registry.register_memory_sink("out");

    let mut builder = PipelineGraph::builder();
    builder.add_stage("in", big_grid(3)).unwrap();
    builder
        .add_stage(
            "switch",
            StageConfig::SwitchCase(SwitchCaseConfig {
                field: "county".into(),
                cases: Vec::new(),
                default_target: "out".into(),
                case_format: None,
            }),
        )
        .unwrap();
    builder.add_stage("out", plugin("out")).unwrap();
    builder.add_hop("in", "switch").unwrap();
    builder.add_hop("switch", "out").unwrap();

    let err = run(builder, &registry).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(out.row_type().is_none());
}

#[test]
fn test_run_from_definition_file() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("totals.toml");
    std::fs::write(
        &path,
        r#"
        name = "totals"

        [[stages]]
        name = "orders"
        kind = "DataGrid"
        fields = [{ name = "state", type = "String" }, { name = "amount", type = "Number" }]
        rows = [["CA", "1.5"], ["CA", "2.5"], ["NY", ""]]

        [[stages]]
        name = "group"
        kind = "GroupBy"
        group_fields = ["state"]

        [[stages.aggregates]]
        result_field = "avg"
        source_field = "amount"
        function = "Average"

        [[stages]]
        name = "stamp"
        kind = "Constant"
        fields = [{ name = "source", type = "String", value = "grid" }]

        [[stages]]
        name = "log"
        kind = "WriteToLog"
        level = "Debug"

        [[stages]]
        name = "out"
        kind = "Plugin"
        plugin_id = "collect"

        [[hops]]
        from = "orders"
        to = "group"

        [[hops]]
        from = "group"
        to = "stamp"

        [[hops]]
        from = "stamp"
        to = "log"

        [[hops]]
        from = "log"
        to = "out"
        "#,
    )?;

    let mut registry = StageRegistry::new();
    let out = registry.register_memory_sink("collect");

    let graph = PipelineDefinition::load(&path)?.into_graph()?;
    let report = Pipeline::new(graph, small_channels()).run(&registry)?;
    assert_eq!(report.state, RunState::Finished);

    let rows = out.rows();
    assert_eq!(rows.len(), 2);
    common::assert_float_eq(rows[0].value(1).as_f64().unwrap_or_default(), 2.0, 1e-9);
    assert!(rows[1].value(1).is_null());
    assert_eq!(rows[1].value(2).as_str(), Some("grid"));
    Ok(())
}
