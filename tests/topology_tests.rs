//! Step copies, output modes, and listeners across multi-unit topologies.

mod common;

use common::Collector;
use rowflow_core::prelude::{EngineConfig, MergeSpec, OutputMode, PipelineGraph, StepDef};
use rowflow_exec::Engine;
use serde_json::json;

fn six_rows() -> serde_json::Value {
    json!({"rows": ["r1", "r2", "r3", "r4", "r5", "r6"]})
}

#[test]
fn copy_mode_gives_every_consumer_copy_all_rows() {
    let g = PipelineGraph::new("copy")
        .step(StepDef::new("gen", "generate").with_config(six_rows()))
        .step(StepDef::new("work", "dummy").with_copies(3))
        .hop("gen", "work");
    let result = Engine::new(EngineConfig::default()).run(&g).unwrap();
    assert!(result.is_success());
    assert_eq!(result.step("work").count(), 3);
    for unit in result.step("work") {
        assert_eq!(unit.read, 6, "{}", unit.unit);
    }
    assert_eq!(result.unit("gen", 0).unwrap().written, 6);
}

#[test]
fn distribute_mode_spreads_rows_round_robin() {
    let g = PipelineGraph::new("distribute")
        .step(
            StepDef::new("gen", "generate")
                .with_config(six_rows())
                .with_output(OutputMode::Distribute),
        )
        .step(StepDef::new("work", "dummy").with_copies(3))
        .hop("gen", "work");
    let result = Engine::new(EngineConfig::default()).run(&g).unwrap();
    assert!(result.is_success());
    for unit in result.step("work") {
        assert_eq!(unit.read, 2, "{}", unit.unit);
    }
}

#[test]
fn many_to_many_copies_meet_at_a_single_sink() {
    // 2 producer copies x 3 consumer copies: all pairs, then 3 → 1.
    let g = PipelineGraph::new("n-by-m")
        .step(
            StepDef::new("gen", "generate")
                .with_copies(2)
                .with_config(six_rows())
                .with_output(OutputMode::Distribute),
        )
        .step(StepDef::new("work", "dummy").with_copies(3))
        .step(StepDef::new("sink", "dummy").with_merge(MergeSpec::RoundRobin {
            block_rows: Some(1),
        }))
        .hop("gen", "work")
        .hop("work", "sink");

    let engine = Engine::new(EngineConfig::default());
    let mut pipeline = engine.prepare(&g).unwrap();
    assert_eq!(pipeline.status().len(), 6);
    let sink = Collector::new();
    pipeline.add_row_listener("sink", 0, sink.clone()).unwrap();
    pipeline.start().unwrap();
    let result = pipeline.wait_until_finished().unwrap();

    assert!(result.is_success());
    let work_read: u64 = result.step("work").map(|u| u.read).sum();
    assert_eq!(work_read, 12);
    assert_eq!(result.unit("sink", 0).unwrap().read, 12);

    let mut values = sink.read_values();
    values.sort();
    let mut expected: Vec<String> = (1..=6)
        .flat_map(|i| [format!("r{i}"), format!("r{i}")])
        .collect();
    expected.sort();
    assert_eq!(values, expected);
}

#[test]
fn pairwise_copies_keep_their_lanes() {
    let g = PipelineGraph::new("lanes")
        .step(StepDef::new("gen", "generate").with_copies(2).with_config(six_rows()))
        .step(StepDef::new("work", "dummy").with_copies(2))
        .hop("gen", "work");
    let result = Engine::new(EngineConfig::default()).run(&g).unwrap();
    assert!(result.is_success());
    assert_eq!(result.unit("work", 0).unwrap().read, 6);
    assert_eq!(result.unit("work", 1).unwrap().read, 6);
}

#[test]
fn listeners_see_reads_and_writes() {
    let g = PipelineGraph::new("observed")
        .step(StepDef::new("gen", "generate").with_config(six_rows()))
        .step(StepDef::new("keep", "filter").with_config(json!({"condition": "value > r3"})))
        .step(StepDef::new("sink", "dummy"))
        .hop("gen", "keep")
        .hop("keep", "sink");
    let engine = Engine::new(EngineConfig::default());
    let mut pipeline = engine.prepare(&g).unwrap();
    let seen = Collector::new();
    pipeline.add_row_listener("keep", 0, seen.clone()).unwrap();
    pipeline.start().unwrap();
    let result = pipeline.wait_until_finished().unwrap();

    assert!(result.is_success());
    assert_eq!(seen.read.lock().len(), 6);
    let written: Vec<String> = seen.written.lock().iter().map(common::value_of).collect();
    assert_eq!(written, vec!["r4", "r5", "r6"]);
    assert_eq!(result.unit("keep", 0).unwrap().written, 3);
    assert_eq!(result.unit("sink", 0).unwrap().read, 3);
}
