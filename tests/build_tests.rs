//! Pipeline construction: graph validation, registry lookups, init failures.

use rowflow_core::prelude::{EngineConfig, MergeSpec, PipelineGraph, StepDef};
use rowflow_exec::{Engine, ExecError};
use serde_json::json;

fn build_error(graph: &PipelineGraph) -> ExecError {
    match Engine::new(EngineConfig::default()).prepare(graph) {
        Ok(_) => panic!("pipeline '{}' should not build", graph.name),
        Err(e) => e,
    }
}

#[test]
fn cycle_is_rejected() {
    let g = PipelineGraph::new("loop")
        .step(StepDef::new("b", "dummy"))
        .step(StepDef::new("c", "dummy"))
        .hop("b", "c")
        .hop("c", "b");
    match build_error(&g) {
        ExecError::Configuration(msg) => assert!(msg.contains("cycle"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn hop_to_unknown_step_is_rejected() {
    let g = PipelineGraph::new("dangling")
        .step(StepDef::new("gen", "generate"))
        .hop("gen", "nowhere");
    match build_error(&g) {
        ExecError::Configuration(msg) => assert!(msg.contains("unknown step 'nowhere'"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_step_type_is_a_registry_error() {
    let g = PipelineGraph::new("typo").step(StepDef::new("gen", "generat"));
    match build_error(&g) {
        ExecError::Registry(msg) => assert!(msg.contains("generat"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn fan_in_needs_a_merge_policy() {
    let g = PipelineGraph::new("fan-in")
        .step(StepDef::new("a", "generate"))
        .step(StepDef::new("b", "generate"))
        .step(StepDef::new("m", "dummy"))
        .hop("a", "m")
        .hop("b", "m");
    match build_error(&g) {
        ExecError::Configuration(msg) => assert!(msg.contains("merge policy"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }

    let fixed = PipelineGraph {
        steps: vec![
            StepDef::new("a", "generate"),
            StepDef::new("b", "generate"),
            StepDef::new("m", "dummy").with_merge(MergeSpec::RoundRobin { block_rows: None }),
        ],
        ..g
    };
    assert!(Engine::new(EngineConfig::default()).prepare(&fixed).is_ok());
}

#[test]
fn duplicate_hop_is_rejected() {
    let g = PipelineGraph::new("dup")
        .step(StepDef::new("a", "generate"))
        .step(StepDef::new("b", "dummy"))
        .hop("a", "b")
        .hop("a", "b");
    match build_error(&g) {
        ExecError::Configuration(msg) => assert!(msg.contains("duplicate hop"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn step_init_failure_names_the_unit() {
    let g = PipelineGraph::new("bad-filter")
        .step(StepDef::new("gen", "generate"))
        .step(
            StepDef::new("f", "filter")
                .with_copies(2)
                .with_config(json!({"condition": "no operator here"})),
        )
        .hop("gen", "f");
    match build_error(&g) {
        ExecError::Init { unit, message } => {
            assert_eq!(unit.step, "f");
            assert!(message.contains("unparseable predicate"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_engine_config_is_rejected() {
    let cfg = EngineConfig {
        rowset_capacity: 0,
        ..Default::default()
    };
    let g = PipelineGraph::new("one").step(StepDef::new("gen", "generate"));
    assert!(matches!(
        Engine::new(cfg).prepare(&g),
        Err(ExecError::Configuration(_))
    ));
}

#[test]
fn lifecycle_calls_out_of_order_fail() {
    let g = PipelineGraph::new("one")
        .step(StepDef::new("gen", "generate").with_config(json!({"rows": [1, 2]})))
        .step(StepDef::new("sink", "dummy"))
        .hop("gen", "sink");
    let mut p = Engine::new(EngineConfig::default()).prepare(&g).unwrap();
    assert!(matches!(p.wait_until_finished(), Err(ExecError::State(_))));
    p.start().unwrap();
    assert!(matches!(p.start(), Err(ExecError::State(_))));
    assert!(matches!(p.add_row_producer("sink", 0), Err(ExecError::State(_))));
    let result = p.wait_until_finished().unwrap();
    assert!(result.is_success());
    assert_eq!(result.unit("sink", 0).unwrap().read, 2);
}

#[test]
fn core_errors_convert_at_crate_boundaries() {
    let err = rowflow_core::Error::Config("bad value".into());
    let step: rowflow_steps::StepError = err.into();
    assert!(matches!(step, rowflow_steps::StepError::Fatal(ref m) if m.contains("bad value")));
    let exec: ExecError = rowflow_core::Error::Config("bad value".into()).into();
    assert!(exec.to_string().contains("bad value"), "{exec}");
}
