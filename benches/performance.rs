use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use rowflow_core::prelude::{
    EngineConfig, MergeSpec, PipelineGraph, Record, RowSetId, RowSetName, StepDef, UnitKey,
};
use rowflow_exec::{Engine, PutOutcome, RowSet};
use serde_json::json;

fn bench_rowset_handoff(c: &mut Criterion) {
    let record = Record::text("value", "payload");
    c.bench_function("rowset_handoff_10k", |b| {
        b.iter(|| {
            let rs = Arc::new(RowSet::new(
                RowSetId::new(0),
                RowSetName::new(UnitKey::new("a", 0), UnitKey::new("b", 0)),
                256,
            ));
            let producer = {
                let rs = Arc::clone(&rs);
                let record = record.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let mut pending = record.clone();
                        loop {
                            match rs.put(pending, Duration::from_millis(10)) {
                                PutOutcome::Accepted => break,
                                PutOutcome::TimedOut(r) => pending = r,
                                PutOutcome::Closed(_) => return,
                            }
                        }
                    }
                    rs.set_done();
                })
            };
            let mut got = 0;
            loop {
                let done = rs.is_done();
                match rs.get_wait(Duration::from_millis(10)) {
                    Some(_) => got += 1,
                    None if done => break,
                    None => {}
                }
            }
            producer.join().unwrap();
            assert_eq!(got, 10_000);
        })
    });
}

fn bench_linear_pipeline(c: &mut Criterion) {
    let graph = PipelineGraph::new("bench-linear")
        .step(StepDef::new("gen", "generate").with_config(json!({"limit": 20_000})))
        .step(StepDef::new("keep", "filter").with_config(json!({"condition": "n >= 0"})))
        .step(StepDef::new("sink", "dummy"))
        .hop("gen", "keep")
        .hop("keep", "sink");
    let engine = Engine::new(EngineConfig::default());
    c.bench_function("linear_pipeline_20k", |b| {
        b.iter(|| {
            let result = engine.run(&graph).unwrap();
            assert!(result.is_success());
        })
    });
}

fn bench_priority_fan_in(c: &mut Criterion) {
    let graph = PipelineGraph::new("bench-fan-in")
        .step(StepDef::new("a", "generate").with_config(json!({"limit": 5_000})))
        .step(StepDef::new("b", "generate").with_config(json!({"limit": 5_000})))
        .step(StepDef::new("m", "dummy").with_merge(MergeSpec::Priority {
            order: vec!["a".into(), "b".into()],
            wait_ms: 1,
        }))
        .hop("a", "m")
        .hop("b", "m");
    let engine = Engine::new(EngineConfig::default());
    c.bench_function("priority_fan_in_10k", |b| {
        b.iter(|| {
            let result = engine.run(&graph).unwrap();
            assert_eq!(result.unit("m", 0).unwrap().read, 10_000);
        })
    });
}

criterion_group!(
    benches,
    bench_rowset_handoff,
    bench_linear_pipeline,
    bench_priority_fan_in
);
criterion_main!(benches);
