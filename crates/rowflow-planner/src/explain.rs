//! Human-readable plan for a pipeline graph: what the engine would start, in
//! which order, and which row sets connect the units.

use std::fmt::Write;

use rowflow_core::prelude::{
    Dispatch, EngineConfig, MergeSpec, OutputMode, PipelineGraph, StepDef,
};

use crate::error::PlanError;

/// Describe the units and row sets `graph` expands into under `cfg`.
///
/// The graph is validated first, so the output always describes a pipeline
/// the engine would accept.
pub fn explain(graph: &PipelineGraph, cfg: &EngineConfig) -> Result<String, PlanError> {
    graph.validate()?;
    cfg.validate()?;
    let order = graph.topological_order()?;

    let units: usize = graph.steps.iter().map(|s| s.copies).sum();
    let mut edges = Vec::new();
    for hop in &graph.hops {
        edges.push((hop.from.as_str(), hop.to.as_str(), "main"));
    }
    for step in &graph.steps {
        if let Some(eh) = &step.error_handling {
            edges.push((step.name.as_str(), eh.target.as_str(), "error"));
        }
    }
    let rowsets: usize = edges
        .iter()
        .map(|(from, to, _)| rowset_count(graph, from, to))
        .sum();

    let mut out = String::new();
    let name = if graph.name.is_empty() { "<unnamed>" } else { &graph.name };
    // Writing into a String cannot fail.
    let _ = writeln!(out, "Pipeline Plan: {name}");
    let _ = writeln!(out, "======================");
    let _ = writeln!(
        out,
        "{} steps, {} units, {} row sets (capacity {} rows each)",
        graph.steps.len(),
        units,
        rowsets,
        cfg.rowset_capacity
    );
    let _ = writeln!(out, "Error policy: {:?}", cfg.error_policy);
    let _ = writeln!(out);
    let _ = writeln!(out, "Start order:");
    for (i, step) in order.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, describe_step(graph, step, cfg));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Row sets:");
    for (from, to, kind) in &edges {
        let from_copies = copies(graph, from);
        let to_copies = copies(graph, to);
        let dispatch = Dispatch::between(from_copies, to_copies);
        let _ = writeln!(
            out,
            "  {from} -> {to} [{kind}] {}: {} row set(s)",
            dispatch_label(dispatch),
            dispatch.pairs(from_copies, to_copies).len()
        );
    }
    Ok(out)
}

fn describe_step(graph: &PipelineGraph, step: &StepDef, cfg: &EngineConfig) -> String {
    let mut line = format!("{} [{}] x{}", step.name, step.kind, step.copies);
    if step.output == OutputMode::Distribute {
        line.push_str(" output=distribute");
    }
    let inputs: usize = graph
        .upstreams(&step.name)
        .iter()
        .map(|up| rowset_count(graph, up, &step.name))
        .sum();
    match (&step.merge, inputs) {
        (_, 0) => line.push_str(" source"),
        (Some(MergeSpec::Priority { order, wait_ms }), _) => {
            let _ = write!(line, " merge=priority({} wait={}ms)", order.join(">"), wait_ms);
        }
        (Some(MergeSpec::RoundRobin { block_rows }), _) => {
            let block = block_rows.unwrap_or(cfg.round_robin_block_rows);
            let _ = write!(line, " merge=round_robin(block={block})");
        }
        (None, 1) => {}
        (None, _) => {
            let _ = write!(
                line,
                " merge=round_robin(block={})",
                cfg.round_robin_block_rows
            );
        }
    }
    if let Some(eh) = &step.error_handling {
        let _ = write!(line, " errors->{}", eh.target);
        if let Some(max) = eh.max_errors {
            let _ = write!(line, " max_errors={max}");
        }
        if let Some(pct) = eh.max_percent_errors {
            let _ = write!(line, " max_percent={pct}%");
            if let Some(min) = eh.min_rows_for_percent {
                let _ = write!(line, " after {min} rows");
            }
        }
    }
    line
}

fn copies(graph: &PipelineGraph, step: &str) -> usize {
    graph.find(step).map(|s| s.copies).unwrap_or(1)
}

fn rowset_count(graph: &PipelineGraph, from: &str, to: &str) -> usize {
    let (f, t) = (copies(graph, from), copies(graph, to));
    Dispatch::between(f, t).pairs(f, t).len()
}

fn dispatch_label(d: Dispatch) -> &'static str {
    match d {
        Dispatch::OneToOne => "1:1",
        Dispatch::OneToMany => "1:N",
        Dispatch::ManyToOne => "N:1",
        Dispatch::Pairwise => "N:N",
        Dispatch::AllPairs => "N:M",
    }
}
