//! Row-set allocation between step copies.
//!
//! One row set per (producer copy, consumer copy) pair chosen by
//! [`Dispatch`]; each has exactly one producer and one consumer. A consumer's
//! inputs are ordered by upstream rank (priority order when declared, else
//! hop order) and then by producer copy, which is what the merge policies see.

use std::collections::HashMap;
use std::sync::Arc;

use rowflow_core::prelude::{
    Dispatch, MergeSpec, PipelineGraph, RowSetId, RowSetName, StepDef, UnitKey,
};

use crate::error::ExecError;
use crate::rowset::RowSet;

pub(crate) struct UnitWiring {
    pub key: UnitKey,
    pub inputs: Vec<Arc<RowSet>>,
    pub outputs: Vec<Arc<RowSet>>,
    pub error_outputs: Vec<Arc<RowSet>>,
}

pub(crate) struct Wiring {
    /// Units in start order: topological by step, then by copy.
    pub units: Vec<UnitWiring>,
    pub rowsets: Vec<Arc<RowSet>>,
}

/// Position of `upstream` among the inputs of `consumer`.
fn input_rank(graph: &PipelineGraph, consumer: &StepDef, upstream: &str) -> usize {
    let declared = match &consumer.merge {
        Some(MergeSpec::Priority { order, .. }) => order.iter().position(|s| s == upstream),
        _ => None,
    };
    declared
        .or_else(|| {
            graph
                .upstreams(&consumer.name)
                .iter()
                .position(|s| *s == upstream)
        })
        .unwrap_or(usize::MAX)
}

fn step<'g>(graph: &'g PipelineGraph, name: &str) -> Result<&'g StepDef, ExecError> {
    graph
        .find(name)
        .ok_or_else(|| ExecError::Configuration(format!("unknown step '{name}'")))
}

pub(crate) fn wire(graph: &PipelineGraph, capacity: usize) -> Result<Wiring, ExecError> {
    let order = graph.topological_order()?;

    let mut index: HashMap<UnitKey, usize> = HashMap::new();
    let mut units = Vec::new();
    for s in &order {
        for copy in 0..s.copies {
            let key = UnitKey::new(s.name.clone(), copy);
            index.insert(key.clone(), units.len());
            units.push(UnitWiring {
                key,
                inputs: Vec::new(),
                outputs: Vec::new(),
                error_outputs: Vec::new(),
            });
        }
    }

    // (from, to, is_error) in declaration order: hops first, then error routes.
    let mut edges: Vec<(&StepDef, &StepDef, bool)> = Vec::new();
    for hop in &graph.hops {
        edges.push((step(graph, &hop.from)?, step(graph, &hop.to)?, false));
    }
    for s in &graph.steps {
        if let Some(eh) = &s.error_handling {
            edges.push((s, step(graph, &eh.target)?, true));
        }
    }

    let mut pending: Vec<Vec<(usize, usize, Arc<RowSet>)>> = vec![Vec::new(); units.len()];
    let mut rowsets = Vec::new();
    let mut next_id = 0u64;

    for (from, to, is_error) in edges {
        let rank = input_rank(graph, to, &from.name);
        let dispatch = Dispatch::between(from.copies, to.copies);
        for (fc, tc) in dispatch.pairs(from.copies, to.copies) {
            let name = RowSetName::new(
                UnitKey::new(from.name.clone(), fc),
                UnitKey::new(to.name.clone(), tc),
            );
            let (Some(&p), Some(&c)) = (index.get(&name.from), index.get(&name.to)) else {
                return Err(ExecError::Configuration(format!("cannot wire row set {name}")));
            };
            let rs = Arc::new(RowSet::new(RowSetId::new(next_id), name, capacity));
            next_id += 1;

            if is_error {
                units[p].error_outputs.push(Arc::clone(&rs));
            } else {
                units[p].outputs.push(Arc::clone(&rs));
            }
            pending[c].push((rank, fc, Arc::clone(&rs)));
            rowsets.push(rs);
        }
    }

    for (unit, mut inputs) in units.iter_mut().zip(pending) {
        inputs.sort_by_key(|(rank, copy, rs)| (*rank, *copy, rs.id()));
        unit.inputs = inputs.into_iter().map(|(_, _, rs)| rs).collect();
    }

    Ok(Wiring { units, rowsets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_core::prelude::{ErrorHandling, StepDef};

    fn names(rowsets: &[Arc<RowSet>]) -> Vec<String> {
        rowsets.iter().map(|rs| rs.name().to_string()).collect()
    }

    #[test]
    fn copies_are_wired_by_dispatch() {
        let g = PipelineGraph::new("copies")
            .step(StepDef::new("a", "generate").with_copies(2))
            .step(StepDef::new("b", "dummy").with_copies(3))
            .step(StepDef::new("c", "dummy"))
            .hop("a", "b")
            .hop("b", "c");
        let w = wire(&g, 8).unwrap();
        // 2x3 all pairs + 3x1
        assert_eq!(w.rowsets.len(), 9);
        let keys: Vec<String> = w.units.iter().map(|u| u.key.to_string()).collect();
        assert_eq!(keys, vec!["a.0", "a.1", "b.0", "b.1", "b.2", "c.0"]);
        assert_eq!(w.units[0].outputs.len(), 3);
        assert_eq!(names(&w.units[2].inputs), vec!["a.0 - b.0", "a.1 - b.0"]);
        assert_eq!(w.units[5].inputs.len(), 3);
        assert!(w.rowsets.iter().all(|rs| rs.capacity() == 8));
    }

    #[test]
    fn priority_order_sorts_inputs() {
        let g = PipelineGraph::new("prio")
            .step(StepDef::new("a", "generate"))
            .step(StepDef::new("b", "generate"))
            .step(StepDef::new("c", "generate"))
            .step(StepDef::new("m", "dummy").with_merge(MergeSpec::Priority {
                order: vec!["c".into(), "a".into(), "b".into()],
                wait_ms: 5,
            }))
            .hop("a", "m")
            .hop("b", "m")
            .hop("c", "m");
        let w = wire(&g, 4).unwrap();
        let m = w.units.iter().find(|u| u.key.step == "m").unwrap();
        assert_eq!(names(&m.inputs), vec!["c.0 - m.0", "a.0 - m.0", "b.0 - m.0"]);
    }

    #[test]
    fn error_routes_get_their_own_outputs() {
        let g = PipelineGraph::new("errors")
            .step(
                StepDef::new("read", "generate").with_error_handling(ErrorHandling {
                    target: "rejects".into(),
                    ..Default::default()
                }),
            )
            .step(StepDef::new("write", "dummy"))
            .step(StepDef::new("rejects", "dummy"))
            .hop("read", "write");
        let w = wire(&g, 4).unwrap();
        let read = &w.units[0];
        assert_eq!(names(&read.outputs), vec!["read.0 - write.0"]);
        assert_eq!(names(&read.error_outputs), vec!["read.0 - rejects.0"]);
    }
}
