//! Pipeline graph: steps (stages) connected by hops.
//!
//! This is the *definition* of a pipeline. Transforms are referenced by kind
//! (a registry key) plus a JSON config blob; `rowflow-exec` instantiates one
//! transform per step copy and one row set per (producer copy, consumer copy)
//! pair according to [`Dispatch`].
//!
//! Build rules enforced by [`PipelineGraph::validate`]:
//! - step names are unique, every step runs at least one copy;
//! - hops and error targets reference known steps, never the step itself;
//! - a step fed by more than one upstream step declares a merge policy, and a
//!   priority merge lists exactly those upstreams;
//! - the graph (main and error edges) is acyclic.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn one() -> usize {
    1
}

/// How a unit hands each output record to its output row sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Every record goes to every output row set.
    #[default]
    Copy,
    /// Records rotate across output row sets, one each.
    Distribute,
}

/// Declared stream-merge policy for a step with several inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MergeSpec {
    /// Rotate over inputs, `block_rows` at a time (engine default when unset).
    RoundRobin {
        #[serde(default)]
        block_rows: Option<usize>,
    },
    /// Strict priority among inputs that currently have data. `order` names
    /// the upstream steps, highest priority first. `wait_ms` is the bounded
    /// wait before rescanning when no input has data; it has no default.
    Priority { order: Vec<String>, wait_ms: u64 },
}

/// Row-level error routing for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHandling {
    /// Step receiving the failed rows.
    pub target: String,
    /// Escalate to a fatal error once more than this many rows were rejected.
    #[serde(default)]
    pub max_errors: Option<u64>,
    /// Escalate once rejected/read exceeds this percentage...
    #[serde(default)]
    pub max_percent_errors: Option<u8>,
    /// ...but only after this many rows were read.
    #[serde(default)]
    pub min_rows_for_percent: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    pub name: String,
    /// Registry key of the transform, e.g. `"filter"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "one")]
    pub copies: usize,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub output: OutputMode,
    #[serde(default)]
    pub merge: Option<MergeSpec>,
    #[serde(default)]
    pub error_handling: Option<ErrorHandling>,
}

impl StepDef {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            copies: 1,
            config: serde_json::Value::Null,
            output: OutputMode::Copy,
            merge: None,
            error_handling: None,
        }
    }

    pub fn with_copies(mut self, copies: usize) -> Self {
        self.copies = copies;
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_merge(mut self, merge: MergeSpec) -> Self {
        self.merge = Some(merge);
        self
    }

    pub fn with_error_handling(mut self, handling: ErrorHandling) -> Self {
        self.error_handling = Some(handling);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub from: String,
    pub to: String,
}

impl Hop {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineGraph {
    #[serde(default)]
    pub name: String,
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub hops: Vec<Hop>,
}

impl PipelineGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            hops: Vec::new(),
        }
    }

    pub fn step(mut self, step: StepDef) -> Self {
        self.steps.push(step);
        self
    }

    pub fn hop(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.hops.push(Hop::new(from, to));
        self
    }

    pub fn find(&self, name: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Distinct steps feeding `step`: main hops in declaration order, then
    /// steps routing their error rows to it.
    pub fn upstreams(&self, step: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for hop in self.hops.iter().filter(|h| h.to == step) {
            if !out.contains(&hop.from.as_str()) {
                out.push(&hop.from);
            }
        }
        for s in &self.steps {
            if let Some(eh) = &s.error_handling {
                if eh.target == step && !out.contains(&s.name.as_str()) {
                    out.push(&s.name);
                }
            }
        }
        out
    }

    /// Steps fed by the main output of `step`, in hop declaration order.
    pub fn downstreams(&self, step: &str) -> Vec<&str> {
        self.hops
            .iter()
            .filter(|h| h.from == step)
            .map(|h| h.to.as_str())
            .collect()
    }

    /// Every edge (main and error) as `(from, to)`.
    fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .hops
            .iter()
            .map(|h| (h.from.as_str(), h.to.as_str()))
            .collect();
        for s in &self.steps {
            if let Some(eh) = &s.error_handling {
                edges.push((s.name.as_str(), eh.target.as_str()));
            }
        }
        edges
    }

    /// Check every build rule; the first violation is reported.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Graph("pipeline has no steps".into()));
        }

        let mut names = HashSet::new();
        for s in &self.steps {
            if s.name.trim().is_empty() {
                return Err(Error::Graph("step with an empty name".into()));
            }
            if !names.insert(s.name.as_str()) {
                return Err(Error::Graph(format!("duplicate step name '{}'", s.name)));
            }
            if s.kind.trim().is_empty() {
                return Err(Error::Graph(format!("step '{}' has no type", s.name)));
            }
            if s.copies == 0 {
                return Err(Error::Graph(format!(
                    "step '{}' must run at least one copy",
                    s.name
                )));
            }
        }

        let mut seen_hops = HashSet::new();
        for hop in &self.hops {
            for end in [&hop.from, &hop.to] {
                if !names.contains(end.as_str()) {
                    return Err(Error::Graph(format!(
                        "hop {} -> {} references unknown step '{}'",
                        hop.from, hop.to, end
                    )));
                }
            }
            if hop.from == hop.to {
                return Err(Error::Graph(format!("step '{}' hops to itself", hop.from)));
            }
            if !seen_hops.insert((hop.from.as_str(), hop.to.as_str())) {
                return Err(Error::Graph(format!(
                    "duplicate hop {} -> {}",
                    hop.from, hop.to
                )));
            }
        }

        for s in &self.steps {
            if let Some(eh) = &s.error_handling {
                if !names.contains(eh.target.as_str()) {
                    return Err(Error::Graph(format!(
                        "step '{}' routes errors to unknown step '{}'",
                        s.name, eh.target
                    )));
                }
                if eh.target == s.name {
                    return Err(Error::Graph(format!(
                        "step '{}' routes errors to itself",
                        s.name
                    )));
                }
                if seen_hops.contains(&(s.name.as_str(), eh.target.as_str())) {
                    return Err(Error::Graph(format!(
                        "step '{}' sends both main and error rows to '{}'",
                        s.name, eh.target
                    )));
                }
                if eh.max_percent_errors.is_some_and(|p| p > 100) {
                    return Err(Error::Graph(format!(
                        "step '{}': max_percent_errors must be within 0..=100",
                        s.name
                    )));
                }
            }
        }

        for s in &self.steps {
            let ups = self.upstreams(&s.name);
            match &s.merge {
                None if ups.len() > 1 => {
                    return Err(Error::Graph(format!(
                        "step '{}' is fed by {} steps ({}); declare a merge policy",
                        s.name,
                        ups.len(),
                        ups.join(", ")
                    )));
                }
                None => {}
                Some(MergeSpec::RoundRobin { block_rows }) => {
                    if *block_rows == Some(0) {
                        return Err(Error::Graph(format!(
                            "step '{}': round-robin block_rows must be at least 1",
                            s.name
                        )));
                    }
                }
                Some(MergeSpec::Priority { order, wait_ms }) => {
                    if *wait_ms == 0 {
                        return Err(Error::Graph(format!(
                            "step '{}': priority merge wait_ms must be positive",
                            s.name
                        )));
                    }
                    let declared: HashSet<&str> = order.iter().map(String::as_str).collect();
                    let actual: HashSet<&str> = ups.iter().copied().collect();
                    if declared.len() != order.len() || declared != actual {
                        return Err(Error::Graph(format!(
                            "step '{}': priority order [{}] must list each upstream step [{}] exactly once",
                            s.name,
                            order.join(", "),
                            ups.join(", ")
                        )));
                    }
                }
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Kahn's algorithm over main and error edges; ties keep declaration order.
    pub fn topological_order(&self) -> Result<Vec<&StepDef>> {
        let mut in_degree: HashMap<&str, usize> =
            self.steps.iter().map(|s| (s.name.as_str(), 0)).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (u, v) in self.edges() {
            *in_degree.entry(v).or_default() += 1;
            dependents.entry(u).or_default().push(v);
        }

        let mut ready: VecDeque<&str> = self
            .steps
            .iter()
            .map(|s| s.name.as_str())
            .filter(|n| in_degree.get(n) == Some(&0))
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(n) = ready.pop_front() {
            if let Some(step) = self.find(n) {
                order.push(step);
            }
            if let Some(nexts) = dependents.get(n) {
                for d in nexts {
                    if let Some(deg) = in_degree.get_mut(d) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push_back(d);
                        }
                    }
                }
            }
        }

        if order.len() < self.steps.len() {
            let placed: HashSet<&str> = order.iter().map(|s| s.name.as_str()).collect();
            let stuck: Vec<&str> = self
                .steps
                .iter()
                .map(|s| s.name.as_str())
                .filter(|n| !placed.contains(n))
                .collect();
            return Err(Error::Graph(format!(
                "cycle detected among steps [{}]",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }
}

/// Row-set allocation pattern between a producer step and a consumer step,
/// decided by their copy counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// 1 → 1: a single row set.
    OneToOne,
    /// 1 → N: the producer feeds each consumer copy.
    OneToMany,
    /// N → 1: each producer copy feeds the single consumer.
    ManyToOne,
    /// N → N: copy `c` feeds copy `c`.
    Pairwise,
    /// N → M: every producer copy feeds every consumer copy.
    AllPairs,
}

impl Dispatch {
    pub fn between(from_copies: usize, to_copies: usize) -> Self {
        match (from_copies, to_copies) {
            (1, 1) => Dispatch::OneToOne,
            (1, _) => Dispatch::OneToMany,
            (_, 1) => Dispatch::ManyToOne,
            (f, t) if f == t => Dispatch::Pairwise,
            _ => Dispatch::AllPairs,
        }
    }

    /// `(producer copy, consumer copy)` pairs, one row set each.
    pub fn pairs(self, from_copies: usize, to_copies: usize) -> Vec<(usize, usize)> {
        match self {
            Dispatch::OneToOne => vec![(0, 0)],
            Dispatch::OneToMany => (0..to_copies).map(|c| (0, c)).collect(),
            Dispatch::ManyToOne => (0..from_copies).map(|c| (c, 0)).collect(),
            Dispatch::Pairwise => (0..to_copies).map(|c| (c, c)).collect(),
            Dispatch::AllPairs => (0..from_copies)
                .flat_map(|s| (0..to_copies).map(move |t| (s, t)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> PipelineGraph {
        PipelineGraph::new("linear")
            .step(StepDef::new("read", "generate"))
            .step(StepDef::new("clean", "dummy"))
            .step(StepDef::new("write", "dummy"))
            .hop("read", "clean")
            .hop("clean", "write")
    }

    fn graph_err(g: &PipelineGraph) -> String {
        match g.validate() {
            Err(Error::Graph(msg)) => msg,
            other => panic!("expected graph error, got {other:?}"),
        }
    }

    #[test]
    fn linear_graph_is_valid_and_ordered() {
        let g = linear();
        g.validate().unwrap();
        let order: Vec<&str> = g
            .topological_order()
            .unwrap()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(order, vec!["read", "clean", "write"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut g = linear().hop("write", "clean");
        // clean is now fed twice; the merge lets the cycle check report
        g.steps[1].merge = Some(MergeSpec::RoundRobin { block_rows: None });
        assert!(graph_err(&g).contains("cycle"));
    }

    #[test]
    fn error_edges_participate_in_cycle_detection() {
        let mut g = linear();
        g.steps[2].error_handling = Some(ErrorHandling {
            target: "read".into(),
            ..Default::default()
        });
        assert!(graph_err(&g).contains("cycle"));
    }

    #[test]
    fn unknown_and_duplicate_hops() {
        let g = linear().hop("clean", "nowhere");
        assert!(graph_err(&g).contains("unknown step 'nowhere'"));
        let g = linear().hop("read", "clean");
        assert!(graph_err(&g).contains("duplicate hop"));
        let g = linear().hop("clean", "clean");
        assert!(graph_err(&g).contains("itself"));
    }

    #[test]
    fn multiple_upstreams_need_merge() {
        let g = PipelineGraph::new("fan-in")
            .step(StepDef::new("a", "generate"))
            .step(StepDef::new("b", "generate"))
            .step(StepDef::new("m", "dummy"))
            .hop("a", "m")
            .hop("b", "m");
        assert!(graph_err(&g).contains("declare a merge policy"));

        let mut ok = g.clone();
        ok.steps[2].merge = Some(MergeSpec::Priority {
            order: vec!["b".into(), "a".into()],
            wait_ms: 5,
        });
        ok.validate().unwrap();

        let mut bad = g;
        bad.steps[2].merge = Some(MergeSpec::Priority {
            order: vec!["a".into(), "a".into()],
            wait_ms: 5,
        });
        assert!(graph_err(&bad).contains("exactly once"));
    }

    #[test]
    fn error_target_counts_as_upstream() {
        let g = PipelineGraph::new("errors")
            .step(
                StepDef::new("read", "generate").with_error_handling(ErrorHandling {
                    target: "rejects".into(),
                    ..Default::default()
                }),
            )
            .step(StepDef::new("rejects", "dummy"));
        g.validate().unwrap();
        assert_eq!(g.upstreams("rejects"), vec!["read"]);
        assert!(g.downstreams("read").is_empty());
    }

    #[test]
    fn zero_copies_and_duplicate_names() {
        let mut g = linear();
        g.steps[0].copies = 0;
        assert!(graph_err(&g).contains("at least one copy"));
        let g = linear().step(StepDef::new("read", "dummy"));
        assert!(graph_err(&g).contains("duplicate step name"));
    }

    #[test]
    fn dispatch_patterns() {
        assert_eq!(Dispatch::between(1, 1).pairs(1, 1), vec![(0, 0)]);
        assert_eq!(Dispatch::between(1, 3).pairs(1, 3), vec![(0, 0), (0, 1), (0, 2)]);
        assert_eq!(Dispatch::between(2, 1).pairs(2, 1), vec![(0, 0), (1, 0)]);
        assert_eq!(Dispatch::between(2, 2).pairs(2, 2), vec![(0, 0), (1, 1)]);
        assert_eq!(Dispatch::between(2, 3), Dispatch::AllPairs);
        assert_eq!(Dispatch::between(2, 3).pairs(2, 3).len(), 6);
    }

    #[test]
    fn step_def_deserializes_with_defaults() {
        let s: StepDef = serde_json::from_str(r#"{"name":"a","type":"dummy"}"#).unwrap();
        assert_eq!(s.copies, 1);
        assert_eq!(s.output, OutputMode::Copy);
        let m: MergeSpec =
            serde_json::from_str(r#"{"policy":"priority","order":["x"],"wait_ms":3}"#).unwrap();
        assert_eq!(
            m,
            MergeSpec::Priority {
                order: vec!["x".into()],
                wait_ms: 3
            }
        );
        assert!(serde_json::from_str::<MergeSpec>(r#"{"policy":"priority","order":["x"]}"#).is_err());
    }
}
