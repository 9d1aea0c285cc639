//! YAML → `PipelineGraph` parser.
//!
//! Example:
//! ```yaml
//! name: fan-in
//! config:
//!   rowset_capacity: 1000
//!   error_policy: continue_on_error
//! steps:
//!   - name: orders
//!     type: csv_input
//!     config: { path: "data/orders.csv" }
//!   - name: returns
//!     type: csv_input
//!     config: { path: "data/returns.csv" }
//!   - name: merged
//!     type: dummy
//!     merge: { policy: priority, order: [returns, orders], wait_ms: 20 }
//!   - name: out
//!     type: csv_output
//!     config: { path: "out/merged.csv" }
//! hops:
//!   - { from: orders, to: merged }
//!   - { from: returns, to: merged }
//!   - { from: merged, to: out }
//! ```

use serde::{Deserialize, Serialize};

use rowflow_core::prelude::{ErrorPolicy, Hop, PipelineGraph, StepDef};

use crate::error::PlanError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PipelineDoc {
    #[serde(default)]
    name: String,
    #[serde(default)]
    config: Option<PipelineConfig>,
    steps: Vec<StepDef>,
    #[serde(default)]
    hops: Vec<Hop>,
}

/// Engine settings a pipeline file may override. Unset fields keep whatever
/// the caller already had (defaults or environment).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub rowset_capacity: Option<usize>,
    pub put_timeout_ms: Option<u64>,
    pub get_timeout_ms: Option<u64>,
    pub round_robin_block_rows: Option<usize>,
    pub error_policy: Option<ErrorPolicy>,
}

#[derive(Debug, Clone)]
pub struct ParsedPipeline {
    pub graph: PipelineGraph,
    pub config: PipelineConfig,
}

/// Parse and validate a YAML pipeline definition.
pub fn parse_yaml_pipeline(yaml_src: &str) -> Result<ParsedPipeline, PlanError> {
    let doc: PipelineDoc = serde_yaml::from_str(yaml_src)?;
    let graph = PipelineGraph {
        name: doc.name,
        steps: doc.steps,
        hops: doc.hops,
    };
    graph.validate()?;
    Ok(ParsedPipeline {
        graph,
        config: doc.config.unwrap_or_default(),
    })
}
