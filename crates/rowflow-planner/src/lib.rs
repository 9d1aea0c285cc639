#![forbid(unsafe_code)]
//! rowflow-planner: pipeline definitions → validated `PipelineGraph`.
//!
//! - tiny YAML DSL → `PipelineGraph` + engine config overrides
//! - `explain`: a readable account of what the engine will build for a graph
//!   (start order, copies, merges, row sets) without running anything
//!
//! No threads and no step instantiation here; `rowflow-exec` does that.

pub mod dsl;
pub mod error;
pub mod explain;

pub use dsl::yaml::{parse_yaml_pipeline, ParsedPipeline, PipelineConfig};
pub use error::PlanError;
pub use explain::explain;
