//! Convenient re-exports for downstream crates.

pub use crate::config::{EngineConfig, ErrorPolicy};
pub use crate::error::{Error, Result};
pub use crate::graph::{
    Dispatch, ErrorHandling, Hop, MergeSpec, OutputMode, PipelineGraph, StepDef,
};
pub use crate::id::{RowSetId, RowSetName, UnitKey};
pub use crate::manifest::{ManifestId, RunManifest};
pub use crate::record::{Record, Scalar};
pub use crate::schema::{DataType, Field, Schema};
