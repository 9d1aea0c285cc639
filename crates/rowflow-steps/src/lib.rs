#![forbid(unsafe_code)]
//! rowflow-steps: the per-row work a pipeline step performs.
//!
//! The execution engine treats every step as an opaque [`Transform`]: it pulls a
//! record, hands it over, and fans out whatever comes back. This crate defines
//! that contract, the kind-string [`Registry`] used to instantiate transforms
//! from pipeline definitions, and a handful of built-in steps so pipelines can
//! run end to end.

pub mod builtin;
pub mod registry;
pub mod traits;

pub use registry::Registry;
pub use traits::{Emit, RowError, StepContext, StepError, Transform};
