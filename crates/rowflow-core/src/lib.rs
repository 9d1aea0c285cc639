#![forbid(unsafe_code)]
//! rowflow-core: shared vocabulary for the rowflow engine.
//!
//! Records, schemas, unit/row-set identities, engine configuration, pipeline
//! graphs (with build-time validation), hashing, and run manifests. No threads
//! and no I/O live here; `rowflow-exec` drives everything at runtime.

pub mod config;
pub mod error;
pub mod graph;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod prelude;
pub mod record;
pub mod schema;

pub use error::{Error, Result};

/// Engine version string stamped into run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
