#![forbid(unsafe_code)]
//! rowflow-exec: the dataflow runtime.
//!
//! One OS thread per step copy ([`unit::StepExecutionUnit`]), bounded
//! [`rowset::RowSet`] queues between them, pluggable stream merges for units
//! with several inputs, and the [`pipeline::Pipeline`] orchestrator that wires,
//! starts, observes, and tears the graph down. Cancellation is cooperative and
//! every blocking point is bounded by a configured timeout.

pub mod control;
pub mod error;
pub mod failpoints;
pub mod listener;
pub mod merge;
pub mod pipeline;
pub mod producer;
pub mod result;
pub mod rowset;
pub mod runtime;
pub mod unit;
mod wiring;

pub use control::RunControl;
pub use error::ExecError;
pub use listener::RowListener;
pub use merge::{InputMerge, MergePolicy, Pull};
pub use pipeline::{Pipeline, UnitSnapshot};
pub use producer::RowProducer;
pub use result::{FatalError, PipelineResult, Totals, UnitReport};
pub use rowset::{PutOutcome, RowSet};
pub use runtime::Engine;
pub use unit::{UnitState, UnitStatus};
