//! Stream-merge policies: which input row set a unit pulls from next.
//!
//! A merge is owned by exactly one unit and is the only thing that dequeues
//! from that unit's inputs. Every strategy reports end-of-stream only when
//! all inputs are done and empty, and returns `Pull::Cancelled` promptly
//! once the run is cancelled.

mod priority;
mod round_robin;
mod single;

use std::sync::Arc;
use std::time::Duration;

use rowflow_core::prelude::{EngineConfig, MergeSpec, Record};

use crate::control::RunControl;
use crate::rowset::RowSet;

pub use priority::PriorityMerge;
pub use round_robin::RoundRobin;
pub use single::SingleInput;

#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    /// A record dequeued from `inputs[input]`.
    Row { input: usize, record: Record },
    /// Every input is done and empty.
    Exhausted,
    Cancelled,
}

pub trait InputMerge: Send {
    fn name(&self) -> &'static str;

    /// Block (in bounded slices) until a record, end-of-stream, or cancellation.
    fn next(&mut self, inputs: &[Arc<RowSet>], control: &RunControl) -> Pull;
}

/// Merge strategy selected by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePolicy {
    Single { wait: Duration },
    RoundRobin { block_rows: usize, wait: Duration },
    /// `wait` is the bounded pause before rescanning when no input has data.
    /// Too short and slow high-priority producers look empty, so the observed
    /// order drifts toward round-robin; too long and the unit idles on inputs
    /// that have nothing more to give.
    Priority { wait: Duration },
}

impl MergePolicy {
    /// Policy for a step with `inputs` input row sets.
    pub fn from_spec(spec: Option<&MergeSpec>, inputs: usize, cfg: &EngineConfig) -> Self {
        match spec {
            Some(MergeSpec::Priority { wait_ms, .. }) => MergePolicy::Priority {
                wait: Duration::from_millis(*wait_ms),
            },
            Some(MergeSpec::RoundRobin { block_rows }) => MergePolicy::RoundRobin {
                block_rows: block_rows.unwrap_or(cfg.round_robin_block_rows),
                wait: cfg.get_timeout(),
            },
            None if inputs > 1 => MergePolicy::RoundRobin {
                block_rows: cfg.round_robin_block_rows,
                wait: cfg.get_timeout(),
            },
            None => MergePolicy::Single {
                wait: cfg.get_timeout(),
            },
        }
    }

    pub fn build(&self) -> Box<dyn InputMerge> {
        match *self {
            MergePolicy::Single { wait } => Box::new(SingleInput::new(wait)),
            MergePolicy::RoundRobin { block_rows, wait } => {
                Box::new(RoundRobin::new(block_rows, wait))
            }
            MergePolicy::Priority { wait } => Box::new(PriorityMerge::new(wait)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MergePolicy::Single { .. } => "single",
            MergePolicy::RoundRobin { .. } => "round_robin",
            MergePolicy::Priority { .. } => "priority",
        }
    }
}
