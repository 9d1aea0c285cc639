//! Fails the unit once more than `threshold` rows have arrived.
//!
//! Rows up to the threshold pass through untouched, so downstream sees the
//! partial output produced before the abort.

use rowflow_core::prelude::Record;
use serde::Deserialize;

use crate::traits::{Emit, StepContext, StepError, Transform};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AbortConfig {
    threshold: u64,
    message: Option<String>,
}

#[derive(Debug)]
pub struct Abort {
    threshold: u64,
    message: Option<String>,
    seen: u64,
}

impl Abort {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            message: None,
            seen: 0,
        }
    }

    pub fn from_context(ctx: &StepContext) -> Result<Self, StepError> {
        let cfg: AbortConfig = ctx.parse_config()?;
        Ok(Self {
            threshold: cfg.threshold,
            message: cfg.message,
            seen: 0,
        })
    }
}

impl Transform for Abort {
    fn name(&self) -> &str {
        "abort"
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        let Some(record) = input else {
            return Ok(Emit::Exhausted);
        };
        self.seen += 1;
        if self.seen > self.threshold {
            let msg = self
                .message
                .clone()
                .unwrap_or_else(|| format!("aborting after {} rows", self.threshold));
            return Err(StepError::Fatal(msg));
        }
        Ok(Emit::one(record))
    }
}
