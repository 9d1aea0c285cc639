//! Sleeps before passing each record on. Used to simulate slow external work.

use std::time::Duration;

use rowflow_core::prelude::Record;
use serde::Deserialize;

use crate::traits::{Emit, StepContext, StepError, Transform};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DelayConfig {
    delay_ms: u64,
}

#[derive(Debug)]
pub struct Delay {
    delay: Duration,
}

impl Delay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_context(ctx: &StepContext) -> Result<Self, StepError> {
        let cfg: DelayConfig = ctx.parse_config()?;
        Ok(Self::new(Duration::from_millis(cfg.delay_ms)))
    }
}

impl Transform for Delay {
    fn name(&self) -> &str {
        "delay"
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        let Some(record) = input else {
            return Ok(Emit::Exhausted);
        };
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(Emit::one(record))
    }
}
