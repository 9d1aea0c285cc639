//! Passthrough step. As a source it is immediately exhausted.

use rowflow_core::prelude::Record;

use crate::traits::{Emit, StepError, Transform};

#[derive(Debug, Default)]
pub struct Dummy;

impl Transform for Dummy {
    fn name(&self) -> &str {
        "dummy"
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        Ok(match input {
            Some(record) => Emit::one(record),
            None => Emit::Exhausted,
        })
    }
}
