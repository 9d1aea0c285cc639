use std::sync::Arc;
use std::time::Duration;

use crate::control::RunControl;
use crate::merge::{InputMerge, Pull};
use crate::rowset::RowSet;

/// Passthrough for a unit with one input.
#[derive(Debug)]
pub struct SingleInput {
    wait: Duration,
}

impl SingleInput {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

impl InputMerge for SingleInput {
    fn name(&self) -> &'static str {
        "single"
    }

    fn next(&mut self, inputs: &[Arc<RowSet>], control: &RunControl) -> Pull {
        let Some(rs) = inputs.first() else {
            return Pull::Exhausted;
        };
        loop {
            if control.is_cancelled() {
                return Pull::Cancelled;
            }
            // Read `done` before `get`: done-then-empty means nothing is coming.
            let done = rs.is_done();
            if let Some(record) = rs.get() {
                return Pull::Row { input: 0, record };
            }
            if done {
                return Pull::Exhausted;
            }
            rs.wait_for_data(self.wait);
        }
    }
}
