use std::sync::Arc;
use std::time::Duration;

use crate::control::RunControl;
use crate::merge::{InputMerge, Pull};
use crate::rowset::RowSet;

/// Reads up to `block_rows` consecutive rows from one input, then moves on.
/// Inputs without data are skipped; exhausted ones are skipped for good.
#[derive(Debug)]
pub struct RoundRobin {
    block_rows: usize,
    wait: Duration,
    current: usize,
    in_block: usize,
}

impl RoundRobin {
    pub fn new(block_rows: usize, wait: Duration) -> Self {
        Self {
            block_rows: block_rows.max(1),
            wait,
            current: 0,
            in_block: 0,
        }
    }
}

impl InputMerge for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn next(&mut self, inputs: &[Arc<RowSet>], control: &RunControl) -> Pull {
        let n = inputs.len();
        if n == 0 {
            return Pull::Exhausted;
        }
        self.current %= n;

        loop {
            if control.is_cancelled() {
                return Pull::Cancelled;
            }

            let mut all_done = true;
            for step in 0..n {
                let idx = (self.current + step) % n;
                let rs = &inputs[idx];
                let done = rs.is_done();
                if let Some(record) = rs.get() {
                    if idx != self.current {
                        self.current = idx;
                        self.in_block = 0;
                    }
                    self.in_block += 1;
                    if self.in_block >= self.block_rows {
                        self.current = (idx + 1) % n;
                        self.in_block = 0;
                    }
                    return Pull::Row { input: idx, record };
                }
                if !done {
                    all_done = false;
                }
            }
            if all_done {
                return Pull::Exhausted;
            }

            let live = (0..n)
                .map(|step| (self.current + step) % n)
                .find(|&i| !inputs[i].is_done());
            if let Some(i) = live {
                inputs[i].wait_for_data(self.wait);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::test_support::{drain, input, WAIT};
    use rowflow_core::prelude::ErrorPolicy;

    #[test]
    fn alternates_in_blocks() {
        let control = RunControl::new(ErrorPolicy::StopOnError);
        let inputs = vec![
            input("a", &["a", "a", "a"], true),
            input("b", &["b", "b", "b"], true),
        ];
        assert_eq!(drain(&mut RoundRobin::new(1, WAIT), &inputs, &control), "ababab");

        let inputs = vec![
            input("a", &["a", "a", "a"], true),
            input("b", &["b", "b", "b"], true),
        ];
        assert_eq!(drain(&mut RoundRobin::new(2, WAIT), &inputs, &control), "aabbab");
    }

    #[test]
    fn skips_exhausted_inputs() {
        let control = RunControl::new(ErrorPolicy::StopOnError);
        let inputs = vec![
            input("a", &[], true),
            input("b", &["b"], true),
            input("c", &["c", "c"], true),
        ];
        assert_eq!(drain(&mut RoundRobin::new(1, WAIT), &inputs, &control), "bcc");
    }

    #[test]
    fn live_empty_input_delays_end_of_stream() {
        let control = RunControl::new(ErrorPolicy::StopOnError);
        let slow = input("slow", &[], false);
        let inputs = vec![input("a", &["a"], true), Arc::clone(&slow)];
        let mut rr = RoundRobin::new(1, WAIT);
        assert!(matches!(rr.next(&inputs, &control), Pull::Row { input: 0, .. }));
        slow.put(rowflow_core::prelude::Record::text("v", "s"), WAIT);
        slow.set_done();
        assert!(matches!(rr.next(&inputs, &control), Pull::Row { input: 1, .. }));
        assert_eq!(rr.next(&inputs, &control), Pull::Exhausted);
    }
}
