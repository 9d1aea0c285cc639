//! Priority-ordered merge. Inputs are wired highest priority first.
//!
//! Each pull scans from the scan-start pointer in priority order and takes
//! from the first input holding data. The pointer only ever moves past inputs
//! that are done *and* empty, so it always names the highest-priority input
//! that may still deliver, and a late but live high-priority input is
//! rechecked first on every pull.
//!
//! When no input has data but some input is still live, the merge waits up to
//! `wait` on the highest-priority live input and rescans. End-of-stream is
//! reported only once every input is exhausted.

use std::sync::Arc;
use std::time::Duration;

use crate::control::RunControl;
use crate::merge::{InputMerge, Pull};
use crate::rowset::RowSet;

#[derive(Debug)]
pub struct PriorityMerge {
    wait: Duration,
    pointer: usize,
}

impl PriorityMerge {
    pub fn new(wait: Duration) -> Self {
        Self { wait, pointer: 0 }
    }
}

impl InputMerge for PriorityMerge {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn next(&mut self, inputs: &[Arc<RowSet>], control: &RunControl) -> Pull {
        let n = inputs.len();
        loop {
            if control.is_cancelled() {
                return Pull::Cancelled;
            }

            while self.pointer < n && inputs[self.pointer].is_exhausted() {
                self.pointer += 1;
            }
            if self.pointer >= n {
                return Pull::Exhausted;
            }

            let mut any_live = false;
            for (idx, rs) in inputs.iter().enumerate().skip(self.pointer) {
                let done = rs.is_done();
                if let Some(record) = rs.get() {
                    return Pull::Row { input: idx, record };
                }
                if !done {
                    any_live = true;
                }
            }
            if any_live {
                inputs[self.pointer].wait_for_data(self.wait);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::test_support::{drain, input, WAIT};
    use rowflow_core::prelude::{ErrorPolicy, Record};
    use std::thread;

    fn control() -> RunControl {
        RunControl::new(ErrorPolicy::StopOnError)
    }

    #[test]
    fn strict_priority_when_all_available() {
        let inputs = vec![
            input("b", &["b", "b", "b"], true),
            input("a", &["a", "a", "a"], true),
            input("c", &["c", "c", "c"], true),
        ];
        assert_eq!(
            drain(&mut PriorityMerge::new(WAIT), &inputs, &control()),
            "bbbaaaccc"
        );
    }

    #[test]
    fn lower_priority_flows_once_higher_is_done() {
        let inputs = vec![input("a", &[], true), input("b", &["b", "b"], false)];
        let mut m = PriorityMerge::new(WAIT);
        let c = control();
        assert!(matches!(m.next(&inputs, &c), Pull::Row { input: 1, .. }));
        assert!(matches!(m.next(&inputs, &c), Pull::Row { input: 1, .. }));
        inputs[1].set_done();
        assert_eq!(m.next(&inputs, &c), Pull::Exhausted);
    }

    #[test]
    fn empty_live_input_is_not_treated_as_exhausted() {
        let high = input("high", &[], false);
        let low = input("low", &["l"], true);
        let inputs = vec![Arc::clone(&high), low];
        let mut m = PriorityMerge::new(WAIT);
        let c = control();

        // high is live but empty: take from low, keep the pointer on high
        assert!(matches!(m.next(&inputs, &c), Pull::Row { input: 1, .. }));
        high.put(Record::text("v", "h"), WAIT);
        assert!(matches!(m.next(&inputs, &c), Pull::Row { input: 0, .. }));

        let producer = {
            let high = Arc::clone(&high);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                high.put(Record::text("v", "late"), WAIT);
                high.set_done();
            })
        };
        match m.next(&inputs, &c) {
            Pull::Row { input, record } => {
                assert_eq!(input, 0);
                assert_eq!(record, Record::text("v", "late"));
            }
            other => panic!("expected late row, got {other:?}"),
        }
        assert_eq!(m.next(&inputs, &c), Pull::Exhausted);
        producer.join().unwrap();
    }

    #[test]
    fn cancelled_while_waiting() {
        let inputs = vec![input("a", &[], false)];
        let c = control();
        c.cancel();
        assert_eq!(PriorityMerge::new(WAIT).next(&inputs, &c), Pull::Cancelled);
    }
}
