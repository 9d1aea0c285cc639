//! External row injection into a unit that has been wired before start.
//!
//! A [`RowProducer`] owns the producing side of one extra input row set. The
//! row set is marked done by [`RowProducer::finished`] or when the producer is
//! dropped, so the receiving unit can always reach end-of-stream.

use std::sync::Arc;
use std::time::Duration;

use rowflow_core::prelude::Record;

use crate::control::RunControl;
use crate::rowset::{PutOutcome, RowSet};

pub struct RowProducer {
    rowset: Arc<RowSet>,
    control: Arc<RunControl>,
    timeout: Duration,
}

impl RowProducer {
    pub(crate) fn new(rowset: Arc<RowSet>, control: Arc<RunControl>, timeout: Duration) -> Self {
        Self {
            rowset,
            control,
            timeout,
        }
    }

    /// One bounded attempt; see [`RowSet::put`].
    pub fn try_put(&self, record: Record) -> PutOutcome {
        self.rowset.put(record, self.timeout)
    }

    /// Block until the row is accepted. The record comes back if the
    /// consumer went away or the run was cancelled.
    pub fn put_row(&self, record: Record) -> Result<(), Record> {
        let mut record = record;
        loop {
            match self.rowset.put(record, self.timeout) {
                PutOutcome::Accepted => return Ok(()),
                PutOutcome::Closed(r) => return Err(r),
                PutOutcome::TimedOut(r) => {
                    if self.control.is_cancelled() {
                        return Err(r);
                    }
                    record = r;
                }
            }
        }
    }

    pub fn rowset(&self) -> &Arc<RowSet> {
        &self.rowset
    }

    /// No more rows will be injected.
    pub fn finished(self) {
        self.rowset.set_done();
    }
}

impl Drop for RowProducer {
    fn drop(&mut self) {
        self.rowset.set_done();
    }
}
