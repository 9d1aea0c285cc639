//! Bounded FIFO queue between exactly one producer unit and one consumer unit.
//!
//! - `put` blocks until there is room or the timeout elapses. A timeout hands
//!   the record back (`PutOutcome::TimedOut`); nothing is ever dropped.
//! - `get` never blocks. An empty result is *not* end-of-stream: the stream
//!   has ended only when [`RowSet::is_exhausted`] (done and empty).
//! - `set_done` is one-way and idempotent.
//! - `close` is the consumer walking away. Buffered rows are discarded and
//!   later puts return `Closed` at once, so a producer never blocks forever
//!   on a dead consumer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rowflow_core::prelude::{Record, RowSetId, RowSetName, Schema};

#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    Accepted,
    /// Still full after the timeout; the caller owns the record again.
    TimedOut(Record),
    /// The consumer closed this row set; the record was not enqueued.
    Closed(Record),
}

#[derive(Debug, Default)]
struct Buffer {
    rows: VecDeque<Record>,
    schema: Option<Arc<Schema>>,
    done: bool,
    closed: bool,
}

#[derive(Debug)]
pub struct RowSet {
    id: RowSetId,
    name: RowSetName,
    capacity: usize,
    buf: Mutex<Buffer>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl RowSet {
    pub fn new(id: RowSetId, name: RowSetName, capacity: usize) -> Self {
        Self {
            id,
            name,
            capacity: capacity.max(1),
            buf: Mutex::new(Buffer::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Enqueue `record`, waiting up to `timeout` for room.
    ///
    /// Must not be called after `set_done`.
    pub fn put(&self, record: Record, timeout: Duration) -> PutOutcome {
        let deadline = Instant::now() + timeout;
        let mut buf = self.buf.lock();
        debug_assert!(!buf.done, "put on finished row set {}", self.name);
        loop {
            if buf.closed {
                return PutOutcome::Closed(record);
            }
            if buf.rows.len() < self.capacity {
                break;
            }
            if self.not_full.wait_until(&mut buf, deadline).timed_out() {
                if buf.closed {
                    return PutOutcome::Closed(record);
                }
                if buf.rows.len() < self.capacity {
                    break;
                }
                return PutOutcome::TimedOut(record);
            }
        }
        if buf.schema.is_none() {
            buf.schema = Some(Arc::clone(record.schema()));
        }
        buf.rows.push_back(record);
        drop(buf);
        self.not_empty.notify_one();
        PutOutcome::Accepted
    }

    /// Dequeue the oldest record without blocking.
    pub fn get(&self) -> Option<Record> {
        let record = self.buf.lock().rows.pop_front();
        if record.is_some() {
            self.not_full.notify_one();
        }
        record
    }

    /// Dequeue, waiting up to `timeout` for a record. `None` on timeout or
    /// when the row set is exhausted.
    pub fn get_wait(&self, timeout: Duration) -> Option<Record> {
        let deadline = Instant::now() + timeout;
        let mut buf = self.buf.lock();
        loop {
            if let Some(record) = buf.rows.pop_front() {
                drop(buf);
                self.not_full.notify_one();
                return Some(record);
            }
            if buf.done || buf.closed {
                return None;
            }
            if self.not_empty.wait_until(&mut buf, deadline).timed_out() {
                let record = buf.rows.pop_front();
                drop(buf);
                if record.is_some() {
                    self.not_full.notify_one();
                }
                return record;
            }
        }
    }

    /// Wait up to `timeout` until a record is buffered. Returns `false` on
    /// timeout or once the row set is done and empty.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut buf = self.buf.lock();
        loop {
            if !buf.rows.is_empty() {
                return true;
            }
            if buf.done || buf.closed {
                return false;
            }
            if self.not_empty.wait_until(&mut buf, deadline).timed_out() {
                return !buf.rows.is_empty();
            }
        }
    }

    /// No further puts will occur.
    pub fn set_done(&self) {
        let mut buf = self.buf.lock();
        if buf.done {
            return;
        }
        buf.done = true;
        drop(buf);
        self.not_empty.notify_all();
    }

    /// The consumer abandons the stream.
    pub fn close(&self) {
        let mut buf = self.buf.lock();
        buf.closed = true;
        buf.rows.clear();
        drop(buf);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.buf.lock().done
    }

    pub fn is_closed(&self) -> bool {
        self.buf.lock().closed
    }

    /// Done and drained: no record will ever come out of this row set again.
    pub fn is_exhausted(&self) -> bool {
        let buf = self.buf.lock();
        buf.done && buf.rows.is_empty()
    }

    pub fn size(&self) -> usize {
        self.buf.lock().rows.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Schema of the first record ever accepted.
    pub fn schema(&self) -> Option<Arc<Schema>> {
        self.buf.lock().schema.clone()
    }

    pub fn name(&self) -> &RowSetName {
        &self.name
    }

    pub fn id(&self) -> RowSetId {
        self.id
    }
}
