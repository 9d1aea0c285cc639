//! Shared helpers for the end-to-end tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rowflow_core::prelude::{Record, Scalar, UnitKey};
use rowflow_exec::RowListener;
use rowflow_steps::{Emit, StepContext, StepError, Transform};

/// Upper bound for anything a test waits on.
pub const PATIENCE: Duration = Duration::from_secs(10);

/// Render the `value` field (or the first field) of a record.
pub fn value_of(record: &Record) -> String {
    record
        .get("value")
        .or_else(|| record.value(0))
        .map(|v| match v {
            Scalar::Str(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// Listener collecting what a unit reads, writes, and rejects.
#[derive(Default)]
pub struct Collector {
    pub read: Mutex<Vec<Record>>,
    pub written: Mutex<Vec<Record>>,
    pub rejected: Mutex<Vec<Record>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Values read, concatenated: `"aabbc"`.
    pub fn read_string(&self) -> String {
        self.read.lock().iter().map(value_of).collect()
    }

    pub fn read_values(&self) -> Vec<String> {
        self.read.lock().iter().map(value_of).collect()
    }
}

impl RowListener for Collector {
    fn row_read(&self, _unit: &UnitKey, _input: usize, record: &Record) {
        self.read.lock().push(record.clone());
    }

    fn row_written(&self, _unit: &UnitKey, record: &Record) {
        self.written.lock().push(record.clone());
    }

    fn error_row_written(&self, _unit: &UnitKey, record: &Record) {
        self.rejected.lock().push(record.clone());
    }
}

/// Holds sources back until released, then reports when they finished.
#[derive(Default)]
pub struct Gate {
    released: Mutex<bool>,
    released_cv: Condvar,
    finished: Mutex<usize>,
    finished_cv: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn release(&self) {
        *self.released.lock() = true;
        self.released_cv.notify_all();
    }

    pub fn wait_released(&self) {
        let deadline = Instant::now() + PATIENCE;
        let mut released = self.released.lock();
        while !*released {
            if self.released_cv.wait_until(&mut released, deadline).timed_out() {
                return;
            }
        }
    }

    fn source_finished(&self) {
        *self.finished.lock() += 1;
        self.finished_cv.notify_all();
    }

    /// Wait until `n` held sources have delivered everything.
    pub fn wait_finished(&self, n: usize) {
        let deadline = Instant::now() + PATIENCE;
        let mut finished = self.finished.lock();
        while *finished < n {
            if self.finished_cv.wait_until(&mut finished, deadline).timed_out() {
                return;
            }
        }
    }
}

/// Source emitting its `rows` config in one batch once the gate opens.
pub struct HeldSource {
    gate: Arc<Gate>,
    rows: Option<Vec<Record>>,
}

impl HeldSource {
    pub fn from_context(ctx: &StepContext, gate: Arc<Gate>) -> Result<Self, StepError> {
        let values: Vec<String> = ctx.parse_config::<HeldConfig>()?.rows;
        Ok(Self {
            gate,
            rows: Some(values.into_iter().map(|v| Record::text("value", v)).collect()),
        })
    }
}

#[derive(Default, serde::Deserialize)]
struct HeldConfig {
    #[serde(default)]
    rows: Vec<String>,
}

impl Transform for HeldSource {
    fn name(&self) -> &str {
        "held"
    }

    fn process(&mut self, _input: Option<Record>) -> Result<Emit, StepError> {
        match self.rows.take() {
            Some(rows) => {
                self.gate.wait_released();
                Ok(Emit::Rows(rows))
            }
            None => Ok(Emit::Exhausted),
        }
    }

    fn finish(&mut self) -> Result<Vec<Record>, StepError> {
        self.gate.source_finished();
        Ok(Vec::new())
    }
}

/// Listener that opens the gate on the first read and blocks the reading
/// unit until `sources` held sources are done.
pub struct OpenGateOnFirstRead {
    pub gate: Arc<Gate>,
    pub sources: usize,
    opened: Mutex<bool>,
}

impl OpenGateOnFirstRead {
    pub fn new(gate: Arc<Gate>, sources: usize) -> Arc<Self> {
        Arc::new(Self {
            gate,
            sources,
            opened: Mutex::new(false),
        })
    }
}

impl RowListener for OpenGateOnFirstRead {
    fn row_read(&self, _unit: &UnitKey, _input: usize, _record: &Record) {
        let mut opened = self.opened.lock();
        if !*opened {
            *opened = true;
            self.gate.release();
            self.gate.wait_finished(self.sources);
        }
    }
}

/// Poll `cond` until it holds or `PATIENCE` runs out.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
