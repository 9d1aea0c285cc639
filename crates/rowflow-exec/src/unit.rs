//! Step execution unit: one step copy running its pull -> transform -> push
//! loop on a dedicated thread.
//!
//! Lifecycle: `Init -> Running -> {Done, Stopped, Error}`; terminal states
//! never change. The state and counters live in a shared [`UnitStatus`] so the
//! orchestrator can observe a running unit without touching it.
//!
//! Every exit path marks all outputs done, closes all inputs (so upstream
//! producers never block on a consumer that left), and disposes the transform.
//! That includes a panic inside the transform and a unit dropped without ever
//! being run.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rowflow_core::prelude::{
    DataType, EngineConfig, ErrorHandling, Field, OutputMode, Record, Scalar, UnitKey,
};
use rowflow_steps::{Emit, RowError, StepError, Transform};
use serde::Serialize;
use tracing::{debug, error, info, info_span, trace, warn};

use crate::control::RunControl;
use crate::listener::RowListener;
use crate::merge::{InputMerge, MergePolicy, Pull};
use crate::result::UnitReport;
use crate::rowset::{PutOutcome, RowSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum UnitState {
    Init = 0,
    Running = 1,
    Done = 2,
    Stopped = 3,
    Error = 4,
}

impl UnitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => UnitState::Init,
            1 => UnitState::Running,
            2 => UnitState::Done,
            3 => UnitState::Stopped,
            _ => UnitState::Error,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Done | UnitState::Stopped | UnitState::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitState::Init => "init",
            UnitState::Running => "running",
            UnitState::Done => "done",
            UnitState::Stopped => "stopped",
            UnitState::Error => "error",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free view of one unit: lifecycle state plus counters.
#[derive(Debug)]
pub struct UnitStatus {
    key: UnitKey,
    state: AtomicU8,
    read: AtomicU64,
    written: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
    fatal: Mutex<Option<String>>,
}

impl UnitStatus {
    pub fn new(key: UnitKey) -> Self {
        Self {
            key,
            state: AtomicU8::new(UnitState::Init as u8),
            read: AtomicU64::new(0),
            written: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            fatal: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &UnitKey {
        &self.key
    }

    pub fn state(&self) -> UnitState {
        UnitState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn fatal_message(&self) -> Option<String> {
        self.fatal.lock().clone()
    }

    fn start(&self) {
        let _ = self.state.compare_exchange(
            UnitState::Init as u8,
            UnitState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn terminate(&self, end: UnitState) {
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                (!UnitState::from_u8(cur).is_terminal()).then_some(end as u8)
            });
    }

    fn fail(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(message.to_string());
        }
    }

    pub fn report(&self) -> UnitReport {
        UnitReport {
            unit: self.key.clone(),
            state: self.state(),
            read: self.read(),
            written: self.written(),
            rejected: self.rejected(),
            errors: self.errors(),
            fatal: self.fatal_message(),
        }
    }
}

/// Where rejected rows go and when rejection becomes fatal.
pub(crate) struct ErrorRoute {
    outputs: Vec<Arc<RowSet>>,
    limits: ErrorHandling,
    next: usize,
}

impl ErrorRoute {
    pub(crate) fn new(outputs: Vec<Arc<RowSet>>, limits: ErrorHandling) -> Self {
        Self {
            outputs,
            limits,
            next: 0,
        }
    }

    /// `Some(message)` once the rejection limits are exceeded.
    fn check_limits(&self, rejected: u64, read: u64) -> Option<String> {
        // Zero means unlimited for both limits.
        if let Some(max) = self.limits.max_errors.filter(|&m| m > 0) {
            if rejected > max {
                return Some(format!(
                    "too many rejected rows: {rejected} exceeds max_errors {max}"
                ));
            }
        }
        if let Some(max_pct) = self.limits.max_percent_errors.filter(|&p| p > 0) {
            let min_rows = self.limits.min_rows_for_percent.unwrap_or(0);
            if rejected > 0 && read >= min_rows {
                // A source reads nothing, so each of its rejections counts fully.
                let pct = if read == 0 { 100 } else { rejected * 100 / read };
                if pct > u64::from(max_pct) {
                    return Some(format!(
                        "{pct}% of rows rejected ({rejected} of {read}) exceeds max_percent_errors {max_pct}"
                    ));
                }
            }
        }
        None
    }
}

enum Delivery {
    Accepted,
    Closed(Record),
    Cancelled,
}

/// Blocking put: retry on timeout until accepted, closed, or cancelled.
fn deliver(rs: &RowSet, record: Record, timeout: Duration, control: &RunControl) -> Delivery {
    let mut record = record;
    loop {
        match rs.put(record, timeout) {
            PutOutcome::Accepted => return Delivery::Accepted,
            PutOutcome::Closed(r) => return Delivery::Closed(r),
            PutOutcome::TimedOut(r) => {
                if control.is_cancelled() {
                    return Delivery::Cancelled;
                }
                trace!(rowset = %rs.name(), "output full, retrying put");
                record = r;
            }
        }
    }
}

/// The rejected record extended with the error description fields.
fn error_row(e: &RowError) -> Result<Record, String> {
    let text = |v: &Option<String>| v.clone().map(Scalar::Str).unwrap_or(Scalar::Null);
    e.record
        .with_appended(
            &[
                Field::new("error_count", DataType::Int64, false),
                Field::new("error_description", DataType::Utf8, true),
                Field::new("error_field", DataType::Utf8, true),
                Field::new("error_code", DataType::Utf8, true),
            ],
            vec![
                Scalar::I64(1),
                Scalar::Str(e.description.clone()),
                text(&e.field),
                text(&e.code),
            ],
        )
        .map_err(|err| format!("cannot build error row: {err}"))
}

pub struct StepExecutionUnit {
    key: UnitKey,
    transform: Box<dyn Transform>,
    inputs: Vec<Arc<RowSet>>,
    outputs: Vec<Arc<RowSet>>,
    output_mode: OutputMode,
    next_output: usize,
    error_route: Option<ErrorRoute>,
    merge: MergePolicy,
    control: Arc<RunControl>,
    status: Arc<UnitStatus>,
    listeners: Vec<Arc<dyn RowListener>>,
    put_timeout: Duration,
    pause_slice: Duration,
    finished: bool,
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl StepExecutionUnit {
    pub(crate) fn new(
        key: UnitKey,
        transform: Box<dyn Transform>,
        control: Arc<RunControl>,
        config: &EngineConfig,
    ) -> Self {
        let status = Arc::new(UnitStatus::new(key.clone()));
        Self {
            key,
            transform,
            inputs: Vec::new(),
            outputs: Vec::new(),
            output_mode: OutputMode::Copy,
            next_output: 0,
            error_route: None,
            merge: MergePolicy::Single {
                wait: config.get_timeout(),
            },
            control,
            status,
            listeners: Vec::new(),
            put_timeout: config.put_timeout(),
            pause_slice: config.get_timeout(),
            finished: false,
        }
    }

    pub(crate) fn with_inputs(mut self, inputs: Vec<Arc<RowSet>>) -> Self {
        self.inputs = inputs;
        self
    }

    pub(crate) fn with_outputs(mut self, outputs: Vec<Arc<RowSet>>, mode: OutputMode) -> Self {
        self.outputs = outputs;
        self.output_mode = mode;
        self
    }

    pub(crate) fn with_error_route(mut self, route: Option<ErrorRoute>) -> Self {
        self.error_route = route;
        self
    }

    pub(crate) fn with_merge(mut self, merge: MergePolicy) -> Self {
        self.merge = merge;
        self
    }

    pub(crate) fn add_input(&mut self, rs: Arc<RowSet>) {
        self.inputs.push(rs);
    }

    pub(crate) fn add_listener(&mut self, listener: Arc<dyn RowListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn merge_policy(&self) -> &MergePolicy {
        &self.merge
    }

    pub(crate) fn set_merge_policy(&mut self, merge: MergePolicy) {
        self.merge = merge;
    }

    pub fn key(&self) -> &UnitKey {
        &self.key
    }

    pub fn status(&self) -> Arc<UnitStatus> {
        Arc::clone(&self.status)
    }

    pub fn inputs(&self) -> &[Arc<RowSet>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<RowSet>] {
        &self.outputs
    }

    fn all_outputs(&self) -> impl Iterator<Item = &Arc<RowSet>> {
        let errors = self.error_route.iter().flat_map(|r| r.outputs.iter());
        self.outputs.iter().chain(errors)
    }

    /// Handles the orchestrator keeps to finish the unit if its thread panics.
    pub(crate) fn exit_guard(&self) -> ExitGuard {
        ExitGuard {
            key: self.key.clone(),
            inputs: self.inputs.clone(),
            outputs: self.all_outputs().cloned().collect(),
            status: Arc::clone(&self.status),
            control: Arc::clone(&self.control),
        }
    }

    /// Run to a terminal state. Called once, on the unit's own thread.
    pub fn run(mut self) -> UnitState {
        let span = info_span!("unit", step = %self.key.step, copy = self.key.copy);
        let _enter = span.enter();

        self.status.start();
        let mut merge = self.merge.build();
        debug!(
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            merge = merge.name(),
            "unit running"
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_loop(merge.as_mut())));
        let end = match outcome {
            Ok(Ok(end)) => end,
            Ok(Err(message)) => self.fail(message),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.fail(format!("unit panicked: {message}"))
            }
        };
        self.shutdown(end);
        end
    }

    fn fail(&self, message: String) -> UnitState {
        error!(error = %message, "unit failed");
        self.status.fail(&message);
        self.control.record_fatal(&self.key, &message);
        UnitState::Error
    }

    fn shutdown(&mut self, end: UnitState) {
        self.finished = true;
        for rs in self.all_outputs() {
            rs.set_done();
        }
        for rs in &self.inputs {
            rs.close();
        }
        self.transform.dispose();
        self.status.terminate(end);
        match end {
            UnitState::Stopped => info!(
                read = self.status.read(),
                written = self.status.written(),
                "unit stopped"
            ),
            _ => debug!(
                state = %end,
                read = self.status.read(),
                written = self.status.written(),
                rejected = self.status.rejected(),
                "unit finished"
            ),
        }
    }

    fn run_loop(&mut self, merge: &mut dyn InputMerge) -> Result<UnitState, String> {
        loop {
            if self.control.is_cancelled() {
                info!("cancellation observed");
                return Ok(UnitState::Stopped);
            }
            if self.control.is_paused() {
                self.control.wait_while_paused(self.pause_slice);
                continue;
            }

            let input = if self.inputs.is_empty() {
                if self.control.is_safe_stopping() {
                    debug!("safe stop: source finishing");
                    return self.complete();
                }
                None
            } else {
                match merge.next(&self.inputs, &self.control) {
                    Pull::Row { input, record } => {
                        self.status.read.fetch_add(1, Ordering::Relaxed);
                        trace!(input, "row read");
                        for l in &self.listeners {
                            l.row_read(&self.key, input, &record);
                        }
                        Some(record)
                    }
                    Pull::Exhausted => return self.complete(),
                    Pull::Cancelled => {
                        info!("cancellation observed");
                        return Ok(UnitState::Stopped);
                    }
                }
            };

            crate::fail_point!(self.key.step.as_str());

            let is_source = input.is_none();
            match self.transform.process(input) {
                Ok(Emit::Rows(rows)) => {
                    if let Some(end) = self.emit_all(rows) {
                        return Ok(end);
                    }
                }
                Ok(Emit::Exhausted) => {
                    if !is_source {
                        debug!("transform wants no more input");
                    }
                    return self.complete();
                }
                Err(StepError::Row(e)) => {
                    if let Some(end) = self.reject(e)? {
                        return Ok(end);
                    }
                }
                Err(StepError::Fatal(message)) => return Err(message),
            }
        }
    }

    /// All input consumed: flush trailing rows from the transform.
    fn complete(&mut self) -> Result<UnitState, String> {
        match self.transform.finish() {
            Ok(rows) => {
                if let Some(end) = self.emit_all(rows) {
                    return Ok(end);
                }
            }
            Err(StepError::Row(e)) => {
                if let Some(end) = self.reject(e)? {
                    return Ok(end);
                }
            }
            Err(StepError::Fatal(message)) => return Err(message),
        }
        Ok(UnitState::Done)
    }

    fn emit_all(&mut self, rows: Vec<Record>) -> Option<UnitState> {
        for row in rows {
            if let Some(end) = self.emit(row) {
                return Some(end);
            }
        }
        None
    }

    /// Fan one record out. `Some(state)` ends the unit.
    fn emit(&mut self, row: Record) -> Option<UnitState> {
        self.status.written.fetch_add(1, Ordering::Relaxed);
        for l in &self.listeners {
            l.row_written(&self.key, &row);
        }
        if self.outputs.is_empty() {
            return None;
        }

        match self.output_mode {
            OutputMode::Copy => {
                let n = self.outputs.len();
                let mut pending = Some(row);
                let mut closed = Vec::new();
                for idx in 0..n {
                    let record = if idx + 1 == n {
                        pending.take()
                    } else {
                        pending.clone()
                    };
                    let Some(record) = record else { break };
                    match deliver(&self.outputs[idx], record, self.put_timeout, &self.control) {
                        Delivery::Accepted => {}
                        Delivery::Closed(_) => closed.push(idx),
                        Delivery::Cancelled => return Some(UnitState::Stopped),
                    }
                }
                for idx in closed.into_iter().rev() {
                    self.drop_output(idx);
                }
            }
            OutputMode::Distribute => {
                let mut record = row;
                while !self.outputs.is_empty() {
                    let idx = self.next_output % self.outputs.len();
                    self.next_output = idx + 1;
                    match deliver(&self.outputs[idx], record, self.put_timeout, &self.control) {
                        Delivery::Accepted => return None,
                        Delivery::Cancelled => return Some(UnitState::Stopped),
                        Delivery::Closed(r) => {
                            self.drop_output(idx);
                            record = r;
                        }
                    }
                }
            }
        }

        if self.outputs.is_empty() {
            info!("every output closed by its consumer; stopping early");
            return Some(UnitState::Stopped);
        }
        None
    }

    fn drop_output(&mut self, idx: usize) {
        let rs = self.outputs.remove(idx);
        warn!(rowset = %rs.name(), "downstream closed its input; dropping output");
    }

    /// Route a rejected row. `Err` escalates to a unit-fatal error.
    fn reject(&mut self, e: RowError) -> Result<Option<UnitState>, String> {
        let Some(route) = self.error_route.as_mut() else {
            return Err(match &e.field {
                Some(field) => format!("row error in field '{field}': {}", e.description),
                None => format!("row error: {}", e.description),
            });
        };

        let row = error_row(&e)?;
        let rejected = self.status.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(error = %e.description, "row rejected");
        for l in &self.listeners {
            l.error_row_written(&self.key, &row);
        }

        let mut record = row;
        loop {
            if route.outputs.is_empty() {
                return Err("error target closed its input; cannot route rejected row".into());
            }
            let idx = route.next % route.outputs.len();
            route.next = idx + 1;
            match deliver(&route.outputs[idx], record, self.put_timeout, &self.control) {
                Delivery::Accepted => break,
                Delivery::Cancelled => return Ok(Some(UnitState::Stopped)),
                Delivery::Closed(r) => {
                    let rs = route.outputs.remove(idx);
                    warn!(rowset = %rs.name(), "error target closed its input");
                    record = r;
                }
            }
        }

        match route.check_limits(rejected, self.status.read()) {
            Some(message) => Err(message),
            None => Ok(None),
        }
    }
}

impl Drop for StepExecutionUnit {
    /// A unit that never ran (pipeline dropped before start, or its thread
    /// failed to spawn) still releases its row sets and its transform.
    fn drop(&mut self) {
        if !self.finished {
            debug!(unit = %self.key, "unit dropped before running");
            let end = if std::thread::panicking() {
                UnitState::Error
            } else {
                UnitState::Stopped
            };
            self.shutdown(end);
        }
    }
}

/// Finishes a unit whose thread panicked outside the transform loop, e.g. in
/// `dispose`: the unit itself is gone by then.
pub(crate) struct ExitGuard {
    key: UnitKey,
    inputs: Vec<Arc<RowSet>>,
    outputs: Vec<Arc<RowSet>>,
    status: Arc<UnitStatus>,
    control: Arc<RunControl>,
}

impl ExitGuard {
    pub(crate) fn panicked(&self, message: String) -> UnitState {
        let message = format!("unit panicked: {message}");
        error!(unit = %self.key, error = %message, "unit thread panicked");
        self.status.fail(&message);
        self.control.record_fatal(&self.key, &message);
        for rs in &self.outputs {
            rs.set_done();
        }
        for rs in &self.inputs {
            rs.close();
        }
        self.status.terminate(UnitState::Error);
        UnitState::Error
    }
}
