//! Pipeline-wide control state shared by every unit of one run.
//!
//! Created by the orchestrator and injected into each unit at construction;
//! never global. Units poll it at the top of every loop iteration and between
//! bounded waits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rowflow_core::prelude::{ErrorPolicy, UnitKey};

#[derive(Debug)]
pub struct RunControl {
    policy: ErrorPolicy,
    cancelled: AtomicBool,
    safe_stop: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    fatal_errors: AtomicU64,
}

impl RunControl {
    pub fn new(policy: ErrorPolicy) -> Self {
        Self {
            policy,
            cancelled: AtomicBool::new(false),
            safe_stop: AtomicBool::new(false),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            fatal_errors: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Ask every unit to stop at its next check. Also releases paused units.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _guard = self.paused.lock();
        self.resumed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sources stop producing; everything already produced drains normally.
    pub fn request_safe_stop(&self) {
        self.safe_stop.store(true, Ordering::SeqCst);
    }

    pub fn is_safe_stopping(&self) -> bool {
        self.safe_stop.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    pub fn resume(&self) {
        *self.paused.lock() = false;
        self.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Park while paused, re-checking cancellation every `slice`.
    pub fn wait_while_paused(&self, slice: Duration) {
        let mut paused = self.paused.lock();
        while *paused && !self.is_cancelled() {
            self.resumed.wait_for(&mut paused, slice);
        }
    }

    /// A unit failed. Under `StopOnError` the whole run is cancelled.
    pub fn record_fatal(&self, unit: &UnitKey, message: &str) {
        self.fatal_errors.fetch_add(1, Ordering::SeqCst);
        if self.policy == ErrorPolicy::StopOnError {
            tracing::info!(%unit, error = message, "stopping pipeline after unit failure");
            self.cancel();
        }
    }

    pub fn fatal_errors(&self) -> u64 {
        self.fatal_errors.load(Ordering::SeqCst)
    }
}
