//! Aggregated outcome of one pipeline run.

use std::fmt;

use rowflow_core::prelude::{RunManifest, UnitKey};
use serde::Serialize;

use crate::unit::UnitState;

/// A unit-fatal error and the unit it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FatalError {
    pub unit: UnitKey,
    pub message: String,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub unit: UnitKey,
    pub state: UnitState,
    pub read: u64,
    pub written: u64,
    pub rejected: u64,
    pub errors: u64,
    pub fatal: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub read: u64,
    pub written: u64,
    pub rejected: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// One report per unit, in unit-start order.
    pub units: Vec<UnitReport>,
    /// First failing unit in unit-start order.
    pub first_error: Option<FatalError>,
    /// Cancellation was requested (by `stop` or by a failure).
    pub stopped: bool,
    pub manifest: RunManifest,
}

impl PipelineResult {
    pub fn totals(&self) -> Totals {
        self.units.iter().fold(Totals::default(), |mut t, u| {
            t.read += u.read;
            t.written += u.written;
            t.rejected += u.rejected;
            t.errors += u.errors;
            t
        })
    }

    pub fn is_success(&self) -> bool {
        self.first_error.is_none() && self.units.iter().all(|u| u.state == UnitState::Done)
    }

    pub fn unit(&self, step: &str, copy: usize) -> Option<&UnitReport> {
        self.units
            .iter()
            .find(|u| u.unit.step == step && u.unit.copy == copy)
    }

    /// Reports for every copy of `step`.
    pub fn step(&self, step: &str) -> impl Iterator<Item = &UnitReport> + '_ {
        let step = step.to_string();
        self.units.iter().filter(move |u| u.unit.step == step)
    }
}
