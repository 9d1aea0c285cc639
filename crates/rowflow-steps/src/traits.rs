//! Transform trait + common interfaces.
//!
//! The exec runtime builds one transform per step copy, calls `init` before any
//! thread starts, then drives `process` from the unit's own thread. Transforms
//! may block for as long as they like; the engine applies no timeout to them.

use rowflow_core::prelude::{Record, UnitKey};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A single record that could not be transformed.
///
/// Routed to the step's error target when one is configured; otherwise the
/// unit treats it as fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub record: Record,
    pub description: String,
    pub field: Option<String>,
    pub code: Option<String>,
}

impl RowError {
    pub fn new(record: Record, description: impl Into<String>) -> Self {
        Self {
            record,
            description: description.into(),
            field: None,
            code: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("row rejected: {}", .0.description)]
    Row(RowError),

    #[error("{0}")]
    Fatal(String),
}

impl StepError {
    pub fn fatal(msg: impl Into<String>) -> Self {
        StepError::Fatal(msg.into())
    }
}

impl From<RowError> for StepError {
    fn from(e: RowError) -> Self {
        StepError::Row(e)
    }
}

impl From<rowflow_core::Error> for StepError {
    fn from(e: rowflow_core::Error) -> Self {
        StepError::Fatal(e.to_string())
    }
}

/// What one `process` call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Emit {
    /// Zero or more output records.
    Rows(Vec<Record>),
    /// No more input wanted (for sources: the origin is exhausted).
    Exhausted,
}

impl Emit {
    pub fn one(record: Record) -> Self {
        Emit::Rows(vec![record])
    }

    pub fn none() -> Self {
        Emit::Rows(Vec::new())
    }
}

/// Everything a transform learns about where it runs.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub unit: UnitKey,
    /// Total copies of this step.
    pub copies: usize,
    /// The step's `config` block from the pipeline definition.
    pub config: serde_json::Value,
}

impl StepContext {
    pub fn new(unit: UnitKey, copies: usize, config: serde_json::Value) -> Self {
        Self {
            unit,
            copies,
            config,
        }
    }

    /// Deserialize the config block; an absent block yields `T::default()`.
    pub fn parse_config<T: DeserializeOwned + Default>(&self) -> Result<T, StepError> {
        if self.config.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.config.clone()).map_err(|e| {
            StepError::Fatal(format!("step '{}': invalid config: {e}", self.unit.step))
        })
    }
}

/// Trait that all steps must implement.
///
/// Invariants:
/// - `process(None)` is only called on units without inputs (sources).
/// - `finish` runs once after the last input record, before outputs are
///   marked done; `dispose` runs exactly once on every exit path.
pub trait Transform: Send {
    /// Human-readable step type (stable).
    fn name(&self) -> &str;

    /// Acquire resources. Called at pipeline build time.
    fn init(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    /// Transform one record, or produce the next one when `input` is `None`.
    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError>;

    /// Trailing records once all input has been consumed.
    fn finish(&mut self) -> Result<Vec<Record>, StepError> {
        Ok(Vec::new())
    }

    fn dispose(&mut self) {}
}
