//! Engine configuration that downstream crates can serialize/deserialize.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a unit-fatal error does to the rest of the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Broadcast cancellation so sibling units wind down.
    #[default]
    StopOnError,
    /// Record the error but let unaffected branches run to completion.
    ContinueOnError,
}

impl ErrorPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" | "stop_on_error" => Some(ErrorPolicy::StopOnError),
            "continue" | "continue_on_error" => Some(ErrorPolicy::ContinueOnError),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard upper bound of records buffered in every row set.
    pub rowset_capacity: usize,

    /// How long a blocked `put` waits before reporting a timeout to its caller.
    /// Also bounds cancellation latency for a unit stuck on a full output.
    pub put_timeout_ms: u64,

    /// Bounded wait used by single-input units when their input is empty but
    /// not yet done.
    pub get_timeout_ms: u64,

    /// Rows read consecutively from one input by the round-robin merge before
    /// it moves on to the next input.
    pub round_robin_block_rows: usize,

    pub error_policy: ErrorPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rowset_capacity: 10_000,
            put_timeout_ms: 50,
            get_timeout_ms: 50,
            round_robin_block_rows: 500,
            error_policy: ErrorPolicy::StopOnError,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `ROWFLOW_ROWSET_CAPACITY`: records per row set
    /// - `ROWFLOW_PUT_TIMEOUT_MS`: blocking put timeout
    /// - `ROWFLOW_GET_TIMEOUT_MS`: single-input retry wait
    /// - `ROWFLOW_RR_BLOCK_ROWS`: round-robin block size
    /// - `ROWFLOW_ERROR_POLICY`: `stop` or `continue`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("ROWFLOW_ROWSET_CAPACITY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.rowset_capacity = v;
            }
        }

        if let Ok(s) = std::env::var("ROWFLOW_PUT_TIMEOUT_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.put_timeout_ms = v;
            }
        }

        if let Ok(s) = std::env::var("ROWFLOW_GET_TIMEOUT_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.get_timeout_ms = v;
            }
        }

        if let Ok(s) = std::env::var("ROWFLOW_RR_BLOCK_ROWS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.round_robin_block_rows = v;
            }
        }

        if let Ok(s) = std::env::var("ROWFLOW_ERROR_POLICY") {
            if let Some(p) = ErrorPolicy::parse(&s) {
                cfg.error_policy = p;
            }
        }

        cfg
    }

    /// Reject values the runtime cannot honor (zero capacity, zero waits).
    pub fn validate(&self) -> Result<()> {
        if self.rowset_capacity == 0 {
            return Err(Error::Config("rowset_capacity must be at least 1".into()));
        }
        if self.put_timeout_ms == 0 {
            return Err(Error::Config("put_timeout_ms must be positive".into()));
        }
        if self.get_timeout_ms == 0 {
            return Err(Error::Config("get_timeout_ms must be positive".into()));
        }
        if self.round_robin_block_rows == 0 {
            return Err(Error::Config(
                "round_robin_block_rows must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn put_timeout(&self) -> Duration {
        Duration::from_millis(self.put_timeout_ms)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }
}
