use rowflow_core::prelude::UnitKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    /// Invalid graph or engine settings; raised before any unit starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("step registry: {0}")]
    Registry(String),

    #[error("init of {unit} failed: {message}")]
    Init { unit: UnitKey, message: String },

    /// Lifecycle misuse (starting twice, wiring after start, ...).
    #[error("invalid pipeline state: {0}")]
    State(String),

    #[error("spawn unit thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("hashing error: {0}")]
    Hash(String),
}

impl From<rowflow_core::Error> for ExecError {
    fn from(e: rowflow_core::Error) -> Self {
        match e {
            rowflow_core::Error::Hash(msg) => ExecError::Hash(msg),
            other => ExecError::Configuration(other.to_string()),
        }
    }
}
