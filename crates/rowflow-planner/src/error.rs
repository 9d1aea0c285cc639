use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid pipeline: {0}")]
    Invalid(String),
}

impl From<rowflow_core::Error> for PlanError {
    fn from(e: rowflow_core::Error) -> Self {
        PlanError::Invalid(e.to_string())
    }
}
