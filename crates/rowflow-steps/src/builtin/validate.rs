//! Rejects rows whose required fields are missing or null.

use rowflow_core::prelude::Record;
use serde::Deserialize;

use crate::traits::{Emit, RowError, StepContext, StepError, Transform};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ValidateConfig {
    required: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Validate {
    required: Vec<String>,
}

impl Validate {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }

    pub fn from_context(ctx: &StepContext) -> Result<Self, StepError> {
        let cfg: ValidateConfig = ctx.parse_config()?;
        Ok(Self::new(cfg.required))
    }
}

impl Transform for Validate {
    fn name(&self) -> &str {
        "validate"
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        let Some(record) = input else {
            return Ok(Emit::Exhausted);
        };
        let missing = self
            .required
            .iter()
            .find(|f| record.get(f).map_or(true, |v| v.is_null()))
            .cloned();
        match missing {
            None => Ok(Emit::one(record)),
            Some(field) => {
                let msg = format!("field '{field}' is required");
                Err(RowError::new(record, msg)
                    .with_field(field)
                    .with_code("REQUIRED")
                    .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_missing_fields_fail() {
        let mut v = Validate::new(vec!["v".into()]);
        assert!(v.process(Some(Record::text("v", "ok"))).is_ok());

        let mut v = Validate::new(vec!["w".into()]);
        match v.process(Some(Record::text("v", "ok"))) {
            Err(StepError::Row(e)) => {
                assert_eq!(e.description, "field 'w' is required");
                assert_eq!(e.code.as_deref(), Some("REQUIRED"));
            }
            other => panic!("expected row error, got {other:?}"),
        }
    }
}
