//! Field selection with renaming support.
//!
//! `fields` keeps (and orders) the named fields; empty keeps all. `rename`
//! maps old name -> new name and applies after selection.

use std::collections::HashMap;
use std::sync::Arc;

use rowflow_core::prelude::{Record, Scalar, Schema};
use serde::Deserialize;

use crate::traits::{Emit, RowError, StepContext, StepError, Transform};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SelectConfig {
    fields: Vec<String>,
    rename: HashMap<String, String>,
}

/// Projection for one input schema, reused while the schema stays the same.
#[derive(Debug)]
struct Projection {
    input: Arc<Schema>,
    output: Arc<Schema>,
    indices: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct Select {
    fields: Vec<String>,
    renames: HashMap<String, String>,
    cached: Option<Projection>,
}

impl Select {
    pub fn new(fields: Vec<String>, renames: HashMap<String, String>) -> Self {
        Self {
            fields,
            renames,
            cached: None,
        }
    }

    pub fn from_context(ctx: &StepContext) -> Result<Self, StepError> {
        let cfg: SelectConfig = ctx.parse_config()?;
        Ok(Self::new(cfg.fields, cfg.rename))
    }

    fn project(&self, input: &Arc<Schema>) -> Result<Projection, String> {
        let indices: Vec<usize> = if self.fields.is_empty() {
            (0..input.len()).collect()
        } else {
            self.fields
                .iter()
                .map(|name| input.index_of(name).ok_or_else(|| name.clone()))
                .collect::<Result<_, _>>()?
        };

        let mut fields = Vec::with_capacity(indices.len());
        for &i in &indices {
            if let Some(field) = input.field(i) {
                let mut field = field.clone();
                if let Some(new_name) = self.renames.get(&field.name) {
                    field.name = new_name.clone();
                }
                fields.push(field);
            }
        }

        Ok(Projection {
            input: Arc::clone(input),
            output: Arc::new(Schema::new(fields)),
            indices,
        })
    }
}

impl Transform for Select {
    fn name(&self) -> &str {
        "select"
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        let Some(record) = input else {
            return Ok(Emit::Exhausted);
        };

        let stale = match &self.cached {
            Some(p) => !Arc::ptr_eq(&p.input, record.schema()) && *p.input != **record.schema(),
            None => true,
        };
        if stale {
            match self.project(record.schema()) {
                Ok(p) => self.cached = Some(p),
                Err(missing) => {
                    let msg = format!("field '{missing}' not found");
                    return Err(RowError::new(record, msg)
                        .with_field(missing)
                        .with_code("SELECT_FIELD")
                        .into());
                }
            }
        }

        let Some(p) = &self.cached else {
            return Err(StepError::fatal("select projection missing"));
        };
        let values = p
            .indices
            .iter()
            .map(|&i| record.value(i).cloned().unwrap_or(Scalar::Null))
            .collect();
        Ok(Emit::one(Record::new(Arc::clone(&p.output), values)?))
    }
}
