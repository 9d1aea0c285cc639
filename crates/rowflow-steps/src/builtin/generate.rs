//! Source step emitting literal rows.
//!
//! Config:
//! - `rows`: JSON rows. Arrays are positional (matched against `fields`),
//!   objects are keyed by field name, anything else is a one-field row.
//! - `fields`: field names; defaults to `["value"]` or the first object's keys.
//! - `limit`: total rows to emit, cycling through `rows`. Without `rows` the
//!   step emits a counter field `n` = 0, 1, 2...

use std::sync::Arc;

use rowflow_core::prelude::{DataType, Field, Record, Scalar, Schema};
use serde::Deserialize;

use crate::traits::{Emit, StepContext, StepError, Transform};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateConfig {
    fields: Vec<String>,
    rows: Vec<serde_json::Value>,
    limit: Option<u64>,
}

#[derive(Debug)]
pub struct Generate {
    rows: Vec<Record>,
    counter: Option<Arc<Schema>>,
    limit: u64,
    emitted: u64,
}

impl Generate {
    /// Emit `rows` once, in order.
    pub fn from_records(rows: Vec<Record>) -> Self {
        let limit = rows.len() as u64;
        Self {
            rows,
            counter: None,
            limit,
            emitted: 0,
        }
    }

    pub fn from_context(ctx: &StepContext) -> Result<Self, StepError> {
        let cfg: GenerateConfig = ctx.parse_config()?;
        if cfg.rows.is_empty() {
            let schema = Schema::new(vec![Field::new("n", DataType::Int64, false)]);
            return Ok(Self {
                rows: Vec::new(),
                counter: Some(Arc::new(schema)),
                limit: cfg.limit.unwrap_or(0),
                emitted: 0,
            });
        }

        let names = field_names(&cfg);
        let mut values = Vec::with_capacity(cfg.rows.len());
        for (i, row) in cfg.rows.iter().enumerate() {
            let vals: Vec<Scalar> = match row {
                serde_json::Value::Array(items) => items.iter().map(Scalar::from_json).collect(),
                serde_json::Value::Object(map) => names
                    .iter()
                    .map(|n| map.get(n).map(Scalar::from_json).unwrap_or(Scalar::Null))
                    .collect(),
                other => vec![Scalar::from_json(other)],
            };
            if vals.len() != names.len() {
                return Err(StepError::Fatal(format!(
                    "generate row {i} has {} values, expected {}",
                    vals.len(),
                    names.len()
                )));
            }
            values.push(vals);
        }

        // Field types come from the first non-null value in each column.
        let fields = names
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let dt = values
                    .iter()
                    .find_map(|row| row[col].data_type())
                    .unwrap_or(DataType::Utf8);
                Field::new(name.clone(), dt, true)
            })
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let rows = values
            .into_iter()
            .map(|v| Record::new(Arc::clone(&schema), v))
            .collect::<Result<Vec<_>, _>>()?;
        let limit = cfg.limit.unwrap_or(rows.len() as u64);
        Ok(Self {
            rows,
            counter: None,
            limit,
            emitted: 0,
        })
    }
}

fn field_names(cfg: &GenerateConfig) -> Vec<String> {
    if !cfg.fields.is_empty() {
        return cfg.fields.clone();
    }
    match cfg.rows.first() {
        Some(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
        Some(serde_json::Value::Array(items)) => {
            (0..items.len()).map(|i| format!("field_{i}")).collect()
        }
        _ => vec!["value".to_string()],
    }
}

impl Transform for Generate {
    fn name(&self) -> &str {
        "generate"
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        if input.is_some() {
            return Err(StepError::fatal("generate is a source and takes no input"));
        }
        if self.emitted >= self.limit {
            return Ok(Emit::Exhausted);
        }
        let record = match &self.counter {
            Some(schema) => Record::new(
                Arc::clone(schema),
                vec![Scalar::I64(self.emitted as i64)],
            )?,
            None => {
                if self.rows.is_empty() {
                    return Ok(Emit::Exhausted);
                }
                self.rows[(self.emitted % self.rows.len() as u64) as usize].clone()
            }
        };
        self.emitted += 1;
        Ok(Emit::one(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_core::prelude::UnitKey;
    use serde_json::json;

    fn make(config: serde_json::Value) -> Generate {
        Generate::from_context(&StepContext::new(UnitKey::new("g", 0), 1, config)).unwrap()
    }

    fn drain(g: &mut Generate) -> Vec<Record> {
        let mut out = Vec::new();
        loop {
            match g.process(None).unwrap() {
                Emit::Rows(rows) => out.extend(rows),
                Emit::Exhausted => return out,
            }
        }
    }

    #[test]
    fn scalar_rows_once() {
        let mut g = make(json!({"rows": ["a", "b", "c"]}));
        let out: Vec<String> = drain(&mut g)
            .iter()
            .map(|r| r.get("value").unwrap().to_string())
            .collect();
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[test]
    fn limit_cycles_rows() {
        let mut g = make(json!({"fields": ["id", "name"], "rows": [[1, "x"], [2, "y"]], "limit": 5}));
        let out = drain(&mut g);
        assert_eq!(out.len(), 5);
        assert_eq!(out[4].get("id"), Some(&Scalar::I64(1)));
        assert_eq!(out[0].schema().field(0).unwrap().data_type, DataType::Int64);
    }

    #[test]
    fn counter_without_rows() {
        let mut g = make(json!({"limit": 3}));
        let out: Vec<i64> = drain(&mut g)
            .iter()
            .map(|r| r.get("n").and_then(Scalar::as_i64).unwrap())
            .collect();
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn ragged_rows_rejected() {
        let ctx = StepContext::new(
            UnitKey::new("g", 0),
            1,
            json!({"fields": ["a", "b"], "rows": [[1]]}),
        );
        assert!(Generate::from_context(&ctx).is_err());
    }
}
