//! Records: schema-tagged ordered tuples of scalar values.
//!
//! The engine never looks inside a record; it only moves it between row sets.
//! Steps use the accessors here to read and build them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

impl Scalar {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(DataType::Boolean),
            Scalar::I64(_) => Some(DataType::Int64),
            Scalar::F64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Utf8),
            Scalar::Bin(_) => Some(DataType::Binary),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::I64(v) => Some(*v as f64),
            Scalar::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert a JSON literal (from step configs) into a scalar.
    pub fn from_json(v: &serde_json::Value) -> Scalar {
        match v {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::I64(i),
                None => Scalar::F64(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Scalar::Str(s.clone()),
            other => Scalar::Str(other.to_string()),
        }
    }

    /// Parse text into a scalar of the requested type. Empty text is `Null`.
    pub fn parse_as(text: &str, data_type: DataType) -> Result<Scalar> {
        if text.is_empty() {
            return Ok(Scalar::Null);
        }
        let bad = |e: &dyn std::fmt::Display| {
            Error::Schema(format!("cannot parse '{text}' as {data_type:?}: {e}"))
        };
        Ok(match data_type {
            DataType::Boolean => Scalar::Bool(text.parse::<bool>().map_err(|e| bad(&e))?),
            DataType::Int64 => Scalar::I64(text.parse::<i64>().map_err(|e| bad(&e))?),
            DataType::Float64 => Scalar::F64(text.parse::<f64>().map_err(|e| bad(&e))?),
            DataType::Utf8 => Scalar::Str(text.to_string()),
            DataType::Binary => Scalar::Bin(text.as_bytes().to_vec()),
        })
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Bin(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

/// One row flowing through the pipeline.
///
/// The schema is shared (`Arc`) so cloning a record for fan-out copies only
/// the values.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Scalar>,
}

impl Record {
    /// Build a record; the value count must match the schema arity.
    pub fn new(schema: Arc<Schema>, values: Vec<Scalar>) -> Result<Self> {
        if schema.len() != values.len() {
            return Err(Error::Schema(format!(
                "record has {} values but schema has {} fields",
                values.len(),
                schema.len()
            )));
        }
        Ok(Self { schema, values })
    }

    /// Single-field string record; handy for sources and tests.
    pub fn text(field: &str, value: impl Into<String>) -> Self {
        Self {
            schema: Arc::new(Schema::new(vec![Field::new(field, DataType::Utf8, true)])),
            values: vec![Scalar::Str(value.into())],
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn into_values(self) -> Vec<Scalar> {
        self.values
    }

    /// Same values under a new schema with `extra` fields appended.
    pub fn with_appended(&self, extra: &[Field], extra_values: Vec<Scalar>) -> Result<Self> {
        let mut values = self.values.clone();
        values.extend(extra_values);
        Record::new(Arc::new(self.schema.extended(extra)), values)
    }
}
