//! Record schemas. Pure data; the engine only carries them along.
//!
//! A row set binds the schema of the first record it accepts; steps that care
//! about field types read it from there or from the record itself.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    Binary,
}

impl DataType {
    /// Lenient name parsing used by the YAML DSL and step configs.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Boolean" | "bool" | "boolean" => Some(DataType::Boolean),
            "Int64" | "i64" | "int" | "integer" => Some(DataType::Int64),
            "Float64" | "f64" | "float" | "number" => Some(DataType::Float64),
            "Utf8" | "string" | "str" => Some(DataType::Utf8),
            "Binary" | "bytes" => Some(DataType::Binary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// New schema with `extra` fields appended after the existing ones.
    pub fn extended(&self, extra: &[Field]) -> Self {
        let mut fields = self.fields.clone();
        fields.extend_from_slice(extra);
        Self { fields }
    }
}
