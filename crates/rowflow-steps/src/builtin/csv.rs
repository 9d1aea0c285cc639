//! CSV source and sink steps backed by the `csv` crate.
//!
//! `csv_input` reads a file row by row. With several copies, copy `c` takes
//! every row whose index modulo the copy count equals `c`. Values are parsed
//! according to the declared `fields` types (strings otherwise). A value that
//! does not parse rejects its row: the raw line goes to the step's error
//! handling with the offending field, and the unit fails only if nothing
//! handles it. A row with the wrong number of fields fails the unit.
//!
//! `csv_output` writes every record it sees and passes it on unchanged, so it
//! can sit in the middle of a pipeline. Multiple copies need a `{copy}`
//! placeholder in the path.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use rowflow_core::prelude::{DataType, Field, Record, Scalar, Schema};
use serde::Deserialize;

use crate::traits::{Emit, RowError, StepContext, StepError, Transform};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CsvInputConfig {
    path: String,
    #[serde(default = "default_true")]
    header: bool,
    #[serde(default)]
    delimiter: Option<char>,
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Deserialize)]
struct CsvOutputConfig {
    path: String,
    #[serde(default = "default_true")]
    header: bool,
    #[serde(default)]
    delimiter: Option<char>,
}

fn delimiter_byte(step: &str, d: Option<char>) -> Result<u8, StepError> {
    match d {
        None => Ok(b','),
        Some(c) if c.is_ascii() => Ok(c as u8),
        Some(c) => Err(StepError::Fatal(format!(
            "step '{step}': delimiter '{c}' is not a single-byte character"
        ))),
    }
}

fn required_config<T: serde::de::DeserializeOwned>(ctx: &StepContext) -> Result<T, StepError> {
    serde_json::from_value(ctx.config.clone()).map_err(|e| {
        StepError::Fatal(format!("step '{}': invalid config: {e}", ctx.unit.step))
    })
}

pub struct CsvInput {
    path: PathBuf,
    header: bool,
    delimiter: u8,
    declared: Vec<FieldSpec>,
    copy: usize,
    copies: usize,
    reader: Option<csv::Reader<File>>,
    schema: Option<Arc<Schema>>,
    /// Same field names as `schema`, all text; carries rejected lines.
    raw_schema: Option<Arc<Schema>>,
    row: csv::StringRecord,
    line: u64,
}

impl CsvInput {
    pub fn from_context(ctx: &StepContext) -> Result<Self, StepError> {
        let cfg: CsvInputConfig = required_config(ctx)?;
        if !cfg.header && cfg.fields.is_empty() {
            return Err(StepError::Fatal(format!(
                "step '{}': csv_input without a header row needs `fields`",
                ctx.unit.step
            )));
        }
        Ok(Self {
            path: PathBuf::from(cfg.path),
            header: cfg.header,
            delimiter: delimiter_byte(&ctx.unit.step, cfg.delimiter)?,
            declared: cfg.fields,
            copy: ctx.unit.copy,
            copies: ctx.copies.max(1),
            reader: None,
            schema: None,
            raw_schema: None,
            row: csv::StringRecord::new(),
            line: 0,
        })
    }

    fn build_schema(&self, headers: Option<&csv::StringRecord>) -> Result<Schema, StepError> {
        if !self.declared.is_empty() {
            let mut fields = Vec::with_capacity(self.declared.len());
            for spec in &self.declared {
                let dt = match spec.data_type.as_deref() {
                    None => DataType::Utf8,
                    Some(t) => DataType::parse(t).ok_or_else(|| {
                        StepError::Fatal(format!("unknown type '{t}' for field '{}'", spec.name))
                    })?,
                };
                fields.push(Field::new(spec.name.clone(), dt, true));
            }
            return Ok(Schema::new(fields));
        }
        let headers = headers.ok_or_else(|| StepError::fatal("csv header row missing"))?;
        Ok(Schema::new(
            headers
                .iter()
                .map(|h| Field::new(h.trim(), DataType::Utf8, true))
                .collect(),
        ))
    }
}

impl Transform for CsvInput {
    fn name(&self) -> &str {
        "csv_input"
    }

    fn init(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.header)
            .delimiter(self.delimiter)
            .from_path(&self.path)
            .map_err(|e| StepError::Fatal(format!("open {}: {e}", self.path.display())))?;
        let headers = if self.header {
            Some(
                reader
                    .headers()
                    .map_err(|e| StepError::Fatal(format!("csv header: {e}")))?
                    .clone(),
            )
        } else {
            None
        };
        let schema = self.build_schema(headers.as_ref())?;
        let raw = schema
            .fields
            .iter()
            .map(|f| Field::new(f.name.clone(), DataType::Utf8, true))
            .collect();
        self.raw_schema = Some(Arc::new(Schema::new(raw)));
        self.schema = Some(Arc::new(schema));
        self.reader = Some(reader);
        Ok(())
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        if input.is_some() {
            return Err(StepError::fatal("csv_input is a source and takes no input"));
        }
        let (Some(reader), Some(schema), Some(raw_schema)) =
            (self.reader.as_mut(), self.schema.as_ref(), self.raw_schema.as_ref())
        else {
            return Err(StepError::fatal("csv_input used before init"));
        };

        loop {
            let more = reader
                .read_record(&mut self.row)
                .map_err(|e| StepError::Fatal(format!("csv read: {e}")))?;
            if !more {
                return Ok(Emit::Exhausted);
            }
            let idx = self.line;
            self.line += 1;
            if idx % self.copies as u64 != self.copy as u64 {
                continue;
            }

            if self.row.len() != schema.len() {
                return Err(StepError::Fatal(format!(
                    "csv row {idx} has {} fields, expected {}",
                    self.row.len(),
                    schema.len()
                )));
            }
            let mut values = Vec::with_capacity(schema.len());
            for (text, field) in self.row.iter().zip(&schema.fields) {
                match Scalar::parse_as(text.trim(), field.data_type) {
                    Ok(v) => values.push(v),
                    Err(e) => {
                        let raw = self.row.iter().map(|t| Scalar::Str(t.to_string())).collect();
                        let record = Record::new(Arc::clone(raw_schema), raw)?;
                        return Err(RowError::new(record, format!("csv row {idx}: {e}"))
                            .with_field(field.name.clone())
                            .with_code("CSV_PARSE")
                            .into());
                    }
                }
            }
            return Ok(Emit::one(Record::new(Arc::clone(schema), values)?));
        }
    }

    fn dispose(&mut self) {
        self.reader = None;
    }
}

pub struct CsvOutput {
    path: PathBuf,
    header: bool,
    delimiter: u8,
    writer: Option<csv::Writer<File>>,
    header_written: bool,
}

impl CsvOutput {
    pub fn from_context(ctx: &StepContext) -> Result<Self, StepError> {
        let cfg: CsvOutputConfig = required_config(ctx)?;
        let path = if cfg.path.contains("{copy}") {
            cfg.path.replace("{copy}", &ctx.unit.copy.to_string())
        } else if ctx.copies > 1 {
            return Err(StepError::Fatal(format!(
                "step '{}': {} copies would share '{}'; add a {{copy}} placeholder",
                ctx.unit.step, ctx.copies, cfg.path
            )));
        } else {
            cfg.path
        };
        Ok(Self {
            path: PathBuf::from(path),
            header: cfg.header,
            delimiter: delimiter_byte(&ctx.unit.step, cfg.delimiter)?,
            writer: None,
            header_written: false,
        })
    }

    fn flush(&mut self) -> Result<(), StepError> {
        if let Some(w) = self.writer.as_mut() {
            w.flush()
                .map_err(|e| StepError::Fatal(format!("flush {}: {e}", self.path.display())))?;
        }
        Ok(())
    }
}

impl Transform for CsvOutput {
    fn name(&self) -> &str {
        "csv_output"
    }

    fn init(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
        let writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(&self.path)
            .map_err(|e| StepError::Fatal(format!("create {}: {e}", self.path.display())))?;
        self.writer = Some(writer);
        Ok(())
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        let Some(record) = input else {
            return Ok(Emit::Exhausted);
        };
        let Some(writer) = self.writer.as_mut() else {
            return Err(StepError::fatal("csv_output used before init"));
        };
        let io_err = |e: csv::Error| StepError::Fatal(format!("csv write: {e}"));

        if self.header && !self.header_written {
            writer
                .write_record(record.schema().fields.iter().map(|f| f.name.as_str()))
                .map_err(io_err)?;
            self.header_written = true;
        }
        writer
            .write_record(record.values().iter().map(|v| v.to_string()))
            .map_err(io_err)?;
        Ok(Emit::one(record))
    }

    fn finish(&mut self) -> Result<Vec<Record>, StepError> {
        self.flush()?;
        Ok(Vec::new())
    }

    fn dispose(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "csv_output flush on dispose failed");
        }
        self.writer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflow_core::prelude::UnitKey;
    use serde_json::json;
    use std::io::Write;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rowflow-csv-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn ctx(copy: usize, copies: usize, config: serde_json::Value) -> StepContext {
        StepContext::new(UnitKey::new("csv", copy), copies, config)
    }

    fn drain(t: &mut dyn Transform) -> Vec<Record> {
        let mut out = Vec::new();
        loop {
            match t.process(None).unwrap() {
                Emit::Rows(rows) => out.extend(rows),
                Emit::Exhausted => return out,
            }
        }
    }

    #[test]
    fn reads_typed_rows_and_splits_by_copy() {
        let dir = temp_dir("read");
        let path = dir.join("in.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "id,name").unwrap();
        for i in 0..5 {
            writeln!(f, "{i},n{i}").unwrap();
        }
        drop(f);

        let cfg = json!({
            "path": path.to_str().unwrap(),
            "fields": [{"name": "id", "type": "int"}, {"name": "name"}],
        });
        let c = ctx(1, 2, cfg);
        let mut input = CsvInput::from_context(&c).unwrap();
        input.init(&c).unwrap();
        let rows = drain(&mut input);
        let ids: Vec<i64> = rows.iter().map(|r| r.get("id").unwrap().as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 3]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_value_rejects_the_row_and_reading_continues() {
        let dir = temp_dir("bad");
        let path = dir.join("in.csv");
        std::fs::write(&path, "id,name\nx,first\n2,second\n").unwrap();
        let cfg = json!({
            "path": path.to_str().unwrap(),
            "fields": [{"name": "id", "type": "int"}, {"name": "name"}],
        });
        let c = ctx(0, 1, cfg);
        let mut input = CsvInput::from_context(&c).unwrap();
        input.init(&c).unwrap();

        match input.process(None) {
            Err(StepError::Row(e)) => {
                assert_eq!(e.field.as_deref(), Some("id"));
                assert_eq!(e.code.as_deref(), Some("CSV_PARSE"));
                assert_eq!(e.record.get("id").unwrap().to_string(), "x");
                assert_eq!(e.record.get("name").unwrap().to_string(), "first");
            }
            other => panic!("expected a row error, got {other:?}"),
        }
        let rows = drain(&mut input);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id").unwrap().as_i64(), Some(2));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn wrong_field_count_is_fatal() {
        let dir = temp_dir("arity");
        let path = dir.join("in.csv");
        std::fs::write(&path, "id\n1,2\n").unwrap();
        let c = ctx(0, 1, json!({"path": path.to_str().unwrap(), "fields": [{"name": "id", "type": "int"}]}));
        let mut input = CsvInput::from_context(&c).unwrap();
        input.init(&c).unwrap();
        assert!(matches!(input.process(None), Err(StepError::Fatal(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_fails_init() {
        let c = ctx(0, 1, json!({"path": "/definitely/not/here.csv"}));
        let mut input = CsvInput::from_context(&c).unwrap();
        assert!(input.init(&c).is_err());
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = temp_dir("write");
        let path = dir.join("out.csv");
        let c = ctx(0, 1, json!({"path": path.to_str().unwrap()}));
        let mut out = CsvOutput::from_context(&c).unwrap();
        out.init(&c).unwrap();
        out.process(Some(Record::text("v", "a"))).unwrap();
        out.process(Some(Record::text("v", "b"))).unwrap();
        out.finish().unwrap();
        out.dispose();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v\na\nb\n");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn shared_output_path_needs_placeholder() {
        let c = ctx(0, 2, json!({"path": "out.csv"}));
        assert!(CsvOutput::from_context(&c).is_err());
    }
}
