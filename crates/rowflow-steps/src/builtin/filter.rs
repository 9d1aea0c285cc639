//! Filter step with simple predicate evaluation.
//!
//! Supports expressions of the form: "field OP literal" where OP ∈ {==, !=, <, <=, >, >=}.
//! Rows whose predicate is false are dropped; rows the predicate cannot be
//! evaluated against are rejected as row-level errors.

use rowflow_core::prelude::{Record, Scalar};
use serde::Deserialize;

use crate::traits::{Emit, RowError, StepContext, StepError, Transform};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FilterConfig {
    condition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
struct Predicate {
    field: String,
    op: CmpOp,
    literal: String,
}

#[derive(Debug, Default)]
pub struct Filter {
    predicate: Option<Predicate>,
}

impl Filter {
    pub fn new(expr: &str) -> Result<Self, StepError> {
        Ok(Self {
            predicate: Some(parse_simple_predicate(expr)?),
        })
    }

    pub fn from_context(ctx: &StepContext) -> Result<Self, StepError> {
        let cfg: FilterConfig = ctx.parse_config()?;
        match cfg.condition {
            Some(expr) => Self::new(&expr),
            None => Ok(Self::default()),
        }
    }
}

impl Transform for Filter {
    fn name(&self) -> &str {
        "filter"
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        let Some(record) = input else {
            return Ok(Emit::Exhausted);
        };
        // No condition: pass through
        let Some(pred) = &self.predicate else {
            return Ok(Emit::one(record));
        };

        let Some(value) = record.get(&pred.field) else {
            let msg = format!("field '{}' not found", pred.field);
            let field = pred.field.clone();
            return Err(RowError::new(record, msg)
                .with_field(field)
                .with_code("FILTER_FIELD")
                .into());
        };

        match eval_predicate(value, pred.op, &pred.literal) {
            Ok(true) => Ok(Emit::one(record)),
            Ok(false) => Ok(Emit::none()),
            Err(msg) => {
                let field = pred.field.clone();
                Err(RowError::new(record, msg)
                    .with_field(field)
                    .with_code("FILTER_EVAL")
                    .into())
            }
        }
    }
}

/// Parse a simple predicate like "age > 18" or "name == Alice"
fn parse_simple_predicate(expr: &str) -> Result<Predicate, StepError> {
    let ops = [
        ("==", CmpOp::Eq),
        ("!=", CmpOp::Ne),
        ("<=", CmpOp::Le),
        (">=", CmpOp::Ge),
        ("<", CmpOp::Lt),
        (">", CmpOp::Gt),
    ];

    for (token, op) in ops {
        if let Some(pos) = expr.find(token) {
            let field = expr[..pos].trim().to_string();
            let literal = expr[pos + token.len()..].trim().to_string();
            if field.is_empty() {
                break;
            }
            return Ok(Predicate { field, op, literal });
        }
    }

    Err(StepError::Fatal(format!("unparseable predicate: {}", expr)))
}

fn compare<T: PartialOrd>(a: T, op: CmpOp, b: T) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

/// Evaluate a simple comparison predicate
fn eval_predicate(val: &Scalar, op: CmpOp, literal: &str) -> Result<bool, String> {
    use Scalar::*;

    match val {
        Null => Ok(false), // Null comparisons are false
        Bool(b) => {
            let lit_bool = literal
                .parse::<bool>()
                .map_err(|_| format!("cannot parse '{}' as bool", literal))?;
            match op {
                CmpOp::Eq | CmpOp::Ne => Ok(compare(*b, op, lit_bool)),
                _ => Err(format!("unsupported comparison {:?} for bool", op)),
            }
        }
        I64(i) => {
            let lit_int = literal
                .parse::<i64>()
                .map_err(|_| format!("cannot parse '{}' as i64", literal))?;
            Ok(compare(*i, op, lit_int))
        }
        F64(f) => {
            let lit_float = literal
                .parse::<f64>()
                .map_err(|_| format!("cannot parse '{}' as f64", literal))?;
            Ok(match op {
                CmpOp::Eq => (*f - lit_float).abs() < f64::EPSILON,
                CmpOp::Ne => (*f - lit_float).abs() >= f64::EPSILON,
                _ => compare(*f, op, lit_float),
            })
        }
        Str(s) => Ok(compare(s.as_str(), op, literal)),
        Bin(_) => Err("cannot filter on binary data".into()),
    }
}
