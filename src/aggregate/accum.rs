use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use crate::errors::DbError;
use crate::num;
use crate::query::eval::{compare_bson, to_f64, values_equal};

use super::expr::{Expr, eval_expr, parse_expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccOp {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccSpec {
    pub field: String,
    pub op: AccOp,
    pub expr: Expr,
}

/// Parses one `field: { $acc: expr }` entry of a `$group` stage.
///
/// # Errors
/// Returns `DbError::Operation` for dotted output names, unknown accumulators or malformed specs.
pub fn parse_accumulator(field: &str, spec: &Bson) -> Result<AccSpec, DbError> {
    if field.contains('.') {
        return Err(DbError::op(format!("The field name '{field}' cannot contain '.'")));
    }
    let Bson::Document(d) = spec else {
        return Err(DbError::op(format!("The field '{field}' must be an accumulator object")));
    };
    let mut entries = d.iter();
    let (Some((name, operand)), None) = (entries.next(), entries.next()) else {
        return Err(DbError::op(format!("The field '{field}' must specify one accumulator")));
    };
    let op = match name.as_str() {
        "$sum" => AccOp::Sum,
        "$avg" => AccOp::Avg,
        "$min" => AccOp::Min,
        "$max" => AccOp::Max,
        "$first" => AccOp::First,
        "$last" => AccOp::Last,
        "$push" => AccOp::Push,
        "$addToSet" => AccOp::AddToSet,
        "$count" => AccOp::Count,
        other => return Err(DbError::op(format!("unknown group operator '{other}'"))),
    };
    let expr = if op == AccOp::Count { Expr::Literal(Bson::Int32(1)) } else { parse_expr(operand)? };
    Ok(AccSpec { field: field.to_string(), op, expr })
}

/// Running state of one accumulator within one group.
#[derive(Debug, Clone)]
pub enum AccState {
    Sum(Bson),
    Avg { total: f64, n: u64 },
    Extreme(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    Values(Vec<Bson>),
    Count(u64),
}

impl AccState {
    #[must_use]
    pub const fn new(op: AccOp) -> Self {
        match op {
            AccOp::Sum => Self::Sum(Bson::Int32(0)),
            AccOp::Avg => Self::Avg { total: 0.0, n: 0 },
            AccOp::Min | AccOp::Max => Self::Extreme(None),
            AccOp::First => Self::First(None),
            AccOp::Last => Self::Last(Bson::Null),
            AccOp::Push | AccOp::AddToSet => Self::Values(Vec::new()),
            AccOp::Count => Self::Count(0),
        }
    }

    /// Folds the value `spec.expr` yields for `doc` into the state.
    ///
    /// # Errors
    /// Propagates expression evaluation errors.
    pub fn accumulate(&mut self, spec: &AccSpec, doc: &BsonDocument) -> Result<(), DbError> {
        let value = eval_expr(&spec.expr, doc)?;
        match self {
            Self::Sum(total) => {
                if let Some(next) = value.as_ref().and_then(|v| num::add(total, v)) {
                    *total = next;
                }
            }
            Self::Avg { total, n } => {
                if let Some(f) = value.as_ref().and_then(to_f64) {
                    *total += f;
                    *n += 1;
                }
            }
            Self::Extreme(best) => {
                let Some(v) = value.filter(|v| !matches!(v, Bson::Null | Bson::Undefined)) else {
                    return Ok(());
                };
                let wanted = if spec.op == AccOp::Min { Ordering::Less } else { Ordering::Greater };
                if best.as_ref().is_none_or(|b| compare_bson(&v, b) == wanted) {
                    *best = Some(v);
                }
            }
            Self::First(first) => {
                if first.is_none() {
                    *first = Some(value.unwrap_or(Bson::Null));
                }
            }
            Self::Last(last) => *last = value.unwrap_or(Bson::Null),
            Self::Values(items) => {
                let Some(v) = value else { return Ok(()) };
                if spec.op == AccOp::Push || !items.iter().any(|x| values_equal(x, &v)) {
                    items.push(v);
                }
            }
            Self::Count(n) => *n += 1,
        }
        Ok(())
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finish(self) -> Bson {
        match self {
            Self::Sum(total) => total,
            Self::Avg { n: 0, .. } => Bson::Null,
            Self::Avg { total, n } => Bson::Double(total / n as f64),
            Self::Extreme(v) => v.unwrap_or(Bson::Null),
            Self::First(v) => v.unwrap_or(Bson::Null),
            Self::Last(v) => v,
            Self::Values(items) => Bson::Array(items),
            Self::Count(n) => i32::try_from(n)
                .map_or_else(|_| Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX)), Bson::Int32),
        }
    }
}
