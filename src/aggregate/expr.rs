//! Aggregation expressions: field paths, literals and the operator subset the pipeline supports.

use bson::{Bson, Document as BsonDocument};

use crate::errors::DbError;
use crate::num;
use crate::query::eval::get_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Concat,
    ToString,
    ToUpper,
    ToLower,
}

impl ExprOp {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$add" => Self::Add,
            "$subtract" => Self::Subtract,
            "$multiply" => Self::Multiply,
            "$divide" => Self::Divide,
            "$mod" => Self::Mod,
            "$concat" => Self::Concat,
            "$toString" => Self::ToString,
            "$toUpper" => Self::ToUpper,
            "$toLower" => Self::ToLower,
            _ => return None,
        })
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Add => "$add",
            Self::Subtract => "$subtract",
            Self::Multiply => "$multiply",
            Self::Divide => "$divide",
            Self::Mod => "$mod",
            Self::Concat => "$concat",
            Self::ToString => "$toString",
            Self::ToUpper => "$toUpper",
            Self::ToLower => "$toLower",
        }
    }

    /// Exact argument count, or `None` when variadic.
    const fn arity(self) -> Option<usize> {
        match self {
            Self::Add | Self::Multiply | Self::Concat => None,
            Self::Subtract | Self::Divide | Self::Mod => Some(2),
            Self::ToString | Self::ToUpper | Self::ToLower => Some(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Bson),
    Field(String),
    Root,
    Document(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    Op(ExprOp, Vec<Expr>),
}

/// Parses an expression operand.
///
/// # Errors
/// Returns `DbError::Operation` for unknown operators, unsupported variables, or wrong arity.
pub fn parse_expr(v: &Bson) -> Result<Expr, DbError> {
    match v {
        Bson::String(s) if s == "$$ROOT" || s == "$$CURRENT" => Ok(Expr::Root),
        Bson::String(s) if s.starts_with("$$") => Err(DbError::op(format!("Use of undefined variable: {}", &s[2..]))),
        Bson::String(s) if s.starts_with('$') => {
            let path = &s[1..];
            if path.is_empty() {
                return Err(DbError::op("'$' by itself is not a valid FieldPath"));
            }
            Ok(Expr::Field(path.to_string()))
        }
        Bson::Array(items) => Ok(Expr::Array(items.iter().map(parse_expr).collect::<Result<_, _>>()?)),
        Bson::Document(d) => parse_expr_document(d),
        other => Ok(Expr::Literal(other.clone())),
    }
}

fn parse_expr_document(d: &BsonDocument) -> Result<Expr, DbError> {
    let Some((first, operand)) = d.iter().next() else {
        return Ok(Expr::Document(Vec::new()));
    };
    if !first.starts_with('$') {
        let fields = d
            .iter()
            .map(|(k, v)| Ok((k.clone(), parse_expr(v)?)))
            .collect::<Result<Vec<_>, DbError>>()?;
        return Ok(Expr::Document(fields));
    }
    if d.len() != 1 {
        return Err(DbError::op(format!(
            "An object representing an expression must have exactly one field: {d}"
        )));
    }
    if first == "$literal" {
        return Ok(Expr::Literal(operand.clone()));
    }
    let op = ExprOp::from_name(first)
        .ok_or_else(|| DbError::op(format!("Unrecognized expression '{first}'")))?;
    let args = match operand {
        Bson::Array(items) => items.iter().map(parse_expr).collect::<Result<Vec<_>, _>>()?,
        single => vec![parse_expr(single)?],
    };
    if let Some(n) = op.arity() {
        if args.len() != n {
            return Err(DbError::op(format!(
                "Expression {} takes exactly {n} arguments. {} were passed in.",
                op.name(),
                args.len()
            )));
        }
    }
    Ok(Expr::Op(op, args))
}

/// Evaluates `expr` against `doc`. `None` means the value is missing (a field that does not exist).
///
/// # Errors
/// Returns `DbError::Operation` when an operator receives values of the wrong type.
pub fn eval_expr(expr: &Expr, doc: &BsonDocument) -> Result<Option<Bson>, DbError> {
    match expr {
        Expr::Literal(v) => Ok(Some(v.clone())),
        Expr::Field(path) => Ok(get_path(doc, path).cloned()),
        Expr::Root => Ok(Some(Bson::Document(doc.clone()))),
        Expr::Document(fields) => {
            let mut out = BsonDocument::new();
            for (k, e) in fields {
                if let Some(v) = eval_expr(e, doc)? {
                    out.insert(k.clone(), v);
                }
            }
            Ok(Some(Bson::Document(out)))
        }
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for e in items {
                out.push(eval_expr(e, doc)?.unwrap_or(Bson::Null));
            }
            Ok(Some(Bson::Array(out)))
        }
        Expr::Op(op, args) => {
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(eval_expr(a, doc)?);
            }
            apply_op(*op, &vals).map(Some)
        }
    }
}

fn is_nullish(v: Option<&Bson>) -> bool {
    matches!(v, None | Some(Bson::Null | Bson::Undefined))
}

fn apply_op(op: ExprOp, vals: &[Option<Bson>]) -> Result<Bson, DbError> {
    match op {
        ExprOp::Add | ExprOp::Multiply => {
            let combine: fn(&Bson, &Bson) -> Option<Bson> =
                if op == ExprOp::Add { num::add } else { num::multiply };
            let mut acc = Bson::Int32(if op == ExprOp::Add { 0 } else { 1 });
            for v in vals {
                if is_nullish(v.as_ref()) {
                    return Ok(Bson::Null);
                }
                let v = v.as_ref().unwrap_or(&Bson::Null);
                acc = combine(&acc, v).ok_or_else(|| type_error(op, "numeric", v))?;
            }
            Ok(acc)
        }
        ExprOp::Subtract | ExprOp::Divide | ExprOp::Mod => {
            let (a, b) = (vals[0].as_ref(), vals[1].as_ref());
            let (Some(a), Some(b)) = (a, b) else { return Ok(Bson::Null) };
            if is_nullish(Some(a)) || is_nullish(Some(b)) {
                return Ok(Bson::Null);
            }
            for v in [a, b] {
                if !num::is_numeric(v) {
                    return Err(type_error(op, "numeric", v));
                }
            }
            let result = match op {
                ExprOp::Subtract => num::subtract(a, b),
                ExprOp::Divide => num::divide(a, b),
                _ => num::modulo(a, b),
            };
            result.ok_or_else(|| DbError::op(format!("can't {} by zero", op.name())))
        }
        ExprOp::Concat => {
            let mut out = String::new();
            for v in vals {
                match v {
                    None | Some(Bson::Null | Bson::Undefined) => return Ok(Bson::Null),
                    Some(Bson::String(s)) => out.push_str(s),
                    Some(other) => return Err(type_error(op, "string", other)),
                }
            }
            Ok(Bson::String(out))
        }
        ExprOp::ToString => match vals[0].as_ref() {
            None | Some(Bson::Null | Bson::Undefined) => Ok(Bson::Null),
            Some(v) => to_string_value(v).map(Bson::String).ok_or_else(|| type_error(op, "convertible", v)),
        },
        ExprOp::ToUpper | ExprOp::ToLower => {
            let s = match vals[0].as_ref() {
                None | Some(Bson::Null | Bson::Undefined) => String::new(),
                Some(v) => to_string_value(v).ok_or_else(|| type_error(op, "string", v))?,
            };
            Ok(Bson::String(if op == ExprOp::ToUpper { s.to_uppercase() } else { s.to_lowercase() }))
        }
    }
}

fn to_string_value(v: &Bson) -> Option<String> {
    match v {
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(i) => Some(i.to_string()),
        Bson::Int64(i) => Some(i.to_string()),
        Bson::Double(f) => Some(f.to_string()),
        Bson::Boolean(b) => Some(b.to_string()),
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        Bson::DateTime(d) => d.try_to_rfc3339_string().ok(),
        _ => None,
    }
}

fn type_error(op: ExprOp, wanted: &str, got: &Bson) -> DbError {
    DbError::op(format!("{} only supports {wanted} types, not {:?}", op.name(), got.element_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    fn eval(spec: Bson, d: &BsonDocument) -> Option<Bson> {
        eval_expr(&parse_expr(&spec).unwrap(), d).unwrap()
    }

    #[test]
    fn decade_expression() {
        let spec = bson!({ "$concat": [ { "$toString": { "$subtract": [ { "$subtract": ["$published_year", { "$mod": ["$published_year", 10] }] }, 0 ] } }, "s" ] });
        assert_eq!(eval(spec, &doc! {"published_year": 1949}), Some(Bson::String("1940s".into())));
    }

    #[test]
    fn missing_fields_propagate() {
        assert_eq!(eval(bson!("$nope"), &doc! {}), None);
        assert_eq!(eval(bson!({"$add": ["$nope", 1]}), &doc! {}), Some(Bson::Null));
        assert_eq!(eval(bson!({"$toUpper": "$nope"}), &doc! {}), Some(Bson::String(String::new())));
    }

    #[test]
    fn literal_is_not_parsed() {
        assert_eq!(eval(bson!({"$literal": "$price"}), &doc! {"price": 1}), Some(Bson::String("$price".into())));
    }

    #[test]
    fn errors_for_bad_operands() {
        let e = parse_expr(&bson!({"$frobnicate": 1})).unwrap_err();
        assert!(e.is_operation());
        let e = parse_expr(&bson!({"$subtract": [1]})).unwrap_err();
        assert!(e.to_string().contains("exactly 2"));
        let expr = parse_expr(&bson!({"$divide": [1, 0]})).unwrap();
        assert!(eval_expr(&expr, &doc! {}).is_err());
        let expr = parse_expr(&bson!({"$add": ["a", 1]})).unwrap();
        assert!(eval_expr(&expr, &doc! {}).is_err());
    }
}
