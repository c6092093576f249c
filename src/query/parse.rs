use bson::{Bson, Document as BsonDocument};

use crate::errors::DbError;

use super::types::{
    CmpOp, Filter, MAX_IN_SET, MAX_SORT_FIELDS, MAX_UPDATE_FIELDS, Order, Projection, SortSpec,
    UpdateDoc, UpdateOp,
};

/// Parses a query document (`{ field: value | {$op: ...}, $and: [...] }`) into a `Filter`.
///
/// # Errors
/// Returns `DbError::Operation` for unknown operators or operands of the wrong shape.
pub fn parse_filter(doc: &BsonDocument) -> Result<Filter, DbError> {
    let mut clauses = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        match key.as_str() {
            "$and" => clauses.push(Filter::And(parse_clause_list(key, value)?)),
            "$or" => clauses.push(Filter::Or(parse_clause_list(key, value)?)),
            "$nor" => clauses.push(Filter::Nor(parse_clause_list(key, value)?)),
            k if k.starts_with('$') => {
                return Err(DbError::op(format!("unknown top level operator: {k}")));
            }
            field => clauses.push(parse_field(field, value)?),
        }
    }
    Ok(match clauses.len() {
        0 => Filter::True,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn parse_clause_list(op: &str, value: &Bson) -> Result<Vec<Filter>, DbError> {
    let Bson::Array(items) = value else {
        return Err(DbError::op(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(DbError::op(format!("{op} must be a nonempty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => parse_filter(d),
            _ => Err(DbError::op(format!("{op} entries must be objects"))),
        })
        .collect()
}

/// A field condition is either a literal (implicit `$eq`) or a document of operators.
fn parse_field(path: &str, value: &Bson) -> Result<Filter, DbError> {
    match value {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
            parse_operators(path, ops)
        }
        #[cfg(feature = "regex")]
        Bson::RegularExpression(re) => Ok(Filter::Regex {
            path: path.to_string(),
            pattern: re.pattern.as_str().to_string(),
            case_insensitive: re.options.as_str().contains('i'),
        }),
        literal => Ok(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: literal.clone() }),
    }
}

fn parse_operators(path: &str, ops: &BsonDocument) -> Result<Filter, DbError> {
    let mut clauses = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let cmp = |op: CmpOp| Filter::Cmp { path: path.to_string(), op, value: operand.clone() };
        let clause = match op.as_str() {
            "$eq" => cmp(CmpOp::Eq),
            "$ne" => cmp(CmpOp::Ne),
            "$gt" => cmp(CmpOp::Gt),
            "$gte" => cmp(CmpOp::Gte),
            "$lt" => cmp(CmpOp::Lt),
            "$lte" => cmp(CmpOp::Lte),
            "$in" => Filter::In { path: path.to_string(), values: operand_array(op, operand)? },
            "$nin" => Filter::Nin { path: path.to_string(), values: operand_array(op, operand)? },
            "$exists" => Filter::Exists { path: path.to_string(), exists: truthy(operand) },
            "$not" => match operand {
                Bson::Document(inner) => Filter::Not(Box::new(parse_operators(path, inner)?)),
                _ => return Err(DbError::op("$not needs a regex or a document")),
            },
            #[cfg(feature = "regex")]
            "$regex" => {
                let pattern = match operand {
                    Bson::String(s) => s.clone(),
                    Bson::RegularExpression(re) => re.pattern.as_str().to_string(),
                    _ => return Err(DbError::op("$regex has to be a string")),
                };
                let case_insensitive =
                    matches!(ops.get("$options"), Some(Bson::String(o)) if o.contains('i'));
                Filter::Regex { path: path.to_string(), pattern, case_insensitive }
            }
            #[cfg(feature = "regex")]
            "$options" => continue,
            other => return Err(DbError::op(format!("unknown operator: {other}"))),
        };
        clauses.push(clause);
    }
    Ok(if clauses.len() == 1 { clauses.remove(0) } else { Filter::And(clauses) })
}

fn operand_array(op: &str, operand: &Bson) -> Result<Vec<Bson>, DbError> {
    match operand {
        Bson::Array(values) if values.len() > MAX_IN_SET => {
            Err(DbError::op(format!("{op} list too long: {} values (max {MAX_IN_SET})", values.len())))
        }
        Bson::Array(values) => Ok(values.clone()),
        _ => Err(DbError::op(format!("{op} needs an array"))),
    }
}

/// Truthiness for flags such as `$exists` and projection values.
pub(crate) fn truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Parses an update document made of operators (`{ $set: {...}, $inc: {...} }`).
///
/// # Errors
/// Returns `DbError::Operation` for replacement-style documents, empty updates, unknown operators,
/// non-numeric `$inc`/`$mul` operands, operators with more than 128 fields and updates touching `_id`.
pub fn parse_update(doc: &BsonDocument) -> Result<UpdateDoc, DbError> {
    if doc.is_empty() {
        return Err(DbError::op("Update document must not be empty"));
    }
    let mut out = UpdateDoc::default();
    for (op, fields) in doc {
        if !op.starts_with('$') {
            return Err(DbError::op("Update document requires atomic operators"));
        }
        let Bson::Document(fields) = fields else {
            return Err(DbError::op(format!("Modifiers operate on fields but we found a non-document in {op}")));
        };
        if fields.len() > MAX_UPDATE_FIELDS {
            return Err(DbError::op(format!(
                "too many fields in {op}: {} (max {MAX_UPDATE_FIELDS})",
                fields.len()
            )));
        }
        for (path, value) in fields {
            let path = path.clone();
            let parsed = match op.as_str() {
                "$set" => UpdateOp::Set(path, value.clone()),
                "$unset" => UpdateOp::Unset(path),
                "$inc" => UpdateOp::Inc(path, numeric_operand(op, value)?),
                "$mul" => UpdateOp::Mul(path, numeric_operand(op, value)?),
                "$min" => UpdateOp::Min(path, value.clone()),
                "$max" => UpdateOp::Max(path, value.clone()),
                "$push" => UpdateOp::Push(path, value.clone()),
                "$rename" => match value {
                    Bson::String(to) => UpdateOp::Rename(path, to.clone()),
                    _ => return Err(DbError::op("$rename target must be a string")),
                },
                other => return Err(DbError::op(format!("Unknown modifier: {other}"))),
            };
            out.ops.push(parsed);
        }
    }
    Ok(out)
}

fn numeric_operand(op: &str, value: &Bson) -> Result<Bson, DbError> {
    match value {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Ok(value.clone()),
        _ => Err(DbError::op(format!("Cannot {op} with non-numeric argument"))),
    }
}

/// Parses `{ field: 1 | -1, ... }` keeping key order.
///
/// # Errors
/// Returns `DbError::Operation` for directions other than 1 and -1.
pub fn parse_sort(doc: &BsonDocument) -> Result<Vec<SortSpec>, DbError> {
    if doc.len() > MAX_SORT_FIELDS {
        return Err(DbError::op(format!("too many sort fields: {}", doc.len())));
    }
    doc.iter()
        .map(|(field, dir)| {
            let order = match direction(dir) {
                Some(1) => Order::Asc,
                Some(-1) => Order::Desc,
                _ => return Err(DbError::op(format!("bad sort specification for {field}"))),
            };
            Ok(SortSpec { field: field.clone(), order })
        })
        .collect()
}

/// Index and sort directions: integral `1` / `-1` in any numeric type.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn direction(v: &Bson) -> Option<i32> {
    match v {
        Bson::Int32(i) => Some(*i),
        Bson::Int64(i) => i32::try_from(*i).ok(),
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i32),
        _ => None,
    }
}

/// Parses a find projection.
///
/// # Errors
/// Returns `DbError::Operation` when inclusion and exclusion are mixed on fields other than `_id`.
pub fn parse_projection(doc: &BsonDocument) -> Result<Projection, DbError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    let mut keep_id = true;
    for (field, v) in doc {
        let on = truthy(v);
        if field == "_id" {
            keep_id = on;
            continue;
        }
        if on { include.push(field.clone()) } else { exclude.push(field.clone()) }
    }
    match (include.is_empty(), exclude.is_empty()) {
        (false, false) => Err(DbError::op(format!(
            "Cannot do exclusion on field {} in inclusion projection",
            exclude[0]
        ))),
        (true, false) => {
            if !keep_id {
                exclude.push("_id".to_string());
            }
            Ok(Projection::Exclude { fields: exclude })
        }
        (false, true) => Ok(Projection::Include { fields: include, keep_id }),
        (true, true) if keep_id => Ok(Projection::Exclude { fields: Vec::new() }),
        (true, true) => Ok(Projection::Exclude { fields: vec!["_id".to_string()] }),
    }
}
