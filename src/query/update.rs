use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use crate::errors::DbError;
use crate::num;

use super::eval::{compare_bson, get_path, set_path, unset_path, update_path};
use super::types::{CmpOp, Filter, UpdateDoc, UpdateOp};

fn touches_id(path: &str) -> bool {
    path == "_id" || path.starts_with("_id.")
}

/// Applies `upd` in place. Returns whether the document changed.
///
/// # Errors
/// Returns `DbError::Operation` when an operator cannot be applied to the stored value
/// (e.g. `$inc` on a string), when a path runs through a scalar or when the immutable `_id`
/// would change.
pub fn apply_update(doc: &mut BsonDocument, upd: &UpdateDoc) -> Result<bool, DbError> {
    let original_id = doc.get("_id").cloned();
    let mut modified = false;
    for op in &upd.ops {
        modified |= apply_op(doc, op)?;
    }
    if doc.get("_id") != original_id.as_ref() {
        return Err(DbError::op(
            "Performing an update on the path '_id' would modify the immutable field '_id'",
        ));
    }
    Ok(modified)
}

fn apply_op(doc: &mut BsonDocument, op: &UpdateOp) -> Result<bool, DbError> {
    let path = op.path();
    match op {
        UpdateOp::Set(_, v) => update_path(doc, path, v.clone()),
        UpdateOp::Unset(_) => {
            if touches_id(path) {
                return Err(DbError::op("Performing an update on the path '_id' would modify the immutable field '_id'"));
            }
            Ok(unset_path(doc, path).is_some())
        }
        UpdateOp::Inc(_, delta) => match get_path(doc, path) {
            None => update_path(doc, path, delta.clone()),
            Some(cur) => {
                let next = num::add(cur, delta).ok_or_else(|| non_numeric("$inc", path))?;
                update_path(doc, path, next)
            }
        },
        UpdateOp::Mul(_, factor) => match get_path(doc, path) {
            None => {
                let zero = num::multiply(factor, &Bson::Int32(0)).unwrap_or(Bson::Int32(0));
                update_path(doc, path, zero)
            }
            Some(cur) => {
                let next = num::multiply(cur, factor).ok_or_else(|| non_numeric("$mul", path))?;
                update_path(doc, path, next)
            }
        },
        UpdateOp::Min(_, v) => replace_if(doc, path, v, Ordering::Less),
        UpdateOp::Max(_, v) => replace_if(doc, path, v, Ordering::Greater),
        UpdateOp::Rename(from, to) => {
            if touches_id(from) || touches_id(to) {
                return Err(DbError::op("The source and target field for $rename must not be '_id'"));
            }
            match unset_path(doc, from) {
                Some(v) => {
                    update_path(doc, to, v)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        UpdateOp::Push(_, v) => match get_path(doc, path).cloned() {
            None => update_path(doc, path, Bson::Array(vec![v.clone()])),
            Some(Bson::Array(mut items)) => {
                items.push(v.clone());
                update_path(doc, path, Bson::Array(items))
            }
            Some(_) => Err(DbError::op(format!("The field '{path}' must be an array"))),
        },
    }
}

fn replace_if(doc: &mut BsonDocument, path: &str, candidate: &Bson, wanted: Ordering) -> Result<bool, DbError> {
    match get_path(doc, path) {
        Some(cur) if compare_bson(candidate, cur) != wanted => Ok(false),
        _ => update_path(doc, path, candidate.clone()),
    }
}

fn non_numeric(op: &str, path: &str) -> DbError {
    DbError::op(format!("Cannot apply {op} to a value of non-numeric type at '{path}'"))
}

/// Seed document for an upsert: the filter's top-level equality conditions.
#[must_use]
pub fn upsert_seed(filter: &Filter) -> BsonDocument {
    let mut seed = BsonDocument::new();
    collect_equalities(filter, &mut seed);
    seed
}

fn collect_equalities(filter: &Filter, seed: &mut BsonDocument) {
    match filter {
        Filter::Cmp { path, op: CmpOp::Eq, value } => {
            set_path(seed, path, value.clone());
        }
        Filter::And(fs) => fs.iter().for_each(|f| collect_equalities(f, seed)),
        _ => {}
    }
}
