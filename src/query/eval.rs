use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use crate::errors::DbError;

use super::types::{
    CmpOp, Filter, MAX_ARRAY_PADDING, MAX_PATH_DEPTH, MAX_SORT_FIELDS, Order, Projection, SortSpec,
};

#[must_use]
pub fn eval_filter(doc: &BsonDocument, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => path_values(doc, path).is_empty() != *exists,
        Filter::In { path, values } => is_in_set(&path_values(doc, path), values),
        Filter::Nin { path, values } => !is_in_set(&path_values(doc, path), values),
        Filter::Cmp { path, op, value } => {
            let found = path_values(doc, path);
            match op {
                CmpOp::Eq => matches_eq(&found, value),
                CmpOp::Ne => !matches_eq(&found, value),
                CmpOp::Gt | CmpOp::Gte | CmpOp::Lt | CmpOp::Lte => {
                    found.iter().any(|v| any_element(v, |x| range_holds(x, *op, value)))
                }
            }
        }
        #[cfg(feature = "regex")]
        Filter::Regex { path, pattern, case_insensitive } => {
            let mut re = regex::RegexBuilder::new(pattern);
            re.case_insensitive(*case_insensitive);
            let Ok(r) = re.build() else { return false };
            path_values(doc, path)
                .iter()
                .any(|v| any_element(v, |x| matches!(x, Bson::String(s) if r.is_match(s))))
        }
    }
}

/// Applies `pred` to the value itself and, for arrays, to each element.
fn any_element(v: &Bson, pred: impl Fn(&Bson) -> bool) -> bool {
    if pred(v) {
        return true;
    }
    match v {
        Bson::Array(items) => items.iter().any(pred),
        _ => false,
    }
}

fn matches_eq(found: &[&Bson], value: &Bson) -> bool {
    if found.is_empty() {
        return matches!(value, Bson::Null);
    }
    found.iter().any(|v| any_element(v, |x| values_equal(x, value)))
}

fn is_in_set(found: &[&Bson], values: &[Bson]) -> bool {
    values.iter().any(|x| matches_eq(found, x))
}

fn range_holds(v: &Bson, op: CmpOp, value: &Bson) -> bool {
    let Some(ord) = compare_same_bracket(v, value) else { return false };
    match op {
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Gte => ord != Ordering::Less,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Lte => ord != Ordering::Greater,
        CmpOp::Eq | CmpOp::Ne => false,
    }
}

#[must_use]
pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut iter = path.split('.');
    let first = iter.next()?;
    let mut depth = 1usize;
    let mut cur: Option<&Bson> = doc.get(first);
    for part in iter {
        depth += 1;
        if depth > MAX_PATH_DEPTH {
            return None;
        }
        match cur {
            Some(Bson::Document(d)) => cur = d.get(part),
            Some(Bson::Array(items)) => cur = items.get(part.parse::<usize>().ok()?),
            _ => return None,
        }
    }
    cur
}

/// Every value `path` reaches. Named segments fan out over array elements, numeric
/// segments pick an array position.
#[must_use]
pub fn path_values<'a>(doc: &'a BsonDocument, path: &str) -> Vec<&'a Bson> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if parts.len() > MAX_PATH_DEPTH {
        return out;
    }
    if let Some((first, rest)) = parts.split_first()
        && let Some(v) = doc.get(*first)
    {
        collect_values(v, rest, &mut out);
    }
    out
}

fn collect_values<'a>(v: &'a Bson, rest: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((part, tail)) = rest.split_first() else {
        out.push(v);
        return;
    };
    match v {
        Bson::Document(d) => {
            if let Some(next) = d.get(*part) {
                collect_values(next, tail, out);
            }
        }
        Bson::Array(items) => match part.parse::<usize>() {
            Ok(pos) => {
                if let Some(next) = items.get(pos) {
                    collect_values(next, tail, out);
                }
            }
            Err(_) => {
                for item in items {
                    if let Bson::Document(d) = item
                        && let Some(next) = d.get(*part)
                    {
                        collect_values(next, tail, out);
                    }
                }
            }
        },
        _ => {}
    }
}

/// Sets `path`, replacing non-document parents with documents. Used when building output
/// documents. Returns whether the stored value changed.
pub(crate) fn set_path(doc: &mut BsonDocument, path: &str, val: Bson) -> bool {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else { return false };
    let mut cur = doc;
    for key in parents {
        if !matches!(cur.get(*key), Some(Bson::Document(_))) {
            cur.insert((*key).to_string(), Bson::Document(BsonDocument::new()));
        }
        match cur.get_mut(*key) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    let changed = cur.get(*last).is_none_or(|p| *p != val);
    cur.insert((*last).to_string(), val);
    changed
}

/// Update-operator form of [`set_path`]: numeric segments address array positions (padding
/// with nulls), missing parents become documents and a scalar parent is an error.
pub(crate) fn update_path(doc: &mut BsonDocument, path: &str, val: Bson) -> Result<bool, DbError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() > MAX_PATH_DEPTH {
        return Err(DbError::op(format!("path '{path}' is nested too deeply")));
    }
    update_in_doc(doc, &parts, val)
}

fn update_in_doc(doc: &mut BsonDocument, parts: &[&str], val: Bson) -> Result<bool, DbError> {
    let Some((key, rest)) = parts.split_first() else { return Ok(false) };
    if rest.is_empty() {
        // Type-strict: `$set` of 1.0 over 1 is a modification.
        let changed = doc.get(*key).is_none_or(|p| *p != val);
        doc.insert((*key).to_string(), val);
        return Ok(changed);
    }
    if !doc.contains_key(*key) {
        doc.insert((*key).to_string(), Bson::Document(BsonDocument::new()));
    }
    match doc.get_mut(*key) {
        Some(child) => update_in_value(child, key, rest, val),
        None => Ok(false),
    }
}

fn update_in_value(v: &mut Bson, name: &str, parts: &[&str], val: Bson) -> Result<bool, DbError> {
    match v {
        Bson::Document(d) => update_in_doc(d, parts, val),
        Bson::Array(items) => {
            let Some((seg, rest)) = parts.split_first() else { return Ok(false) };
            let pos: usize = seg
                .parse()
                .map_err(|_| DbError::op(format!("Cannot create field '{seg}' in array '{name}'")))?;
            if pos > items.len() + MAX_ARRAY_PADDING {
                return Err(DbError::op(format!("can't backfill array '{name}' to position {pos}")));
            }
            if pos >= items.len() {
                items.resize(pos + 1, Bson::Null);
                if !rest.is_empty() {
                    items[pos] = Bson::Document(BsonDocument::new());
                }
            }
            if rest.is_empty() {
                let changed = items[pos] != val;
                items[pos] = val;
                return Ok(changed);
            }
            update_in_value(&mut items[pos], seg, rest, val)
        }
        other => {
            let field = parts.first().copied().unwrap_or_default();
            Err(DbError::op(format!("Cannot create field '{field}' in element {{{name}: {other}}}")))
        }
    }
}

/// Removes `path`, returning the previous value.
pub(crate) fn unset_path(doc: &mut BsonDocument, path: &str) -> Option<Bson> {
    let parts: Vec<&str> = path.split('.').collect();
    let (last, parents) = parts.split_last()?;
    let mut cur = doc;
    for key in parents {
        match cur.get_mut(*key) {
            Some(Bson::Document(d)) => cur = d,
            _ => return None,
        }
    }
    cur.remove(*last)
}

/// Order of BSON types when values of different types are compared.
const fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn to_f64(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

fn to_i64(b: &Bson) -> Option<i64> {
    match b {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

/// Total order used by sorts, `$min`/`$max` and index keys.
#[must_use]
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    if let (Some(x), Some(y)) = (to_i64(a), to_i64(b)) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (to_f64(a), to_f64(b)) {
        return x.partial_cmp(&y).unwrap_or_else(|| x.is_nan().cmp(&y.is_nan()).reverse());
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Array(x), Bson::Array(y)) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                let o = compare_bson(ex, ey);
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Document(x), Bson::Document(y)) => {
            for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
                let o = kx.cmp(ky).then_with(|| compare_bson(vx, vy));
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

/// Comparison for query range operators: values of different type brackets never compare.
#[must_use]
pub fn compare_same_bracket(a: &Bson, b: &Bson) -> Option<Ordering> {
    (type_rank(a) == type_rank(b)).then(|| compare_bson(a, b))
}

/// Equality with numeric widening (`1 == 1.0`) and structural comparison of documents and arrays.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| values_equal(p, q))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter().zip(y.iter()).all(|((kx, vx), (ky, vy))| kx == ky && values_equal(vx, vy))
        }
        _ => {
            if let (Some(x), Some(y)) = (to_i64(a), to_i64(b)) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (to_f64(a), to_f64(b)) {
                return x == y;
            }
            a == b
        }
    }
}

#[must_use]
pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let va = get_path(a, &s.field).unwrap_or(&Bson::Null);
        let vb = get_path(b, &s.field).unwrap_or(&Bson::Null);
        let ord = compare_bson(va, vb);
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

#[must_use]
pub fn project(doc: &BsonDocument, projection: &Projection) -> BsonDocument {
    match projection {
        Projection::Include { fields, keep_id } => {
            let mut out = BsonDocument::new();
            if *keep_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id", id.clone());
                }
            }
            for f in fields {
                if let Some(v) = get_path(doc, f) {
                    set_path(&mut out, f, v.clone());
                }
            }
            out
        }
        Projection::Exclude { fields } => {
            let mut out = doc.clone();
            for f in fields {
                unset_path(&mut out, f);
            }
            out
        }
    }
}
