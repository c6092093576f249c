use bson::{Bson, Document as BsonDocument};

use crate::errors::DbError;
use crate::num;
use crate::query::eval::{compare_docs, eval_filter, get_path, set_path, unset_path, values_equal};
use crate::query::{Filter, SortSpec, parse_filter, parse_sort, truthy};

use super::accum::{AccSpec, AccState, parse_accumulator};
use super::expr::{Expr, eval_expr, parse_expr};

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectSpec {
    /// Kept or computed fields, in the order given. `None` copies the field as stored.
    Include { keep_id: bool, fields: Vec<(String, Option<Expr>)> },
    Exclude(Vec<String>),
}

#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Project(ProjectSpec),
    AddFields(Vec<(String, Expr)>),
    Group { id: Expr, accumulators: Vec<AccSpec> },
    Sort(Vec<SortSpec>),
    Limit(usize),
    Skip(usize),
    Count(String),
    Unwind { path: String, preserve_null_and_empty: bool },
}

impl Stage {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Project(_) => "$project",
            Self::AddFields(_) => "$addFields",
            Self::Group { .. } => "$group",
            Self::Sort(_) => "$sort",
            Self::Limit(_) => "$limit",
            Self::Skip(_) => "$skip",
            Self::Count(_) => "$count",
            Self::Unwind { .. } => "$unwind",
        }
    }
}

/// Parses a pipeline. Every stage document must hold exactly one stage.
///
/// # Errors
/// Returns `DbError::Operation` for unknown stages and malformed stage specifications.
pub fn parse_pipeline(stages: &[BsonDocument]) -> Result<Vec<Stage>, DbError> {
    stages.iter().map(parse_stage).collect()
}

fn parse_stage(doc: &BsonDocument) -> Result<Stage, DbError> {
    let mut entries = doc.iter();
    let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
        return Err(DbError::op("A pipeline stage specification object must contain exactly one field."));
    };
    match name.as_str() {
        "$match" => Ok(Stage::Match(parse_filter(stage_document(name, spec)?)?)),
        "$project" => Ok(Stage::Project(parse_project(stage_document(name, spec)?)?)),
        "$addFields" | "$set" => {
            let fields = stage_document(name, spec)?
                .iter()
                .map(|(k, v)| Ok((k.clone(), parse_expr(v)?)))
                .collect::<Result<Vec<_>, DbError>>()?;
            Ok(Stage::AddFields(fields))
        }
        "$group" => parse_group(stage_document(name, spec)?),
        "$sort" => {
            let sort = stage_document(name, spec)?;
            if sort.is_empty() {
                return Err(DbError::op("$sort stage must have at least one sort key"));
            }
            Ok(Stage::Sort(parse_sort(sort)?))
        }
        "$limit" => match num::bson_to_i64(spec).and_then(num::i64_to_usize) {
            Some(n) if n > 0 => Ok(Stage::Limit(n)),
            _ => Err(DbError::op("the limit must be positive")),
        },
        "$skip" => num::bson_to_i64(spec)
            .and_then(num::i64_to_usize)
            .map(Stage::Skip)
            .ok_or_else(|| DbError::op("invalid argument to $skip stage: Expected a non-negative number")),
        "$count" => match spec {
            Bson::String(f) if !f.is_empty() && !f.starts_with('$') && !f.contains('.') => {
                Ok(Stage::Count(f.clone()))
            }
            _ => Err(DbError::op("the count field must be a non-empty string without '$' or '.'")),
        },
        "$unwind" => parse_unwind(spec),
        other => Err(DbError::op(format!("Unrecognized pipeline stage name: '{other}'"))),
    }
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> Result<&'a BsonDocument, DbError> {
    match spec {
        Bson::Document(d) => Ok(d),
        _ => Err(DbError::op(format!("the {name} specification must be an object"))),
    }
}

fn parse_project(spec: &BsonDocument) -> Result<ProjectSpec, DbError> {
    if spec.is_empty() {
        return Err(DbError::op("$project requires at least one output field"));
    }
    let mut keep_id = true;
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for (field, v) in spec {
        let is_flag = matches!(v, Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_));
        match (field.as_str(), is_flag) {
            ("_id", true) => keep_id = truthy(v),
            (_, true) if truthy(v) => included.push((field.clone(), None)),
            (_, true) => excluded.push(field.clone()),
            (_, false) => included.push((field.clone(), Some(parse_expr(v)?))),
        }
    }
    if !included.is_empty() && !excluded.is_empty() {
        return Err(DbError::op(format!(
            "Invalid $project :: caused by :: Cannot do exclusion on field {} in inclusion projection",
            excluded[0]
        )));
    }
    if included.is_empty() {
        if !keep_id {
            excluded.push("_id".to_string());
        }
        return Ok(ProjectSpec::Exclude(excluded));
    }
    // A computed `_id` replaces the stored one.
    if included.iter().any(|(f, _)| f == "_id") {
        keep_id = false;
    }
    Ok(ProjectSpec::Include { keep_id, fields: included })
}

fn parse_group(spec: &BsonDocument) -> Result<Stage, DbError> {
    let Some(id_spec) = spec.get("_id") else {
        return Err(DbError::op("a group specification must include an _id"));
    };
    let id = parse_expr(id_spec)?;
    let accumulators = spec
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .map(|(k, v)| parse_accumulator(k, v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage::Group { id, accumulators })
}

fn parse_unwind(spec: &Bson) -> Result<Stage, DbError> {
    let (path, preserve) = match spec {
        Bson::String(p) => (p.as_str(), false),
        Bson::Document(d) => match d.get("path") {
            Some(Bson::String(p)) => (
                p.as_str(),
                d.get("preserveNullAndEmptyArrays").is_some_and(truthy),
            ),
            _ => return Err(DbError::op("no path specified to $unwind stage")),
        },
        _ => return Err(DbError::op("expected either a string or an object as specification for $unwind stage")),
    };
    let Some(field) = path.strip_prefix('$').filter(|f| !f.is_empty()) else {
        return Err(DbError::op("path option to $unwind stage should be prefixed with a '$'"));
    };
    Ok(Stage::Unwind { path: field.to_string(), preserve_null_and_empty: preserve })
}

/// Runs parsed stages over `docs` in order.
///
/// # Errors
/// Returns `DbError::Operation` when an expression fails on a document.
pub fn run_stages(stages: &[Stage], mut docs: Vec<BsonDocument>) -> Result<Vec<BsonDocument>, DbError> {
    for stage in stages {
        docs = run_stage(stage, docs)?;
    }
    Ok(docs)
}

fn run_stage(stage: &Stage, docs: Vec<BsonDocument>) -> Result<Vec<BsonDocument>, DbError> {
    Ok(match stage {
        Stage::Match(filter) => docs.into_iter().filter(|d| eval_filter(d, filter)).collect(),
        Stage::Project(spec) => docs.iter().map(|d| project_one(spec, d)).collect::<Result<_, _>>()?,
        Stage::AddFields(fields) => {
            let mut out = Vec::with_capacity(docs.len());
            for mut d in docs {
                let computed = fields
                    .iter()
                    .map(|(f, e)| Ok((f, eval_expr(e, &d)?)))
                    .collect::<Result<Vec<_>, DbError>>()?;
                for (f, v) in computed {
                    if let Some(v) = v {
                        set_path(&mut d, f, v);
                    }
                }
                out.push(d);
            }
            out
        }
        Stage::Group { id, accumulators } => group(id, accumulators, &docs)?,
        Stage::Sort(sort) => {
            let mut docs = docs;
            docs.sort_by(|a, b| compare_docs(a, b, sort));
            docs
        }
        Stage::Limit(n) => docs.into_iter().take(*n).collect(),
        Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
        Stage::Count(field) => {
            if docs.is_empty() {
                Vec::new()
            } else {
                let n = i32::try_from(docs.len())
                    .map_or_else(|_| Bson::Int64(i64::try_from(docs.len()).unwrap_or(i64::MAX)), Bson::Int32);
                let mut out = BsonDocument::new();
                out.insert(field.clone(), n);
                vec![out]
            }
        }
        Stage::Unwind { path, preserve_null_and_empty } => unwind(path, *preserve_null_and_empty, docs),
    })
}

fn project_one(spec: &ProjectSpec, doc: &BsonDocument) -> Result<BsonDocument, DbError> {
    match spec {
        ProjectSpec::Exclude(fields) => {
            let mut out = doc.clone();
            for f in fields {
                unset_path(&mut out, f);
            }
            Ok(out)
        }
        ProjectSpec::Include { keep_id, fields } => {
            let mut out = BsonDocument::new();
            if *keep_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id", id.clone());
                }
            }
            for (f, expr) in fields {
                let value = match expr {
                    Some(e) => eval_expr(e, doc)?,
                    None => get_path(doc, f).cloned(),
                };
                if let Some(v) = value {
                    set_path(&mut out, f, v);
                }
            }
            Ok(out)
        }
    }
}

/// Groups in first-seen order of the `_id` value.
fn group(id: &Expr, accumulators: &[AccSpec], docs: &[BsonDocument]) -> Result<Vec<BsonDocument>, DbError> {
    let mut groups: Vec<(Bson, Vec<AccState>)> = Vec::new();
    for doc in docs {
        let key = eval_expr(id, doc)?.unwrap_or(Bson::Null);
        let pos = match groups.iter().position(|(k, _)| values_equal(k, &key)) {
            Some(p) => p,
            None => {
                groups.push((key, accumulators.iter().map(|a| AccState::new(a.op)).collect()));
                groups.len() - 1
            }
        };
        for (state, spec) in groups[pos].1.iter_mut().zip(accumulators) {
            state.accumulate(spec, doc)?;
        }
    }
    Ok(groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = BsonDocument::new();
            out.insert("_id", key);
            for (state, spec) in states.into_iter().zip(accumulators) {
                out.insert(spec.field.clone(), state.finish());
            }
            out
        })
        .collect())
}

fn unwind(path: &str, preserve: bool, docs: Vec<BsonDocument>) -> Vec<BsonDocument> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match get_path(&doc, path).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item);
                    out.push(copy);
                }
            }
            Some(Bson::Array(_) | Bson::Null | Bson::Undefined) | None => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    out
}
