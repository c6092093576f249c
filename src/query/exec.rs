use bson::Document as BsonDocument;
use std::time::Instant;

use crate::collection::Collection;
use crate::errors::DbError;
use crate::num;

use super::cursor::Cursor;
use super::eval::{compare_docs, project};
use super::plan::Plan;
use super::types::{DeleteReport, Filter, FindOptions, UpdateDoc, UpdateReport};
use super::update::{apply_update, upsert_seed};

/// Counters gathered while running a find; explain reports them as `executionStats`.
#[derive(Debug, Clone)]
pub struct ExecStats {
    pub plan: Plan,
    pub n_returned: u64,
    pub keys_examined: u64,
    pub docs_examined: u64,
    pub millis: u64,
}

pub fn find_docs(col: &Collection, filter: &Filter, opts: &FindOptions) -> (Cursor, ExecStats) {
    let start = Instant::now();
    let plan = col.plan(filter);
    let scan = col.scan(filter, &plan);
    let mut docs: Vec<BsonDocument> = scan.records.into_iter().map(|(_, d)| d).collect();

    if let Some(sort) = &opts.sort {
        docs.sort_by(|a, b| compare_docs(a, b, sort));
    }

    let skip = opts.skip.unwrap_or(0);
    let limit = opts.limit.unwrap_or(usize::MAX);
    let mut docs: Vec<BsonDocument> = docs.into_iter().skip(skip).take(limit).collect();

    if let Some(projection) = &opts.projection {
        for d in &mut docs {
            *d = project(d, projection);
        }
    }

    let stats = ExecStats {
        plan,
        n_returned: num::usize_to_u64(docs.len()),
        keys_examined: scan.keys_examined,
        docs_examined: scan.docs_examined,
        millis: num::u128_to_u64_saturating(start.elapsed().as_millis()),
    };
    (Cursor::new(docs), stats)
}

#[must_use]
pub fn count_docs(col: &Collection, filter: &Filter) -> usize {
    col.scan(filter, &col.plan(filter)).records.len()
}

/// Updates the first document (natural order) matching `filter`.
///
/// No match is a zero report unless `upsert` is set, in which case a document seeded from the
/// filter's equality conditions is inserted.
///
/// # Errors
/// Returns `DbError::Operation` when the update cannot be applied or breaks a unique index.
pub fn update_one(
    col: &Collection,
    filter: &Filter,
    update: &UpdateDoc,
    upsert: bool,
) -> Result<UpdateReport, DbError> {
    let scan = col.scan(filter, &col.plan(filter));
    if let Some((rid, mut doc)) = scan.records.into_iter().next() {
        let changed = apply_update(&mut doc, update)?;
        if changed {
            col.replace_record(rid, doc)?;
        }
        return Ok(UpdateReport { matched: 1, modified: u64::from(changed), upserted_id: None });
    }
    if !upsert {
        return Ok(UpdateReport::default());
    }
    let mut seed = upsert_seed(filter);
    apply_update(&mut seed, update)?;
    let id = col.insert_document(seed)?;
    Ok(UpdateReport { matched: 0, modified: 0, upserted_id: Some(id) })
}

/// Deletes the first document (natural order) matching `filter`.
#[must_use]
pub fn delete_one(col: &Collection, filter: &Filter) -> DeleteReport {
    let scan = col.scan(filter, &col.plan(filter));
    let deleted = scan.records.first().is_some_and(|(rid, _)| col.delete_record(*rid));
    DeleteReport { deleted: u64::from(deleted) }
}
