use bson::{Bson, Document as BsonDocument, doc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Weak};

use crate::aggregate::{Stage, parse_pipeline, run_stages};
use crate::catalog::{FindSpec, IndexOptions, UpdateOptions, Verbosity};
use crate::collection::Collection;
use crate::errors::DbError;
use crate::num;
use crate::query::plan::winning_plan;
use crate::query::{
    Cursor, DeleteReport, FindOptions, IndexDescription, IndexReport, InsertReport, UpdateReport, count_docs,
    delete_one, direction, find_docs, parse_filter, parse_projection, parse_sort, parse_update, update_one,
};
use crate::store::{DocumentStore, Namespace};

/// Labeled engines. Entries are weak: an engine lives while a connection holds it.
static SHARED: LazyLock<Mutex<HashMap<String, Weak<Engine>>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// The embedded in-memory document store.
///
/// Collections live in a map keyed by namespace and are created on first write or index
/// declaration. Reads of a missing collection see no documents.
#[derive(Debug, Default)]
pub struct Engine {
    label: String,
    collections: RwLock<HashMap<Namespace, Arc<Collection>>>,
}

impl Engine {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), collections: RwLock::new(HashMap::new()) }
    }

    /// Returns the live engine registered under `label`, creating it when none is held.
    /// An empty label always yields a fresh, unshared engine. Once every handle to a labeled
    /// engine is dropped its data is gone and the label is free again.
    #[must_use]
    pub fn shared(label: &str) -> Arc<Self> {
        if label.is_empty() {
            return Arc::new(Self::new(label));
        }
        let mut shared = SHARED.lock();
        if let Some(live) = shared.get(label).and_then(Weak::upgrade) {
            return live;
        }
        shared.retain(|_, w| w.strong_count() > 0);
        let engine = Arc::new(Self::new(label));
        shared.insert(label.to_string(), Arc::downgrade(&engine));
        engine
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn collection(&self, ns: &Namespace) -> Option<Arc<Collection>> {
        self.collections.read().get(ns).cloned()
    }

    fn collection_or_create(&self, ns: &Namespace) -> Arc<Collection> {
        if let Some(c) = self.collection(ns) {
            return c;
        }
        let mut collections = self.collections.write();
        Arc::clone(
            collections
                .entry(ns.clone())
                .or_insert_with(|| Arc::new(Collection::new(ns.collection.clone()))),
        )
    }

    /// Existing collection, or an empty unregistered one for reads.
    fn collection_for_read(&self, ns: &Namespace) -> Arc<Collection> {
        self.collection(ns).unwrap_or_else(|| Arc::new(Collection::new(ns.collection.clone())))
    }
}

/// Parses the document form of a find into executable options.
///
/// # Errors
/// Returns `DbError::Operation` for malformed projections or sorts.
pub fn find_options(spec: &FindSpec) -> Result<FindOptions, DbError> {
    let projection = spec.projection.as_ref().map(parse_projection).transpose()?;
    let sort = match &spec.sort {
        Some(s) if !s.is_empty() => Some(parse_sort(s)?),
        _ => None,
    };
    let limit = match spec.limit {
        None | Some(0) => None,
        Some(n) => Some(num::i64_to_usize(n.saturating_abs()).unwrap_or(usize::MAX)),
    };
    let skip = spec.skip.map(|n| usize::try_from(n).unwrap_or(usize::MAX));
    Ok(FindOptions { projection, sort, limit, skip })
}

fn parse_index_keys(keys: &BsonDocument) -> Result<Vec<(String, i32)>, DbError> {
    keys.iter()
        .map(|(field, v)| {
            direction(v)
                .map(|d| (field.clone(), d))
                .ok_or_else(|| DbError::op(format!("Values in the index key pattern must be 1 or -1, got {v} for {field}")))
        })
        .collect()
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl DocumentStore for Engine {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn find(&self, ns: &Namespace, spec: &FindSpec) -> Result<Cursor, DbError> {
        let filter = parse_filter(&spec.filter)?;
        let opts = find_options(spec)?;
        let Some(col) = self.collection(ns) else { return Ok(Cursor::new(Vec::new())) };
        let (cursor, stats) = find_docs(&col, &filter, &opts);
        log::debug!(
            "find on {ns}: plan={} returned={} docs_examined={}",
            stats.plan.index_name().unwrap_or("COLLSCAN"),
            stats.n_returned,
            stats.docs_examined
        );
        Ok(cursor)
    }

    fn count_documents(&self, ns: &Namespace, filter: &BsonDocument) -> Result<u64, DbError> {
        let filter = parse_filter(filter)?;
        Ok(self.collection(ns).map_or(0, |col| num::usize_to_u64(count_docs(&col, &filter))))
    }

    fn insert_many(&self, ns: &Namespace, docs: Vec<BsonDocument>) -> Result<InsertReport, DbError> {
        let col = self.collection_or_create(ns);
        let mut inserted_ids = Vec::with_capacity(docs.len());
        for d in docs {
            inserted_ids.push(col.insert_document(d)?);
        }
        Ok(InsertReport { inserted_ids })
    }

    fn update_one(
        &self,
        ns: &Namespace,
        filter: &BsonDocument,
        update: &BsonDocument,
        options: &UpdateOptions,
    ) -> Result<UpdateReport, DbError> {
        let filter = parse_filter(filter)?;
        let update = parse_update(update)?;
        let col = if options.upsert {
            self.collection_or_create(ns)
        } else {
            match self.collection(ns) {
                Some(c) => c,
                None => return Ok(UpdateReport::default()),
            }
        };
        update_one(&col, &filter, &update, options.upsert)
    }

    fn delete_one(&self, ns: &Namespace, filter: &BsonDocument) -> Result<DeleteReport, DbError> {
        let filter = parse_filter(filter)?;
        Ok(self.collection(ns).map_or_else(DeleteReport::default, |col| delete_one(&col, &filter)))
    }

    fn aggregate(&self, ns: &Namespace, pipeline: &[BsonDocument]) -> Result<Vec<BsonDocument>, DbError> {
        let stages = parse_pipeline(pipeline)?;
        let col = self.collection_for_read(ns);
        // A leading $match can use an index.
        let (input, rest) = match stages.split_first() {
            Some((Stage::Match(filter), rest)) => {
                let scan = col.scan(filter, &col.plan(filter));
                (scan.records.into_iter().map(|(_, d)| d).collect(), rest)
            }
            _ => (col.get_all_documents(), stages.as_slice()),
        };
        run_stages(rest, input)
    }

    fn create_index(
        &self,
        ns: &Namespace,
        keys: &BsonDocument,
        options: &IndexOptions,
    ) -> Result<IndexReport, DbError> {
        let keys = parse_index_keys(keys)?;
        self.collection_or_create(ns).create_index(keys, options.name.clone(), options.unique)
    }

    fn list_indexes(&self, ns: &Namespace) -> Result<Vec<IndexDescription>, DbError> {
        Ok(self.collection(ns).map(|c| c.list_indexes()).unwrap_or_default())
    }

    fn explain(&self, ns: &Namespace, spec: &FindSpec, verbosity: Verbosity) -> Result<BsonDocument, DbError> {
        let filter = parse_filter(&spec.filter)?;
        let opts = find_options(spec)?;
        let col = self.collection_for_read(ns);
        let (_, stats) = find_docs(&col, &filter, &opts);
        let mut out = doc! {
            "explainVersion": "1",
            "queryPlanner": {
                "namespace": ns.to_string(),
                "parsedQuery": spec.filter.clone(),
                "winningPlan": winning_plan(&stats.plan, &spec.filter, &opts),
                "rejectedPlans": Bson::Array(Vec::new()),
            },
        };
        if verbosity.includes_stats() {
            out.insert(
                "executionStats",
                doc! {
                    "executionSuccess": true,
                    "nReturned": to_i64(stats.n_returned),
                    "executionTimeMillis": to_i64(stats.millis),
                    "totalKeysExamined": to_i64(stats.keys_examined),
                    "totalDocsExamined": to_i64(stats.docs_examined),
                },
            );
        }
        Ok(out)
    }

    fn shutdown(&self) {
        log::debug!("memory store '{}' released", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_conventions() {
        let opts = find_options(&FindSpec::new(doc! {}).limit(0)).unwrap();
        assert_eq!(opts.limit, None);
        let opts = find_options(&FindSpec::new(doc! {}).limit(-3)).unwrap();
        assert_eq!(opts.limit, Some(3));
    }

    #[test]
    fn shared_engines_by_label() {
        let a = Engine::shared("engine-unit-shared");
        let b = Engine::shared("engine-unit-shared");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.label(), "engine-unit-shared");
        let c = Engine::shared("");
        let d = Engine::shared("");
        assert!(!Arc::ptr_eq(&c, &d));
    }

    #[test]
    fn labeled_engines_are_released_with_their_last_handle() {
        let ns = Namespace::new("db", "c");
        let first = Engine::shared("engine-unit-release");
        first.insert_many(&ns, vec![doc! {"x": 1}]).unwrap();
        let second = Engine::shared("engine-unit-release");
        drop(first);
        assert_eq!(second.count_documents(&ns, &doc! {}).unwrap(), 1);
        let weak = Arc::downgrade(&second);
        drop(second);
        assert!(weak.upgrade().is_none());

        let fresh = Engine::shared("engine-unit-release");
        assert_eq!(fresh.count_documents(&ns, &doc! {}).unwrap(), 0);
        assert!(SHARED.lock().get("engine-unit-release").is_some_and(|w| w.strong_count() == 1));
    }

    #[test]
    fn bad_index_direction_is_rejected() {
        let e = Engine::new("t");
        let ns = Namespace::new("db", "c");
        let err = e.create_index(&ns, &doc! {"a": "text"}, &IndexOptions::default()).unwrap_err();
        assert!(err.is_operation());
    }
}
