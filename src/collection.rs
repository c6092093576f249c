use bson::oid::ObjectId;
use bson::{Bson, Document as BsonDocument};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::DbError;
use crate::index::{ID_INDEX, Index, IndexManager, RecordId, default_index_name};
use crate::query::eval::eval_filter;
use crate::query::plan::{Plan, plan_filter};
use crate::query::types::{Filter, IndexDescription, IndexReport};

/// Documents visited by a scan together with the counters explain reports.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub records: Vec<(RecordId, BsonDocument)>,
    pub keys_examined: u64,
    pub docs_examined: u64,
}

/// One collection of the embedded store: documents in natural (insertion) order plus indexes.
///
/// Lock order is always `records` before `indexes`.
#[derive(Debug)]
pub struct Collection {
    name: String,
    next_id: AtomicU64,
    records: RwLock<BTreeMap<RecordId, BsonDocument>>,
    pub(crate) indexes: RwLock<IndexManager>,
}

impl Collection {
    #[must_use]
    pub fn new(name: String) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(0),
            records: RwLock::new(BTreeMap::new()),
            indexes: RwLock::new(IndexManager::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Inserts `doc`, assigning an `ObjectId` `_id` when missing. `_id` is moved to the front.
    ///
    /// # Errors
    /// Returns `DbError::Operation` on a duplicate key in any unique index.
    pub fn insert_document(&self, mut doc: BsonDocument) -> Result<Bson, DbError> {
        let id_value = doc.remove("_id").unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
        let mut stored = BsonDocument::new();
        stored.insert("_id", id_value.clone());
        for (k, v) in doc {
            stored.insert(k, v);
        }

        let mut records = self.records.write();
        let mut indexes = self.indexes.write();
        let rid = self.next_id.fetch_add(1, Ordering::Relaxed);
        indexes.check_unique(&stored, rid)?;
        indexes.insert_all(&stored, rid);
        records.insert(rid, stored);
        Ok(id_value)
    }

    /// Replaces the stored document of `rid`, keeping indexes in step.
    ///
    /// # Errors
    /// Returns `DbError::Operation` on a unique-index violation; the old document stays in place.
    pub fn replace_record(&self, rid: RecordId, new_doc: BsonDocument) -> Result<bool, DbError> {
        let mut records = self.records.write();
        let mut indexes = self.indexes.write();
        let Some(old) = records.get(&rid).cloned() else { return Ok(false) };
        indexes.check_unique(&new_doc, rid)?;
        indexes.remove_all(&old, rid);
        indexes.insert_all(&new_doc, rid);
        records.insert(rid, new_doc);
        Ok(true)
    }

    pub fn delete_record(&self, rid: RecordId) -> bool {
        let mut records = self.records.write();
        let Some(old) = records.remove(&rid) else { return false };
        self.indexes.write().remove_all(&old, rid);
        true
    }

    /// Every document in natural order.
    #[must_use]
    pub fn get_all_documents(&self) -> Vec<BsonDocument> {
        self.records.read().values().cloned().collect()
    }

    /// Chooses an access path for `filter` without running it.
    #[must_use]
    pub fn plan(&self, filter: &Filter) -> Plan {
        plan_filter(filter, &self.indexes.read())
    }

    /// Runs `plan` and keeps the documents matching `filter`, in natural order.
    #[must_use]
    pub fn scan(&self, filter: &Filter, plan: &Plan) -> ScanResult {
        let records = self.records.read();
        let mut out = ScanResult::default();
        let candidates: Vec<RecordId> = match plan {
            Plan::CollScan => records.keys().copied().collect(),
            Plan::IxScan(ix) => {
                let indexes = self.indexes.read();
                match indexes.get(&ix.index_name) {
                    Some(index) => {
                        let hit = index.lookup(&ix.eq_prefix, ix.range.as_ref());
                        out.keys_examined = hit.keys_examined;
                        hit.ids
                    }
                    None => records.keys().copied().collect(),
                }
            }
        };
        for rid in candidates {
            let Some(doc) = records.get(&rid) else { continue };
            out.docs_examined += 1;
            if eval_filter(doc, filter) {
                out.records.push((rid, doc.clone()));
            }
        }
        out
    }

    /// Declares an index over `keys`. Equivalent declarations are no-ops.
    ///
    /// # Errors
    /// Returns `DbError::Operation` for an empty key pattern, name/option clashes, or duplicate keys
    /// when building a unique index.
    pub fn create_index(
        &self,
        keys: Vec<(String, i32)>,
        name: Option<String>,
        unique: bool,
    ) -> Result<IndexReport, DbError> {
        if keys.is_empty() {
            return Err(DbError::op("Index keys cannot be empty"));
        }
        if keys == [("_id".to_string(), 1)] {
            return Ok(IndexReport { name: ID_INDEX.to_string(), created: false });
        }
        let name = name.unwrap_or_else(|| default_index_name(&keys));
        let records = self.records.read();
        let mut indexes = self.indexes.write();
        if let Some(found) = indexes.existing(&name, &keys, unique)? {
            return Ok(IndexReport { name: found.name.clone(), created: false });
        }
        let start = std::time::Instant::now();
        let mut index = Index::new(name.clone(), keys, unique);
        IndexManager::build(&mut index, records.iter())?;
        log::debug!(
            "built index {name} on {} with {} entries in {}ms",
            self.name,
            index.entry_count(),
            start.elapsed().as_millis()
        );
        indexes.add(index);
        Ok(IndexReport { name, created: true })
    }

    #[must_use]
    pub fn list_indexes(&self) -> Vec<IndexDescription> {
        self.indexes.read().indexes().iter().map(Index::describe).collect()
    }
}
