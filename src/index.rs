//! Secondary indexes for the embedded store.
//!
//! Each index maps a (possibly compound) key to the set of record ids holding it. Keys are
//! ordered like BSON values so equality prefixes and leading-field ranges can be answered with
//! `BTreeMap::range`.

use bson::{Bson, Document as BsonDocument};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use crate::errors::DbError;
use crate::query::eval::{get_path, path_values};
use crate::query::types::IndexDescription;

/// Natural-order position of a record inside its collection.
pub type RecordId = u64;

pub const ID_INDEX: &str = "_id_";

/// Exact numeric key. Integral doubles in `i64` range are stored as `Int`, so `2`, `2i64` and
/// `2.0` share a key while integers above 2^53 stay distinct. NaN sorts below every number.
#[derive(Debug, Clone, Copy)]
pub enum NumKey {
    Int(i64),
    Float(OrderedFloat<f64>),
}

impl NumKey {
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn from_f64(f: f64) -> Self {
        // -2^63 is exact in f64; 2^63 is the first value past i64::MAX.
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < 9_223_372_036_854_775_808.0 {
            Self::Int(f as i64)
        } else {
            Self::Float(OrderedFloat(f))
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() || f < i64::MIN as f64 {
        return Ordering::Greater;
    }
    if f >= 9_223_372_036_854_775_808.0 {
        return Ordering::Less;
    }
    let floor = f.floor();
    match i.cmp(&(floor as i64)) {
        Ordering::Equal if f > floor => Ordering::Less,
        o => o,
    }
}

impl Ord for NumKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Int(a), Self::Float(b)) => cmp_int_float(*a, b.0),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(*b, a.0).reverse(),
            (Self::Float(a), Self::Float(b)) => match (a.0.is_nan(), b.0.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.cmp(b),
            },
        }
    }
}

impl PartialOrd for NumKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NumKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumKey {}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    Null,
    Num(NumKey),
    Str(String),
    Other(String),
    Oid([u8; 12]),
    Bool(bool),
    Date(i64),
}

impl IndexKey {
    /// Smallest key of the same type bracket, used as the start of open-ended ranges.
    fn bracket_floor(&self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Num(_) => Self::Num(NumKey::Float(OrderedFloat(f64::NAN))),
            Self::Str(_) => Self::Str(String::new()),
            Self::Other(_) => Self::Other(String::new()),
            Self::Oid(_) => Self::Oid([0; 12]),
            Self::Bool(_) => Self::Bool(false),
            Self::Date(_) => Self::Date(i64::MIN),
        }
    }

    fn same_bracket(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[must_use]
pub fn key_from_bson(v: Option<&Bson>) -> IndexKey {
    match v {
        None | Some(Bson::Null | Bson::Undefined) => IndexKey::Null,
        Some(Bson::Int32(i)) => IndexKey::Num(NumKey::Int(i64::from(*i))),
        Some(Bson::Int64(i)) => IndexKey::Num(NumKey::Int(*i)),
        Some(Bson::Double(f)) => IndexKey::Num(NumKey::from_f64(*f)),
        Some(Bson::String(s)) => IndexKey::Str(s.clone()),
        Some(Bson::ObjectId(oid)) => IndexKey::Oid(oid.bytes()),
        Some(Bson::Boolean(b)) => IndexKey::Bool(*b),
        Some(Bson::DateTime(d)) => IndexKey::Date(d.timestamp_millis()),
        Some(other) => IndexKey::Other(other.clone().into_relaxed_extjson().to_string()),
    }
}

/// One bound of a leading-field range.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBound {
    pub key: IndexKey,
    pub inclusive: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyRange {
    pub lower: Option<KeyBound>,
    pub upper: Option<KeyBound>,
}

impl KeyRange {
    fn admits(&self, k: &IndexKey) -> bool {
        let above = self.lower.as_ref().is_none_or(|b| {
            k.same_bracket(&b.key) && (k > &b.key || (b.inclusive && k == &b.key))
        });
        let below = self.upper.as_ref().is_none_or(|b| {
            k.same_bracket(&b.key) && (k < &b.key || (b.inclusive && k == &b.key))
        });
        above && below
    }

    fn start(&self) -> Option<IndexKey> {
        match (&self.lower, &self.upper) {
            (Some(lo), _) => Some(lo.key.clone()),
            (None, Some(hi)) => Some(hi.key.bracket_floor()),
            (None, None) => None,
        }
    }
}

/// Result of walking an index: matching record ids in natural order plus the number of keys visited.
#[derive(Debug, Default)]
pub struct IndexLookup {
    pub ids: Vec<RecordId>,
    pub keys_examined: u64,
}

#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub keys: Vec<(String, i32)>,
    pub unique: bool,
    /// Set once an indexed field held an array; such indexes are not used for planning.
    pub multikey: bool,
    map: BTreeMap<Vec<IndexKey>, BTreeSet<RecordId>>,
}

impl Index {
    #[must_use]
    pub fn new(name: String, keys: Vec<(String, i32)>, unique: bool) -> Self {
        Self { name, keys, unique, multikey: false, map: BTreeMap::new() }
    }

    fn key_for(&self, doc: &BsonDocument) -> Vec<IndexKey> {
        self.keys.iter().map(|(field, _)| key_from_bson(get_path(doc, field))).collect()
    }

    /// True when a key field holds an array or its path fans out through one.
    fn has_array(&self, doc: &BsonDocument) -> bool {
        self.keys.iter().any(|(field, _)| {
            let values = path_values(doc, field);
            values.len() != usize::from(get_path(doc, field).is_some())
                || values.iter().any(|v| matches!(v, Bson::Array(_)))
        })
    }

    fn conflicts(&self, doc: &BsonDocument, id: RecordId) -> Option<Vec<IndexKey>> {
        if !self.unique {
            return None;
        }
        let key = self.key_for(doc);
        match self.map.get(&key) {
            Some(ids) if ids.iter().any(|other| *other != id) => Some(key),
            _ => None,
        }
    }

    fn insert(&mut self, doc: &BsonDocument, id: RecordId) {
        if self.has_array(doc) {
            self.multikey = true;
        }
        let key = self.key_for(doc);
        self.map.entry(key).or_default().insert(id);
    }

    fn remove(&mut self, doc: &BsonDocument, id: RecordId) {
        let key = self.key_for(doc);
        if let Some(set) = self.map.get_mut(&key) {
            set.remove(&id);
            if set.is_empty() {
                self.map.remove(&key);
            }
        }
    }

    #[must_use]
    pub fn key_pattern(&self) -> BsonDocument {
        let mut out = BsonDocument::new();
        for (field, dir) in &self.keys {
            out.insert(field.clone(), Bson::Int32(*dir));
        }
        out
    }

    #[must_use]
    pub fn describe(&self) -> IndexDescription {
        IndexDescription { name: self.name.clone(), key: self.key_pattern(), unique: self.unique }
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.map.values().map(BTreeSet::len).sum()
    }

    /// Walks keys whose leading components equal `eq_prefix` and whose next component lies in `range`.
    #[must_use]
    pub fn lookup(&self, eq_prefix: &[IndexKey], range: Option<&KeyRange>) -> IndexLookup {
        let mut start: Vec<IndexKey> = eq_prefix.to_vec();
        if let Some(s) = range.and_then(KeyRange::start) {
            start.push(s);
        }
        let mut out = IndexLookup::default();
        let mut ids = BTreeSet::new();
        for (key, set) in self.map.range((Bound::Included(start), Bound::Unbounded)) {
            if key.len() < eq_prefix.len() || key[..eq_prefix.len()] != *eq_prefix {
                break;
            }
            out.keys_examined += 1;
            if let Some(r) = range {
                let Some(next) = key.get(eq_prefix.len()) else { continue };
                if !r.admits(next) {
                    // Past the upper bound or out of the bracket: nothing further can match.
                    if r.lower.as_ref().is_none_or(|lo| next > &lo.key) {
                        break;
                    }
                    continue;
                }
            }
            ids.extend(set.iter().copied());
        }
        out.ids = ids.into_iter().collect();
        out
    }
}

/// All indexes of one collection, in creation order. `_id_` always comes first.
#[derive(Debug, Clone)]
pub struct IndexManager {
    indexes: Vec<Index>,
}

impl Default for IndexManager {
    fn default() -> Self {
        Self { indexes: vec![Index::new(ID_INDEX.to_string(), vec![("_id".to_string(), 1)], true)] }
    }
}

/// Default index name: `field_dir` pairs joined by `_` (`author_1_published_year_-1`).
#[must_use]
pub fn default_index_name(keys: &[(String, i32)]) -> String {
    keys.iter().map(|(f, d)| format!("{f}_{d}")).collect::<Vec<_>>().join("_")
}

impl IndexManager {
    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Finds an index with the same key pattern, or reports a name clash.
    ///
    /// # Errors
    /// Returns `DbError::Operation` when `name` is taken by an index with different keys, or when
    /// the same keys are already indexed under another name or uniqueness.
    pub fn existing(&self, name: &str, keys: &[(String, i32)], unique: bool) -> Result<Option<&Index>, DbError> {
        if let Some(same_name) = self.get(name) {
            if same_name.keys != keys {
                return Err(DbError::op(format!(
                    "An existing index has the same name as the requested index but different keys: {name}"
                )));
            }
        }
        match self.indexes.iter().find(|i| i.keys == keys) {
            Some(found) if found.name == name && found.unique == unique => Ok(Some(found)),
            Some(found) => Err(DbError::op(format!(
                "Index already exists with a different name or options: {}",
                found.name
            ))),
            None => Ok(None),
        }
    }

    /// Adds a fully built index.
    pub fn add(&mut self, index: Index) {
        self.indexes.push(index);
    }

    /// Builds `index` over `records`.
    ///
    /// # Errors
    /// Returns `DbError::Operation` when a unique index meets a duplicate key.
    pub fn build<'a>(
        index: &mut Index,
        records: impl IntoIterator<Item = (&'a RecordId, &'a BsonDocument)>,
    ) -> Result<(), DbError> {
        for (id, doc) in records {
            if let Some(key) = index.conflicts(doc, *id) {
                return Err(duplicate_key(&index.name, &key));
            }
            index.insert(doc, *id);
        }
        Ok(())
    }

    /// Checks every unique index before a write of `doc` under `id`.
    ///
    /// # Errors
    /// Returns `DbError::Operation` (E11000) naming the violated index.
    pub fn check_unique(&self, doc: &BsonDocument, id: RecordId) -> Result<(), DbError> {
        for idx in &self.indexes {
            if let Some(key) = idx.conflicts(doc, id) {
                return Err(duplicate_key(&idx.name, &key));
            }
        }
        Ok(())
    }

    pub fn insert_all(&mut self, doc: &BsonDocument, id: RecordId) {
        for idx in &mut self.indexes {
            idx.insert(doc, id);
        }
    }

    pub fn remove_all(&mut self, doc: &BsonDocument, id: RecordId) {
        for idx in &mut self.indexes {
            idx.remove(doc, id);
        }
    }
}

fn duplicate_key(index: &str, key: &[IndexKey]) -> DbError {
    DbError::op(format!("E11000 duplicate key error index: {index} dup key: {key:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn built(keys: Vec<(String, i32)>, docs: &[BsonDocument]) -> Index {
        let mut idx = Index::new(default_index_name(&keys), keys, false);
        for (i, d) in docs.iter().enumerate() {
            idx.insert(d, i as RecordId);
        }
        idx
    }

    #[test]
    fn numbers_share_a_bracket() {
        assert_eq!(key_from_bson(Some(&Bson::Int32(1945))), key_from_bson(Some(&Bson::Double(1945.0))));
        assert!(key_from_bson(Some(&Bson::Int32(1))) < key_from_bson(Some(&Bson::String("a".into()))));
        assert_eq!(key_from_bson(None), IndexKey::Null);
    }

    #[test]
    fn large_integers_keep_distinct_keys() {
        let a = key_from_bson(Some(&Bson::Int64(9_007_199_254_740_992)));
        let b = key_from_bson(Some(&Bson::Int64(9_007_199_254_740_993)));
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a, key_from_bson(Some(&Bson::Double(9_007_199_254_740_992.0))));
        assert!(key_from_bson(Some(&Bson::Double(2.5))) > key_from_bson(Some(&Bson::Int64(2))));
        assert!(key_from_bson(Some(&Bson::Double(-2.5))) < key_from_bson(Some(&Bson::Int32(-2))));
        assert!(key_from_bson(Some(&Bson::Double(f64::NAN))) < key_from_bson(Some(&Bson::Int64(i64::MIN))));
        assert!(key_from_bson(Some(&Bson::Double(f64::INFINITY))) > key_from_bson(Some(&Bson::Int64(i64::MAX))));
        assert_eq!(key_from_bson(Some(&Bson::Double(-0.0))), key_from_bson(Some(&Bson::Int32(0))));
    }

    #[test]
    fn unique_index_over_large_integers() {
        let docs = [doc! {"n": 9_007_199_254_740_992_i64}, doc! {"n": 9_007_199_254_740_993_i64}];
        let mut idx = Index::new("n_1".into(), vec![("n".into(), 1)], true);
        idx.insert(&docs[0], 0);
        assert!(idx.conflicts(&docs[1], 1).is_none());
        idx.insert(&docs[1], 1);
        assert_eq!(idx.entry_count(), 2);
        let range = KeyRange {
            lower: Some(KeyBound { key: key_from_bson(docs[0].get("n")), inclusive: false }),
            upper: None,
        };
        assert_eq!(idx.lookup(&[], Some(&range)).ids, vec![1]);
    }

    #[test]
    fn default_names_follow_key_order() {
        let keys = vec![("author".to_string(), 1), ("published_year".to_string(), -1)];
        assert_eq!(default_index_name(&keys), "author_1_published_year_-1");
    }

    #[test]
    fn equality_prefix_on_compound_index() {
        let docs = [
            doc! {"author": "George Orwell", "published_year": 1949},
            doc! {"author": "George Orwell", "published_year": 1945},
            doc! {"author": "Aldous Huxley", "published_year": 1932},
        ];
        let idx = built(vec![("author".into(), 1), ("published_year".into(), -1)], &docs);
        let orwell = key_from_bson(Some(&Bson::String("George Orwell".into())));
        let hit = idx.lookup(&[orwell.clone()], None);
        assert_eq!(hit.ids, vec![0, 1]);
        let exact = idx.lookup(&[orwell, key_from_bson(Some(&Bson::Int32(1945)))], None);
        assert_eq!(exact.ids, vec![1]);
        assert_eq!(exact.keys_examined, 1);
    }

    #[test]
    fn leading_range_stays_in_bracket() {
        let docs = [
            doc! {"year": 1999},
            doc! {"year": 2005},
            doc! {"year": "2010"},
            doc! {"year": 2012},
        ];
        let idx = built(vec![("year".into(), 1)], &docs);
        let range = KeyRange {
            lower: Some(KeyBound { key: key_from_bson(Some(&Bson::Int32(2000))), inclusive: false }),
            upper: None,
        };
        assert_eq!(idx.lookup(&[], Some(&range)).ids, vec![1, 3]);
    }
}
