use bson::{Bson, Document as BsonDocument, doc};
use std::collections::HashMap;

use crate::index::{IndexKey, IndexManager, KeyBound, KeyRange, key_from_bson};

use super::types::{CmpOp, Filter, FindOptions, Projection};

#[derive(Debug, Clone, PartialEq)]
pub struct IxScan {
    pub index_name: String,
    pub key_pattern: BsonDocument,
    pub eq_prefix: Vec<IndexKey>,
    pub range: Option<KeyRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    CollScan,
    IxScan(IxScan),
}

impl Plan {
    #[must_use]
    pub fn index_name(&self) -> Option<&str> {
        match self {
            Self::CollScan => None,
            Self::IxScan(ix) => Some(&ix.index_name),
        }
    }
}

/// Top-level conjunct of a filter that an index can serve.
fn conjuncts(filter: &Filter) -> Vec<&Filter> {
    match filter {
        Filter::And(fs) => fs.iter().flat_map(conjuncts).collect(),
        other => vec![other],
    }
}

fn indexable(v: &Bson) -> bool {
    !matches!(v, Bson::Array(_) | Bson::Document(_) | Bson::Null | Bson::Undefined)
}

/// Picks the index with the longest equality prefix over the filter's top-level conditions,
/// counting a range on the next key field as half a step. Multikey indexes are skipped.
#[must_use]
pub fn plan_filter(filter: &Filter, mgr: &IndexManager) -> Plan {
    let mut eqs: HashMap<&str, &Bson> = HashMap::new();
    let mut ranges: HashMap<&str, KeyRange> = HashMap::new();
    for c in conjuncts(filter) {
        let Filter::Cmp { path, op, value } = c else { continue };
        if !indexable(value) {
            continue;
        }
        let bound = KeyBound { key: key_from_bson(Some(value)), inclusive: matches!(op, CmpOp::Gte | CmpOp::Lte) };
        match op {
            CmpOp::Eq => {
                eqs.insert(path.as_str(), value);
            }
            CmpOp::Gt | CmpOp::Gte => ranges.entry(path.as_str()).or_default().lower = Some(bound),
            CmpOp::Lt | CmpOp::Lte => ranges.entry(path.as_str()).or_default().upper = Some(bound),
            CmpOp::Ne => {}
        }
    }
    if eqs.is_empty() && ranges.is_empty() {
        return Plan::CollScan;
    }

    let mut best: Option<(usize, IxScan)> = None;
    for idx in mgr.indexes().iter().filter(|i| !i.multikey) {
        let prefix: Vec<IndexKey> = idx
            .keys
            .iter()
            .map_while(|(field, _)| eqs.get(field.as_str()).map(|v| key_from_bson(Some(*v))))
            .collect();
        let range = idx.keys.get(prefix.len()).and_then(|(field, _)| ranges.get(field.as_str())).cloned();
        let score = prefix.len() * 2 + usize::from(range.is_some());
        if score == 0 || best.as_ref().is_some_and(|(s, _)| *s >= score) {
            continue;
        }
        best = Some((
            score,
            IxScan { index_name: idx.name.clone(), key_pattern: idx.key_pattern(), eq_prefix: prefix, range },
        ));
    }
    best.map_or(Plan::CollScan, |(_, ix)| Plan::IxScan(ix))
}

/// Stage tree in the shape `explain` reports for a find.
#[must_use]
pub fn winning_plan(plan: &Plan, filter: &BsonDocument, opts: &FindOptions) -> BsonDocument {
    let mut stage = match plan {
        Plan::CollScan => doc! { "stage": "COLLSCAN", "filter": filter.clone(), "direction": "forward" },
        Plan::IxScan(ix) => doc! {
            "stage": "FETCH",
            "filter": filter.clone(),
            "inputStage": {
                "stage": "IXSCAN",
                "keyPattern": ix.key_pattern.clone(),
                "indexName": ix.index_name.clone(),
                "isMultiKey": false,
                "direction": "forward",
            },
        },
    };
    if opts.sort.is_some() {
        stage = doc! { "stage": "SORT", "inputStage": stage };
    }
    if let Some(n) = opts.skip.filter(|n| *n > 0) {
        let amount = i64::try_from(n).unwrap_or(i64::MAX);
        stage = doc! { "stage": "SKIP", "skipAmount": amount, "inputStage": stage };
    }
    if let Some(n) = opts.limit {
        let amount = i64::try_from(n).unwrap_or(i64::MAX);
        stage = doc! { "stage": "LIMIT", "limitAmount": amount, "inputStage": stage };
    }
    if let Some(p) = &opts.projection {
        let kind = match p {
            Projection::Include { .. } => "PROJECTION_SIMPLE",
            Projection::Exclude { .. } => "PROJECTION_DEFAULT",
        };
        stage = doc! { "stage": kind, "inputStage": stage };
    }
    stage
}
