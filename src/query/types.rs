use bson::{Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 32;
pub(crate) const MAX_UPDATE_FIELDS: usize = 128;
pub(crate) const MAX_ARRAY_PADDING: usize = 1_500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

/// A parsed projection. `_id` is kept unless `keep_id` is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Include { fields: Vec<String>, keep_id: bool },
    Exclude { fields: Vec<String> },
}

/// Options for `find_docs`, already parsed from their document form.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<Vec<SortSpec>>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    #[cfg(feature = "regex")]
    Regex { path: String, pattern: String, case_insensitive: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, Bson),
    Unset(String),
    Inc(String, Bson),
    Mul(String, Bson),
    Min(String, Bson),
    Max(String, Bson),
    Rename(String, String),
    Push(String, Bson),
}

impl UpdateOp {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Set(p, _)
            | Self::Unset(p)
            | Self::Inc(p, _)
            | Self::Mul(p, _)
            | Self::Min(p, _)
            | Self::Max(p, _)
            | Self::Rename(p, _)
            | Self::Push(p, _) => p,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateDoc {
    pub ops: Vec<UpdateOp>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InsertReport {
    pub inserted_ids: Vec<Bson>,
}

/// Result of a `createIndex` call. `created` is false when an equivalent index already existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub name: String,
    pub created: bool,
}

/// Index description in the shape `listIndexes` reports.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescription {
    pub name: String,
    pub key: BsonDocument,
    pub unique: bool,
}
