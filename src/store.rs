//! The seam between the runner and a document store backend.

use bson::Document as BsonDocument;
use std::fmt;

use crate::catalog::{FindSpec, IndexOptions, UpdateOptions, Verbosity};
use crate::errors::DbError;
use crate::query::{Cursor, DeleteReport, IndexDescription, IndexReport, InsertReport, UpdateReport};

/// A `database.collection` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    #[must_use]
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { database: database.into(), collection: collection.into() }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Operations a backend must support. Filters, updates and pipelines are handed over as-is;
/// interpreting them is the backend's job.
pub trait DocumentStore: Send + Sync {
    /// Short backend label used in logs (`memory`, `mongodb`).
    fn kind(&self) -> &'static str;

    /// Checks that the store answers.
    ///
    /// # Errors
    /// `DbError::Connection` when the store is unreachable.
    fn ping(&self) -> Result<(), DbError>;

    /// # Errors
    /// `DbError::Operation` when the store rejects the query.
    fn find(&self, ns: &Namespace, spec: &FindSpec) -> Result<Cursor, DbError>;

    /// # Errors
    /// `DbError::Operation` when the store rejects the filter.
    fn count_documents(&self, ns: &Namespace, filter: &BsonDocument) -> Result<u64, DbError>;

    /// # Errors
    /// `DbError::Operation` on duplicate keys.
    fn insert_many(&self, ns: &Namespace, docs: Vec<BsonDocument>) -> Result<InsertReport, DbError>;

    /// # Errors
    /// `DbError::Operation` when the filter or update is rejected.
    fn update_one(
        &self,
        ns: &Namespace,
        filter: &BsonDocument,
        update: &BsonDocument,
        options: &UpdateOptions,
    ) -> Result<UpdateReport, DbError>;

    /// # Errors
    /// `DbError::Operation` when the filter is rejected.
    fn delete_one(&self, ns: &Namespace, filter: &BsonDocument) -> Result<DeleteReport, DbError>;

    /// # Errors
    /// `DbError::Operation` when the pipeline is rejected.
    fn aggregate(&self, ns: &Namespace, pipeline: &[BsonDocument]) -> Result<Vec<BsonDocument>, DbError>;

    /// # Errors
    /// `DbError::Operation` for invalid key patterns and conflicting declarations.
    fn create_index(
        &self,
        ns: &Namespace,
        keys: &BsonDocument,
        options: &IndexOptions,
    ) -> Result<IndexReport, DbError>;

    /// # Errors
    /// `DbError::Operation` when the store cannot list indexes.
    fn list_indexes(&self, ns: &Namespace) -> Result<Vec<IndexDescription>, DbError>;

    /// # Errors
    /// `DbError::Operation` when the store rejects the query.
    fn explain(&self, ns: &Namespace, spec: &FindSpec, verbosity: Verbosity) -> Result<BsonDocument, DbError>;

    /// Releases backend resources. Further calls may fail.
    fn shutdown(&self) {}
}
