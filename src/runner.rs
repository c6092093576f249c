//! Dispatches catalog operations to the connected store.

use bson::Document as BsonDocument;
use std::time::Instant;

use crate::catalog::{Operation, OperationSpec};
use crate::connection::{Connection, Runner};
use crate::errors::DbError;
use crate::num;
use crate::query::{Cursor, DeleteReport, IndexReport, UpdateReport};
use crate::telemetry::{self, OpRecord};

/// Outcome of one operation.
#[derive(Debug, Clone)]
pub enum OpResult {
    Documents(Cursor),
    Update(UpdateReport),
    Delete(DeleteReport),
    Aggregate(Vec<BsonDocument>),
    Index(IndexReport),
    Explain(BsonDocument),
}

impl OpResult {
    /// Documents returned or touched.
    #[must_use]
    pub fn affected(&self) -> u64 {
        match self {
            Self::Documents(c) => num::usize_to_u64(c.remaining()),
            Self::Update(r) => r.modified + u64::from(r.upserted_id.is_some()),
            Self::Delete(r) => r.deleted,
            Self::Aggregate(docs) => num::usize_to_u64(docs.len()),
            Self::Index(r) => u64::from(r.created),
            Self::Explain(_) => 0,
        }
    }

    /// The documents of a find or aggregate result.
    #[must_use]
    pub fn into_documents(self) -> Option<Vec<BsonDocument>> {
        match self {
            Self::Documents(c) => Some(c.to_vec()),
            Self::Aggregate(docs) => Some(docs),
            _ => None,
        }
    }
}

fn dispatch(op: &Operation, conn: &Connection) -> Result<OpResult, DbError> {
    let store = conn.store();
    let ns = conn.namespace(op.collection());
    Ok(match op.spec() {
        OperationSpec::Find(find) => OpResult::Documents(store.find(&ns, find)?),
        OperationSpec::UpdateOne { filter, update, options } => {
            OpResult::Update(store.update_one(&ns, filter, update, options)?)
        }
        OperationSpec::DeleteOne { filter } => OpResult::Delete(store.delete_one(&ns, filter)?),
        OperationSpec::Aggregate { pipeline } => OpResult::Aggregate(store.aggregate(&ns, pipeline)?),
        OperationSpec::CreateIndex { keys, options } => OpResult::Index(store.create_index(&ns, keys, options)?),
        OperationSpec::Explain { find, verbosity } => OpResult::Explain(store.explain(&ns, find, *verbosity)?),
    })
}

/// Runs one operation against `conn`.
///
/// # Errors
/// Whatever the store reports; zero-match updates and deletes are not errors.
pub fn run(op: &Operation, conn: &Connection) -> Result<OpResult, DbError> {
    log::debug!("running {} ({}) on {}.{}", op.name(), op.kind(), conn.database(), op.collection());
    let start = Instant::now();
    let result = dispatch(op, conn);
    let namespace = conn.namespace(op.collection()).to_string();
    telemetry::record_operation(&OpRecord {
        name: op.name(),
        kind: op.kind(),
        namespace: &namespace,
        elapsed: start.elapsed(),
        affected: result.as_ref().ok().map(OpResult::affected),
    });
    result
}

/// Runs `ops` in order and stops at the first error.
///
/// # Errors
/// The first failing operation's error; results of earlier operations are dropped.
pub fn run_all(ops: &[Operation], conn: &Connection) -> Result<Vec<OpResult>, DbError> {
    let mut results = Vec::with_capacity(ops.len());
    for op in ops {
        match run(op, conn) {
            Ok(r) => results.push(r),
            Err(e) => {
                log::error!("operation {} ({}) failed: {e}", op.name(), op.kind());
                return Err(e);
            }
        }
    }
    Ok(results)
}

impl Runner {
    /// Runs `op` on the current connection.
    ///
    /// # Errors
    /// `DbError::NotConnected` before `connect`, otherwise see [`run`].
    pub fn run(&self, op: &Operation) -> Result<OpResult, DbError> {
        run(op, self.connection()?)
    }

    /// Runs `ops` on the current connection, fail-fast.
    ///
    /// # Errors
    /// `DbError::NotConnected` before `connect`, otherwise see [`run_all`].
    pub fn run_all(&self, ops: &[Operation]) -> Result<Vec<OpResult>, DbError> {
        run_all(ops, self.connection()?)
    }
}
