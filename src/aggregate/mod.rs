//! Aggregation pipeline for the embedded store.

mod accum;
mod expr;
mod stages;

pub use accum::{AccOp, AccSpec, AccState, parse_accumulator};
pub use expr::{Expr, ExprOp, eval_expr, parse_expr};
pub use stages::{ProjectSpec, Stage, parse_pipeline, run_stages};

use bson::Document as BsonDocument;

use crate::errors::DbError;

/// Parses and runs `pipeline` over `docs`.
///
/// # Errors
/// Returns `DbError::Operation` for an invalid pipeline or a failing expression.
pub fn run_pipeline(pipeline: &[BsonDocument], docs: Vec<BsonDocument>) -> Result<Vec<BsonDocument>, DbError> {
    let stages = parse_pipeline(pipeline)?;
    run_stages(&stages, docs)
}
