pub mod aggregate;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod connection;
pub mod engine;
pub mod errors;
pub mod index;
pub mod logger;
#[cfg(feature = "mongodb")]
pub mod mongo;
mod num;
pub mod query;
pub mod runner;
pub mod seed;
pub mod store;
pub mod telemetry;

pub use catalog::{
    BOOKS, FindSpec, IndexOptions, Operation, OperationKind, OperationSpec, UpdateOptions, Verbosity,
    bookstore_catalog,
};
pub use config::RunnerConfig;
pub use connection::{Connection, Runner};
pub use errors::DbError;
pub use runner::{OpResult, run, run_all};
pub use store::{DocumentStore, Namespace};

/// Loads [`RunnerConfig`], installs logging from it and connects a [`Runner`].
///
/// Without a configured URI this connects to [`config::DEFAULT_URI`]: the embedded store unless
/// the `mongodb` feature is enabled.
///
/// # Errors
/// Config, logging and connection errors, in that order.
pub fn init(config_path: Option<&std::path::Path>) -> Result<(RunnerConfig, Runner), DbError> {
    let cfg = RunnerConfig::load(config_path)?;
    cfg.apply()?;
    let mut runner = Runner::new();
    runner.connect(&cfg.uri, &cfg.database)?;
    Ok((cfg, runner))
}
