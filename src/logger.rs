use log::LevelFilter;
use log4rs::Handle;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use crate::errors::DbError;

pub const AUDIT_TARGET: &str = "bookstore_queries::audit";
pub const METRICS_TARGET: &str = "bookstore_queries::metrics";

const ENCODER_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_RETENTION: u32 = 7;

static HANDLE: Mutex<Option<Handle>> = Mutex::new(None);

fn config_err(e: impl std::fmt::Display) -> DbError {
    DbError::Config(format!("logging: {e}"))
}

/// Maps `error|warn|info|debug|trace` (any case) to a filter; anything else is `Info`.
#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling_appender(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, DbError> {
    let roller = FixedWindowRoller::builder()
        .build(&base.join(format!("{stem}.{{}}.log")).display().to_string(), keep)
        .map_err(config_err)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(ENCODER_PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

fn apply(config: Config) -> Result<(), DbError> {
    let mut handle = HANDLE.lock();
    match handle.as_ref() {
        Some(h) => h.set_config(config),
        None => *handle = Some(log4rs::init_config(config).map_err(config_err)?),
    }
    Ok(())
}

/// Installs rolling file logging for the process, replacing any configuration installed earlier
/// through this module.
///
/// Writes `app.log`, plus `audit.log` and `metrics.log` for the audit and metrics targets, under
/// `dir` (current directory when `None`). `retention` is the number of rolled files kept per log.
///
/// # Errors
/// Returns `DbError::Io` when the directory or files cannot be created and `DbError::Config` when
/// log4rs rejects the configuration or another logger is already installed.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<u32>) -> Result<(), DbError> {
    let base = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&base)?;
    let keep = retention.unwrap_or(DEFAULT_RETENTION).max(1);
    let lvl = parse_level(level);

    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling_appender(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling_appender(&base, "audit", keep)?)))
        .appender(Appender::builder().build("metrics", Box::new(rolling_appender(&base, "metrics", keep)?)))
        .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl))
        .logger(Logger::builder().appender("metrics").additive(false).build(METRICS_TARGET, lvl))
        .build(Root::builder().appender("app").build(lvl))
        .map_err(config_err)?;
    apply(config)
}

/// Configures logging from `BOOKSTORE_LOG_DIR`, `BOOKSTORE_LOG_LEVEL` and `BOOKSTORE_LOG_RETENTION`.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<(), DbError> {
    let dir = std::env::var("BOOKSTORE_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("BOOKSTORE_LOG_LEVEL").ok();
    let retention = std::env::var("BOOKSTORE_LOG_RETENTION").ok().and_then(|s| s.parse::<u32>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention)
}

/// Installs logging from a log4rs YAML file. Like [`configure_logging`], a later call replaces it.
///
/// # Errors
/// Returns `DbError::Config` when the file cannot be read or parsed, or another logger is already set.
pub fn init_path(path: &Path) -> Result<(), DbError> {
    let config = log4rs::config::load_config_file(path, log4rs::config::Deserializers::default())
        .map_err(config_err)?;
    apply(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("warn")), LevelFilter::Warn);
        assert_eq!(parse_level(Some("nonsense")), LevelFilter::Info);
        assert_eq!(parse_level(None), LevelFilter::Info);
    }
}
