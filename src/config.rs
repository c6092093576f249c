use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::DbError;

/// Local MongoDB when the driver is compiled in, the embedded store otherwise.
#[cfg(feature = "mongodb")]
pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
#[cfg(not(feature = "mongodb"))]
pub const DEFAULT_URI: &str = "memory://";
pub const DEFAULT_DATABASE: &str = "plp_bookstore";
pub const CONFIG_FILE_NAME: &str = "bookstore.toml";

/// Contents of a `bookstore.toml` file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub uri: Option<String>,
    pub database: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_retention: Option<u32>,
    pub slow_query_ms: Option<u64>,
}

/// Resolved runner settings. Precedence: environment > config file > defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub uri: String,
    pub database: String,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_retention: Option<u32>,
    pub slow_query_ms: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            log_dir: None,
            log_level: None,
            log_retention: None,
            slow_query_ms: None,
        }
    }
}

/// Candidate config files in search order: `explicit`, `BOOKSTORE_CONFIG`,
/// `<config dir>/bookstore.toml`, `./bookstore.toml`.
#[must_use]
pub fn config_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = explicit {
        paths.push(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("BOOKSTORE_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Some(dir) = dirs_next::config_dir() {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join(CONFIG_FILE_NAME));
    }
    paths
}

/// Reads and parses one config file.
///
/// # Errors
/// `DbError::Io` when the file cannot be read, `DbError::Toml` when it does not parse.
pub fn read_file_config(path: &Path) -> Result<FileConfig, DbError> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

impl RunnerConfig {
    /// Loads settings from the first existing config file and the process environment.
    ///
    /// # Errors
    /// Propagates read and parse errors of the chosen file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, DbError> {
        Self::load_with_env(explicit, |k| std::env::var(k).ok())
    }

    /// Like [`RunnerConfig::load`] with a caller-supplied environment lookup.
    ///
    /// # Errors
    /// Propagates read and parse errors of the chosen file.
    pub fn load_with_env(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DbError> {
        let file = match config_paths(explicit).into_iter().find(|p| p.is_file()) {
            Some(p) => {
                log::debug!("reading config from {}", p.display());
                read_file_config(&p)?
            }
            None => FileConfig::default(),
        };
        Ok(Self::resolve(file, env))
    }

    /// Layers `env` over `file` over the defaults.
    #[must_use]
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            uri: env("BOOKSTORE_URI").or(file.uri).unwrap_or(defaults.uri),
            database: env("BOOKSTORE_DB").or(file.database).unwrap_or(defaults.database),
            log_dir: env("BOOKSTORE_LOG_DIR").map(PathBuf::from).or(file.log_dir),
            log_level: env("BOOKSTORE_LOG_LEVEL").or(file.log_level),
            log_retention: env("BOOKSTORE_LOG_RETENTION")
                .and_then(|s| s.parse().ok())
                .or(file.log_retention),
            slow_query_ms: env("BOOKSTORE_SLOW_QUERY_MS")
                .and_then(|s| s.parse().ok())
                .or(file.slow_query_ms),
        }
    }

    /// Installs logging and the slow-operation threshold described by this config.
    ///
    /// # Errors
    /// See [`crate::logger::configure_logging`].
    pub fn apply(&self) -> Result<(), DbError> {
        crate::logger::configure_logging(self.log_dir.as_deref(), self.log_level.as_deref(), self.log_retention)?;
        if let Some(ms) = self.slow_query_ms {
            crate::telemetry::set_slow_query_ms(ms);
        }
        Ok(())
    }
}
