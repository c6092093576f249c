use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// The store could not be reached, the URI was not understood, or authentication failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected the operation (malformed filter, pipeline, update, index conflict, ...).
    #[error("Operation error: {0}")]
    Operation(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DbError {
    pub(crate) fn op(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NotConnected)
    }

    #[must_use]
    pub const fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
