//! Error types for bw-core
//!
//! Traversal-level failures (transport, exhausted retries, bad timestamps)
//! abort a command. Per-entry failures during bulk actions are recorded by
//! the consumer and never surface through this type.

use thiserror::Error;

/// Result type alias for bw-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The service answered with a throttling / temporarily-unavailable status.
    /// This is the only class the retry wrapper reacts to.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Retry limit exceeded after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Error parsing time '{value}': {message}")]
    TimeParse { value: String, message: String },

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether this error belongs to the transient-unavailability class
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::ServiceUnavailable(_))
    }
}
