//! Store and configuration errors shared by the Vouch crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the profile store and of configuration loading
///
/// Collector and pipeline failures have their own types in `vouch-enrich`
/// and wrap this one.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite query or connection failure
    #[cfg(feature = "sqlx")]
    #[error("Profile store error: {0}")]
    Database(#[from] sqlx::Error),

    /// Reading a config file or creating the database directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column (payload, field sources, risk factors) failed to encode or decode
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored text column holds a value no enum or UUID accepts
    #[error("Undecodable stored value: {0}")]
    Decode(String),

    /// Enrichment settings failed to parse or are out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Submission, task or profile row is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store retries exhausted or a worker resource went away
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for SQLite lock contention, which callers may retry
    pub fn is_lock_contention(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(db_err) => db_err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}
