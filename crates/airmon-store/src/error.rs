//! Error types for airmon-store.

use std::path::PathBuf;

/// Result type for airmon-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in airmon-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored value could not be decoded into a domain type.
    #[error("Invalid stored value: {0}")]
    InvalidData(#[from] airmon_types::ParseError),

    /// Serialization error for JSON text columns.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
