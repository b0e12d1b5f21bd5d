//! Structured error types for store operations.
//!
//! Every variant classifies into one of four kinds (see [`ErrorKind`]) so
//! callers can react to the failure class without caring which backend raised
//! it.

use thiserror::Error;

/// Failure classes shared by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing store directory, database file or schema source.
    NotFound,
    /// Malformed schema, unresolvable input, bad query parameters.
    Schema,
    /// Referential-integrity or uniqueness violation.
    Constraint,
    /// Filesystem or storage-engine failure.
    Io,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] polars::prelude::PolarsError),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Schema(_) | StoreError::InvalidArgument(_) => ErrorKind::Schema,
            StoreError::Constraint(_) => ErrorKind::Constraint,
            StoreError::Io(_)
            | StoreError::Parquet(_)
            | StoreError::Database(_)
            | StoreError::Metadata(_) => ErrorKind::Io,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(e.to_string())
            }
            _ => StoreError::Database(e),
        }
    }
}
