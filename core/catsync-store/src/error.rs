//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A resource or column name is not a plain identifier.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The resource is not part of the schema.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// A record carries a column the schema does not declare.
    #[error("unknown column {column} for resource {resource}")]
    UnknownColumn { resource: String, column: String },

    /// Upsert and delete need a key column.
    #[error("resource {0} has no primary key")]
    MissingPrimaryKey(String),

    /// Local state needs `created_at` and/or `updated_at`.
    #[error("resource {0} declares neither created_at nor updated_at")]
    NoChangeTracking(String),

    /// A value could not be converted to its declared column type.
    #[error("invalid value for {resource}.{column}: {reason}")]
    InvalidValue {
        resource: String,
        column: String,
        reason: String,
    },

    /// One or more tables could not be created.
    #[error("failed to provision {} table(s): {}", .failed.len(), summarize(.failed))]
    Provisioning { failed: Vec<(String, String)> },

    /// The connection mutex was poisoned by a panicking writer.
    #[error("storage connection poisoned")]
    Poisoned,
}

fn summarize(failed: &[(String, String)]) -> String {
    failed
        .iter()
        .map(|(table, cause)| format!("{table} ({cause})"))
        .collect::<Vec<_>>()
        .join("; ")
}
