//! Error types for the sync layer.

use catsync_model::SchemaParseError;
use catsync_store::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing with the catalog service.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Session token could not be issued. Fatal to a run.
    #[error("authentication failed{}: {message}", status_suffix(.status))]
    Auth {
        status: Option<u16>,
        message: String,
    },

    /// A request returned a non-success status or the connection broke.
    #[error("fetching {endpoint} for {resource} failed{}: {message}", status_suffix(.status))]
    Fetch {
        resource: String,
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// A streamed line was not a usable record.
    #[error("invalid record for {resource} on line {line}: {message}")]
    Parse {
        resource: String,
        line: usize,
        message: String,
    },

    /// The schema document was malformed.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaParseError),

    /// Storage provisioning or state lookup failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The resource has local rows but the catalog offers no delta queries
    /// for it.
    #[error("resource `{0}` has local rows but does not allow delta queries")]
    DeltaNotAllowed(String),

    /// Invalid configuration or resource selection.
    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        SyncError::Task(e.to_string())
    }
}
