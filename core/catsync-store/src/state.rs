use crate::error::StorageResult;
use chrono::{DateTime, Utc};

/// Read access to the local sync state of a resource.
pub trait StateReader: Send + Sync {
    /// Latest `created_at` / `updated_at` among the local rows, or `None` if
    /// the resource has no rows (which calls for a full sync).
    fn latest_state(&self, resource: &str) -> StorageResult<Option<DateTime<Utc>>>;

    /// Number of local rows.
    fn total_items(&self, resource: &str) -> StorageResult<u64>;
}
