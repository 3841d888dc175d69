use serde_json::{Map, Value};

/// One record: column name → value, as received from the catalog.
pub type Row = Map<String, Value>;

/// Result of applying one batch.
///
/// Batches commit or roll back as a unit. A failed batch is reported, not
/// raised: callers keep going and count the failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every row of the batch was applied.
    Committed { rows: usize },
    /// The batch was rolled back; none of its rows were applied.
    Failed { rows: usize, error: String },
}

impl BatchOutcome {
    /// Number of rows the batch carried.
    pub fn rows(&self) -> usize {
        match self {
            Self::Committed { rows } | Self::Failed { rows, .. } => *rows,
        }
    }

    /// Returns true if the batch was rolled back.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Applies record batches to local storage.
///
/// Each call is one transaction. Implementations never panic on bad data and
/// never propagate errors; they return [`BatchOutcome::Failed`] instead.
pub trait BatchWriter: Send + Sync {
    /// Appends rows as new records.
    fn insert_batch(&self, resource: &str, rows: &[Row]) -> BatchOutcome;

    /// Inserts rows, or overwrites every non-key column of rows whose primary
    /// key already exists.
    fn upsert_batch(&self, resource: &str, rows: &[Row]) -> BatchOutcome;

    /// Removes the rows whose primary key is in `ids`.
    fn delete_batch(&self, resource: &str, ids: &[Value]) -> BatchOutcome;
}
