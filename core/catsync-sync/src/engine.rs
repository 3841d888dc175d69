//! Per-resource synchronization.
//!
//! A resource without local rows gets a single `full` pass. A resource with
//! local rows gets three delta passes anchored at its latest local change:
//! `created` (inserted), `updated` (upserted) and `deleted` (deleted by key),
//! always in that order. Records are streamed, buffered into fixed-size
//! batches and applied one transaction per batch. A failed batch is counted
//! and the pass goes on; a fetch or parse failure aborts the pass and the
//! remaining passes of the resource.

use crate::batch::Batcher;
use crate::client::CatalogClient;
use crate::error::{SyncError, SyncResult};
use crate::stream::RecordStream;
use catsync_model::Resource;
use catsync_store::{BatchOutcome, BatchWriter, Row, StateReader, StorageError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One fetch-and-apply pass over a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPass {
    Full,
    Created,
    Updated,
    Deleted,
}

impl SyncPass {
    /// The delta passes, in execution order.
    pub const DELTA: [SyncPass; 3] = [SyncPass::Created, SyncPass::Updated, SyncPass::Deleted];

    /// Path segment of the pass's `lines` endpoint.
    pub fn segment(self) -> &'static str {
        match self {
            SyncPass::Full => "full",
            SyncPass::Created => "created",
            SyncPass::Updated => "updated",
            SyncPass::Deleted => "deleted",
        }
    }

    pub fn is_delta(self) -> bool {
        !matches!(self, SyncPass::Full)
    }
}

impl fmt::Display for SyncPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// How a resource is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// No local rows: transfer everything.
    Full,
    /// Transfer changes since the latest local change.
    Delta { since: DateTime<Utc> },
}

impl SyncMode {
    pub fn passes(&self) -> &'static [SyncPass] {
        match self {
            SyncMode::Full => &[SyncPass::Full],
            SyncMode::Delta { .. } => &SyncPass::DELTA,
        }
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        match self {
            SyncMode::Full => None,
            SyncMode::Delta { since } => Some(*since),
        }
    }
}

/// Counters of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass: SyncPass,
    /// Records received.
    pub items: usize,
    /// Batches handed to storage.
    pub batches: usize,
    pub failed_batches: usize,
    /// Records lost to failed batches.
    pub failed_items: usize,
}

impl PassReport {
    fn new(pass: SyncPass) -> Self {
        Self {
            pass,
            items: 0,
            batches: 0,
            failed_batches: 0,
            failed_items: 0,
        }
    }

    fn record(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        if outcome.is_failed() {
            self.failed_batches += 1;
            self.failed_items += outcome.rows();
        }
    }

    /// Records that reached storage.
    pub fn applied_items(&self) -> usize {
        self.items - self.failed_items
    }
}

/// Result of synchronizing one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReport {
    pub resource: String,
    pub mode: SyncMode,
    pub passes: Vec<PassReport>,
}

impl ResourceReport {
    pub fn items(&self) -> usize {
        self.passes.iter().map(|p| p.items).sum()
    }

    pub fn failed_batches(&self) -> usize {
        self.passes.iter().map(|p| p.failed_batches).sum()
    }
}

/// Storage operation applied to each batch of a pass.
type ApplyFn<S, T> = fn(&S, &str, &[T]) -> BatchOutcome;

/// Brings resources of a store up to date with the catalog service.
pub struct ResourceSynchronizer<S> {
    client: Arc<CatalogClient>,
    store: Arc<S>,
    batch_size: usize,
}

impl<S> ResourceSynchronizer<S>
where
    S: BatchWriter + StateReader + 'static,
{
    /// Uses the batch size of the client's configuration.
    pub fn new(client: Arc<CatalogClient>, store: Arc<S>) -> Self {
        let batch_size = client.config().batch_size;
        Self {
            client,
            store,
            batch_size,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Full when the resource has no local rows, delta since the latest
    /// local change otherwise.
    ///
    /// A resource without change-tracking columns, or one whose declared
    /// query modes exclude `delta`, can only be synced while its table is
    /// still empty.
    pub async fn select_mode(&self, resource: &Resource) -> SyncResult<SyncMode> {
        let store = Arc::clone(&self.store);
        let name = resource.name.clone();
        let mode = tokio::task::spawn_blocking(move || match store.latest_state(&name) {
            Ok(Some(since)) => Ok(SyncMode::Delta { since }),
            Ok(None) => Ok(SyncMode::Full),
            Err(StorageError::NoChangeTracking(_)) if store.total_items(&name)? == 0 => {
                Ok(SyncMode::Full)
            }
            Err(e) => Err(e),
        })
        .await??;

        match mode {
            SyncMode::Delta { .. } if !accepts_delta(resource) => {
                Err(SyncError::DeltaNotAllowed(resource.name.clone()))
            }
            mode => Ok(mode),
        }
    }

    /// Selects the mode and runs its passes.
    pub async fn sync(&self, resource: &Resource) -> SyncResult<ResourceReport> {
        let mode = self.select_mode(resource).await?;
        self.sync_with_mode(resource, mode).await
    }

    /// Runs the passes of `mode`, stopping at the first failing pass.
    pub async fn sync_with_mode(
        &self,
        resource: &Resource,
        mode: SyncMode,
    ) -> SyncResult<ResourceReport> {
        match mode {
            SyncMode::Full => {
                info!(resource = %resource.name, "no local state, full sync")
            }
            SyncMode::Delta { since } => {
                info!(resource = %resource.name, %since, "local state found, delta sync")
            }
        }

        let mut report = ResourceReport {
            resource: resource.name.clone(),
            mode,
            passes: Vec::with_capacity(mode.passes().len()),
        };
        for &pass in mode.passes() {
            let pass_report = self.run_pass(resource, pass, mode.since()).await?;
            report.passes.push(pass_report);
        }
        Ok(report)
    }

    /// Streams one pass and applies it batch by batch.
    pub async fn run_pass(
        &self,
        resource: &Resource,
        pass: SyncPass,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<PassReport> {
        let stream = self.client.open_pass(&resource.name, pass, since).await?;
        let name = resource.name.as_str();

        let result = match pass {
            SyncPass::Full | SyncPass::Created => {
                self.consume(name, pass, stream, record_to_row, |s: &S, r: &str, rows: &[Row]| {
                    s.insert_batch(r, rows)
                })
                .await
            }
            SyncPass::Updated => {
                self.consume(name, pass, stream, record_to_row, |s: &S, r: &str, rows: &[Row]| {
                    s.upsert_batch(r, rows)
                })
                .await
            }
            SyncPass::Deleted => {
                let key = resource
                    .primary_key()
                    .map_or("id", |a| a.name.as_str())
                    .to_string();
                let to_id = move |resource: &str, line: usize, record: Value| {
                    record_to_id(resource, &key, line, record)
                };
                self.consume(name, pass, stream, to_id, |s: &S, r: &str, ids: &[Value]| {
                    s.delete_batch(r, ids)
                })
                .await
            }
        };

        match &result {
            Ok(report) if report.failed_batches > 0 => warn!(
                resource = name,
                %pass,
                items = report.items,
                failed_batches = report.failed_batches,
                failed_items = report.failed_items,
                "pass finished with failed batches"
            ),
            Ok(report) => info!(resource = name, %pass, items = report.items, "pass finished"),
            Err(e) => error!(resource = name, %pass, error = %e, "pass aborted"),
        }
        result
    }

    async fn consume<T, F>(
        &self,
        resource: &str,
        pass: SyncPass,
        mut stream: RecordStream,
        extract: F,
        op: ApplyFn<S, T>,
    ) -> SyncResult<PassReport>
    where
        T: Send + 'static,
        F: Fn(&str, usize, Value) -> SyncResult<T>,
    {
        let mut report = PassReport::new(pass);
        let mut batcher = Batcher::new(self.batch_size);

        while let Some(record) = stream.next_record().await {
            let item = extract(resource, stream.line(), record?)?;
            report.items += 1;
            if let Some(batch) = batcher.push(item) {
                self.apply(resource, batch, op, &mut report).await;
            }
        }
        if let Some(batch) = batcher.finish() {
            self.apply(resource, batch, op, &mut report).await;
        }
        Ok(report)
    }

    async fn apply<T: Send + 'static>(
        &self,
        resource: &str,
        batch: Vec<T>,
        op: ApplyFn<S, T>,
        report: &mut PassReport,
    ) {
        let store = Arc::clone(&self.store);
        let name = resource.to_string();
        let rows = batch.len();
        let outcome = tokio::task::spawn_blocking(move || op(&*store, &name, &batch))
            .await
            .unwrap_or_else(|e| BatchOutcome::Failed {
                rows,
                error: format!("storage task failed: {e}"),
            });

        report.record(&outcome);
        debug!(
            resource,
            pass = %report.pass,
            batch = report.batches,
            rows,
            items = report.items,
            failed = outcome.is_failed(),
            "batch applied"
        );
    }
}

/// Resources that declare no query modes are unrestricted.
fn accepts_delta(resource: &Resource) -> bool {
    resource.allowed_query_modes.is_empty() || resource.allows("delta")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_error(resource: &str, line: usize, message: String) -> SyncError {
    SyncError::Parse {
        resource: resource.to_string(),
        line,
        message,
    }
}

fn record_to_row(resource: &str, line: usize, record: Value) -> SyncResult<Row> {
    match record {
        Value::Object(row) => Ok(row),
        other => Err(parse_error(
            resource,
            line,
            format!("expected a JSON object, got {}", json_kind(&other)),
        )),
    }
}

/// Deleted records carry the key field, or are the bare key.
fn record_to_id(resource: &str, key: &str, line: usize, record: Value) -> SyncResult<Value> {
    match record {
        Value::Object(mut fields) => match fields.remove(key) {
            Some(id @ (Value::String(_) | Value::Number(_))) => Ok(id),
            Some(other) => Err(parse_error(
                resource,
                line,
                format!("`{key}` must be a string or number, got {}", json_kind(&other)),
            )),
            None => Err(parse_error(
                resource,
                line,
                format!("deleted record has no `{key}` field"),
            )),
        },
        id @ (Value::String(_) | Value::Number(_)) => Ok(id),
        other => Err(parse_error(
            resource,
            line,
            format!("expected a key or an object, got {}", json_kind(&other)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deleted_records_yield_keys() {
        assert_eq!(record_to_id("r", "id", 1, json!({"id": 7, "x": 1})).unwrap(), json!(7));
        assert_eq!(record_to_id("r", "code", 1, json!({"code": "DE"})).unwrap(), json!("DE"));
        assert_eq!(record_to_id("r", "id", 1, json!("abc")).unwrap(), json!("abc"));
    }

    #[test]
    fn deleted_records_without_key_fail() {
        let err = record_to_id("r", "id", 4, json!({"other": 1})).unwrap_err();
        assert!(matches!(err, SyncError::Parse { line: 4, .. }));
        assert!(record_to_id("r", "id", 1, json!({"id": null})).is_err());
        assert!(record_to_id("r", "id", 1, json!([1])).is_err());
    }

    #[test]
    fn rows_must_be_objects() {
        assert!(record_to_row("r", 1, json!({"id": 1})).is_ok());
        let err = record_to_row("r", 2, json!(42)).unwrap_err();
        assert!(err.to_string().contains("got number"));
    }

    #[test]
    fn pass_segments() {
        assert_eq!(SyncPass::Full.segment(), "full");
        assert_eq!(SyncPass::Deleted.to_string(), "deleted");
        assert!(!SyncPass::Full.is_delta());
        assert!(SyncPass::DELTA.iter().all(|p| p.is_delta()));
    }

    #[test]
    fn mode_passes() {
        assert_eq!(SyncMode::Full.passes(), &[SyncPass::Full]);
        let since = Utc::now();
        let delta = SyncMode::Delta { since };
        assert_eq!(delta.passes(), &SyncPass::DELTA);
        assert_eq!(delta.since(), Some(since));
    }

    #[test]
    fn pass_report_counts_failures() {
        let mut report = PassReport::new(SyncPass::Full);
        report.items = 15;
        report.record(&BatchOutcome::Committed { rows: 10 });
        report.record(&BatchOutcome::Failed { rows: 5, error: "boom".into() });
        assert_eq!(report.batches, 2);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.applied_items(), 10);
    }
}
