//! End-to-end collection run.

use crate::client::CatalogClient;
use crate::config::SyncConfig;
use crate::consistency::{self, Consistency};
use crate::engine::{ResourceReport, ResourceSynchronizer, SyncMode};
use crate::error::{SyncError, SyncResult};
use catsync_model::{Resource, Schema};
use catsync_store::{SqliteStore, StateReader};
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to one resource during a run.
#[derive(Debug)]
pub struct ResourceOutcome {
    pub resource: String,
    pub sync: SyncResult<ResourceReport>,
    /// `None` when the sync itself failed and no check was made.
    pub consistency: Option<SyncResult<Consistency>>,
}

impl ResourceOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(&self.sync, Ok(report) if report.failed_batches() == 0)
            && matches!(&self.consistency, Some(Ok(c)) if c.is_in_sync())
    }
}

/// Per-resource results of a run, in schema order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub resources: Vec<ResourceOutcome>,
}

impl RunReport {
    pub fn outcome(&self, resource: &str) -> Option<&ResourceOutcome> {
        self.resources.iter().find(|o| o.resource == resource)
    }

    /// Resources whose sync or check failed.
    pub fn failed(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.resources.iter().filter(|o| {
            o.sync.is_err() || matches!(&o.consistency, Some(Err(_)))
        })
    }

    pub fn diverged(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.resources
            .iter()
            .filter(|o| matches!(&o.consistency, Some(Ok(c)) if !c.is_in_sync()))
    }

    pub fn is_clean(&self) -> bool {
        self.resources.iter().all(ResourceOutcome::is_clean)
    }
}

/// Runs the collector flow: authenticate, load the schema, provision
/// storage, then sync and check every selected resource in turn.
pub struct Collector {
    client: Arc<CatalogClient>,
    connection_string: String,
}

impl Collector {
    pub fn new(config: SyncConfig, connection_string: impl Into<String>) -> SyncResult<Self> {
        let connection_string = connection_string.into();
        if connection_string.trim().is_empty() {
            return Err(SyncError::Config("`connection_string` must not be empty".into()));
        }
        Ok(Self {
            client: Arc::new(CatalogClient::new(config)?),
            connection_string,
        })
    }

    pub fn client(&self) -> &Arc<CatalogClient> {
        &self.client
    }

    /// Runs one collection. An empty `only` selects every resource.
    ///
    /// Authentication, schema and provisioning failures abort the run; a
    /// failure of one resource is recorded and the run moves on.
    pub async fn run(&self, only: &[String]) -> SyncResult<RunReport> {
        self.client.authenticate().await?;

        let schema = Arc::new(self.client.fetch_schema().await?);
        let selected = select_resources(&schema, only)?;
        info!(
            resources = schema.resources().len(),
            selected = selected.len(),
            "schema loaded"
        );

        let store = self.open_store(Arc::clone(&schema)).await?;
        let synchronizer = ResourceSynchronizer::new(Arc::clone(&self.client), Arc::clone(&store));

        let mut report = RunReport::default();
        for resource in selected {
            let outcome = self.collect(&synchronizer, &store, resource).await;
            report.resources.push(outcome);
        }

        info!(
            resources = report.resources.len(),
            failed = report.failed().count(),
            diverged = report.diverged().count(),
            "collection finished"
        );
        Ok(report)
    }

    async fn open_store(&self, schema: Arc<Schema>) -> SyncResult<Arc<SqliteStore>> {
        let connection_string = self.connection_string.clone();
        let store = tokio::task::spawn_blocking(move || {
            let store = SqliteStore::open(&connection_string, schema)?;
            store.ensure_tables()?;
            Ok::<_, SyncError>(store)
        })
        .await??;
        Ok(Arc::new(store))
    }

    async fn collect(
        &self,
        synchronizer: &ResourceSynchronizer<SqliteStore>,
        store: &Arc<SqliteStore>,
        resource: &Resource,
    ) -> ResourceOutcome {
        let name = resource.name.clone();

        let mode = match synchronizer.select_mode(resource).await {
            Ok(mode) => mode,
            Err(e) => {
                error!(resource = %name, error = %e, "could not read local state");
                return ResourceOutcome {
                    resource: name,
                    sync: Err(e),
                    consistency: None,
                };
            }
        };

        let sync = synchronizer.sync_with_mode(resource, mode).await;
        if let Err(e) = &sync {
            warn!(resource = %name, error = %e, "resource sync failed, continuing");
            return ResourceOutcome {
                resource: name,
                sync,
                consistency: None,
            };
        }

        let consistency = self.check(store, &name, mode).await;
        if let Err(e) = &consistency {
            warn!(resource = %name, error = %e, "consistency check failed");
        }
        ResourceOutcome {
            resource: name,
            sync,
            consistency: Some(consistency),
        }
    }

    /// Compares local rows with the server state anchored at the pre-sync
    /// timestamp.
    async fn check(
        &self,
        store: &Arc<SqliteStore>,
        resource: &str,
        mode: SyncMode,
    ) -> SyncResult<Consistency> {
        let local = {
            let store = Arc::clone(store);
            let name = resource.to_string();
            tokio::task::spawn_blocking(move || store.total_items(&name)).await??
        };
        let server = self.client.fetch_state(resource, mode.since()).await?;
        Ok(consistency::check(resource, local, server))
    }
}

/// Resources of the schema named in `only` (all if empty), in schema order.
fn select_resources<'a>(schema: &'a Schema, only: &[String]) -> SyncResult<Vec<&'a Resource>> {
    if let Some(unknown) = only.iter().find(|n| schema.resource(n).is_none()) {
        return Err(SyncError::Config(format!(
            "resource `{unknown}` is not part of the schema"
        )));
    }
    Ok(schema
        .resources()
        .iter()
        .filter(|r| only.is_empty() || only.contains(&r.name))
        .collect())
}
