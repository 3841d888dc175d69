//! Catalog synchronization engine.
//!
//! Keeps a local relational copy of the resources of a remote catalog
//! service up to date.
//!
//! # Architecture
//!
//! - [`SessionManager`] issues the session token and renews it before it
//!   ages out
//! - [`CatalogClient`] talks to the schema, `lines` and `state` endpoints
//! - [`RecordStream`] parses NDJSON response bodies line by line
//! - [`ResourceSynchronizer`] picks full or delta mode per resource and
//!   applies the streamed records in fixed-size batches
//! - [`consistency`] compares local and server item counts
//! - [`Collector`] ties everything together for one run

mod auth;
mod batch;
mod client;
mod config;
pub mod consistency;
mod engine;
mod error;
mod runner;
mod stream;

pub use auth::SessionManager;
pub use batch::Batcher;
pub use client::CatalogClient;
pub use config::{DEFAULT_BATCH_SIZE, SyncConfig};
pub use consistency::Consistency;
pub use engine::{PassReport, ResourceReport, ResourceSynchronizer, SyncMode, SyncPass};
pub use error::{SyncError, SyncResult};
pub use runner::{Collector, ResourceOutcome, RunReport};
pub use stream::RecordStream;
