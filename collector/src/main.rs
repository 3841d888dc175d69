//! catsync collector
//!
//! Mirrors the resources of a catalog service into a local SQLite database:
//! a full transfer for resources without local rows, created / updated /
//! deleted deltas otherwise, followed by an item count check per resource.
//!
//! Usage:
//!   catsync-collector --config config.yml [--resource promotions]... [--verbose]

use anyhow::{Context, Result};
use catsync_collector::{CollectorConfig, DEFAULT_CONFIG_PATH};
use catsync_sync::{Collector, Consistency};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "catsync-collector")]
#[command(about = "Synchronizes catalog resources into a local SQLite database")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only sync this resource (repeatable; default: all)
    #[arg(short, long = "resource", value_name = "NAME")]
    resources: Vec<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool, log_path: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    match log_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = CollectorConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    init_logging(args.verbose, config.log_path.as_deref())?;

    info!(
        host = %config.service_host,
        business_service = %config.business_service,
        country = %config.country,
        "catsync collector starting"
    );

    let collector = Collector::new(config.to_sync_config()?, config.connection_string.clone())?;
    let report = collector
        .run(&args.resources)
        .await
        .context("collection run aborted")?;

    for outcome in &report.resources {
        match (&outcome.sync, &outcome.consistency) {
            (Err(e), _) => error!(resource = %outcome.resource, error = %e, "sync failed"),
            (Ok(_), Some(Err(e))) => {
                warn!(resource = %outcome.resource, error = %e, "synced, state check failed")
            }
            (Ok(sync), Some(Ok(Consistency::Diverged { local, server }))) => error!(
                resource = %outcome.resource,
                items = sync.items(),
                local,
                server,
                "client and server not in sync"
            ),
            (Ok(sync), Some(Ok(Consistency::InSync { count }))) => info!(
                resource = %outcome.resource,
                items = sync.items(),
                failed_batches = sync.failed_batches(),
                count,
                "in sync"
            ),
            (Ok(_), None) => {}
        }
    }

    info!(
        resources = report.resources.len(),
        failed = report.failed().count(),
        diverged = report.diverged().count(),
        "done"
    );
    Ok(())
}
