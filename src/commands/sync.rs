// ABOUTME: `sync` command - wires the ledger, catalog and remote client into an orchestrator
// ABOUTME: Runs one incremental pass, or keeps queueing passes on an interval until Ctrl+C

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::broadcast;
use tokio::time::interval;

use crate::catalog::ProductCatalog;
use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::orchestrator::{RunReport, SyncOrchestrator};
use crate::remote::{resolve_token, AdminClient, TokenStore};
use crate::syncer::{EntitySyncer, ProductSyncer};
use crate::trigger::sync_queue;

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Keep running and start a pass every N seconds
    #[arg(long = "interval", value_name = "SECONDS")]
    pub interval_secs: Option<u64>,
    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Returns whether every pass completed without an entity stopping early.
pub async fn sync(config: &SyncConfig, args: SyncArgs) -> Result<bool> {
    let orchestrator = Arc::new(build_orchestrator(config)?);
    tracing::info!(entities = ?orchestrator.entity_names(), "Sync orchestrator ready");

    match args.interval_secs {
        None => {
            let report = orchestrator
                .run_incremental(&SyncContext::admin(Some("cli".to_string())))
                .await?;
            print_report(&report, args.json)?;
            Ok(report.is_success())
        }
        Some(secs) => run_on_interval(orchestrator, Duration::from_secs(secs.max(1))).await,
    }
}

/// Builds the orchestrator with every registered syncer. The catalog is
/// opened without an event bus so pulled records are not re-recorded.
pub fn build_orchestrator(config: &SyncConfig) -> Result<SyncOrchestrator> {
    let store = super::open_store(config)?;
    let catalog_path = config.catalog_path()?;
    let catalog = ProductCatalog::open(&catalog_path, None)
        .with_context(|| format!("Failed to open catalog at {}", catalog_path.display()))?;

    let token_store = TokenStore::new(config.token_file()?);
    let token = resolve_token(config.auth_token.as_deref(), &token_store)?;
    let client =
        AdminClient::authenticated(config.admin_api_url()?, &token, config.request_timeout())?;

    let syncers: Vec<Box<dyn EntitySyncer>> =
        vec![Box::new(ProductSyncer::new(client, Arc::new(catalog)))];

    Ok(SyncOrchestrator::new(
        syncers,
        store.clone(),
        store,
        config.orchestrator_config(),
    ))
}

async fn run_on_interval(orchestrator: Arc<SyncOrchestrator>, every: Duration) -> Result<bool> {
    let (queue, worker) = sync_queue(orchestrator, 1);
    let (shutdown_tx, _) = broadcast::channel(1);
    let worker_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

    tracing::info!("Running incremental sync every {:?}; press Ctrl+C to stop", every);
    let mut ticker = interval(every);
    loop {
        tokio::select! {
            biased;

            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                tracing::info!("Ctrl+C received, stopping");
                break;
            }
            _ = ticker.tick() => {
                let ctx = SyncContext::admin(Some("scheduler".to_string()));
                if !queue.try_enqueue(&ctx)? {
                    tracing::warn!("Previous sync pass still queued, skipping this tick");
                }
            }
        }
    }

    let _ = shutdown_tx.send(());
    drop(queue);
    let stats = worker_handle.await.context("Sync worker panicked")?;
    println!("Sync runs: {}, failed: {}", stats.runs, stats.failures);
    Ok(stats.failures == 0)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for entity in &report.entities {
        println!(
            "{:<12} pending={} processed={} pushed={} pulled={} deleted={} skipped={}",
            entity.entity_name,
            entity.pending,
            entity.processed,
            entity.pushed,
            entity.pulled,
            entity.deleted,
            entity.skipped
        );
        if let Some(ref failure) = entity.error {
            println!(
                "{:<12} stopped at change {} ({} {}): {}",
                "",
                failure.change_id,
                failure.operation,
                failure.entity_id,
                failure.message
            );
        }
    }
    println!("Completed in {}ms", report.duration_ms);
    Ok(())
}
