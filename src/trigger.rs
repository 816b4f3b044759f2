// ABOUTME: Sync triggers - immediate boolean trigger and a queued background worker
// ABOUTME: The worker rebuilds the request context from JSON and runs one pass per job

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};

use crate::context::SyncContext;
use crate::orchestrator::SyncOrchestrator;

/// Runs one incremental pass and reports whether every entity type caught up.
///
/// Failures are logged rather than returned; callers that need detail should
/// use [`SyncOrchestrator::run_incremental`] directly.
pub async fn run_incremental_sync(orchestrator: &SyncOrchestrator, ctx: &SyncContext) -> bool {
    match orchestrator.run_incremental(ctx).await {
        Ok(report) => {
            for entity in report.entities.iter().filter(|e| !e.is_success()) {
                if let Some(ref failure) = entity.error {
                    tracing::warn!(
                        entity = %entity.entity_name,
                        entity_id = %failure.entity_id,
                        change_id = failure.change_id,
                        transient = failure.transient,
                        "Entity stopped early: {}",
                        failure.message
                    );
                }
            }
            report.is_success()
        }
        Err(err) => {
            tracing::error!(request_id = %ctx.request_id, "Incremental sync failed: {:?}", err);
            false
        }
    }
}

/// Counters reported by [`SyncWorker::run`] when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub runs: u64,
    pub failures: u64,
}

/// Sending half of the sync job queue.
#[derive(Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<String>,
}

impl SyncQueue {
    /// Queues a run for `ctx`. Waits while the queue is full.
    pub async fn enqueue(&self, ctx: &SyncContext) -> Result<()> {
        let payload = ctx.to_json()?;
        self.tx
            .send(payload)
            .await
            .context("sync worker has stopped")?;
        tracing::debug!(request_id = %ctx.request_id, "Sync job queued");
        Ok(())
    }

    /// Queues a run unless the queue is full. Returns false when the job was
    /// dropped because enough runs are already waiting.
    pub fn try_enqueue(&self, ctx: &SyncContext) -> Result<bool> {
        let payload = ctx.to_json()?;
        match self.tx.try_send(payload) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(request_id = %ctx.request_id, "Sync queue full, job dropped");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                anyhow::bail!("sync worker has stopped")
            }
        }
    }
}

/// Single consumer of the sync job queue. One worker per orchestrator keeps
/// runs from overlapping.
pub struct SyncWorker {
    orchestrator: Arc<SyncOrchestrator>,
    rx: mpsc::Receiver<String>,
}

pub fn sync_queue(orchestrator: Arc<SyncOrchestrator>, capacity: usize) -> (SyncQueue, SyncWorker) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SyncQueue { tx }, SyncWorker { orchestrator, rx })
}

impl SyncWorker {
    /// Processes queued jobs until `shutdown` fires or every queue handle is
    /// dropped. A run in progress when shutdown arrives is finished first.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        tracing::info!("Sync worker started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping sync worker");
                    break;
                }
                job = self.rx.recv() => {
                    let Some(payload) = job else {
                        tracing::debug!("Sync queue closed");
                        break;
                    };
                    stats.runs += 1;
                    if !self.process(&payload).await {
                        stats.failures += 1;
                    }
                }
            }
        }

        tracing::info!(runs = stats.runs, failures = stats.failures, "Sync worker stopped");
        stats
    }

    async fn process(&self, payload: &str) -> bool {
        let ctx = match SyncContext::from_json(payload) {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::error!("Discarding sync job with unreadable context: {:?}", err);
                return false;
            }
        };
        run_incremental_sync(&self.orchestrator, &ctx).await
    }
}
