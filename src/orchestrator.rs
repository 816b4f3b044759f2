// ABOUTME: SyncOrchestrator - replays the change ledger through registered syncers
// ABOUTME: Advances each entity's cursor only after its event's adapter calls succeed

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use sync_ledger::{ChangeEvent, ChangeLedger, CursorStore, CursorUpdate, SyncCursor, Watermark};
use tokio::sync::Mutex;

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::syncer::{EntitySyncer, SyncRecord, Syncer};

/// Configuration for the SyncOrchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Upper bound on the adapter calls for a single ledger event. `None`
    /// waits indefinitely.
    pub event_timeout: Option<Duration>,
}

/// What reconciling one ledger event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOutcome {
    /// `delete_local` was called for the entity.
    DeletedLocally,
    /// The local record was pushed; `pulled` remote matches were pulled back.
    Pushed { pulled: usize },
    /// No local record carries the event's entity id any more.
    MissingLocally,
}

/// The event an entity type stopped at.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeFailure {
    pub change_id: i64,
    pub entity_id: String,
    pub operation: String,
    pub message: String,
    pub transient: bool,
}

/// Per-entity result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub entity_name: String,
    pub started_from: Option<Watermark>,
    pub pending: usize,
    pub processed: usize,
    pub pushed: usize,
    pub pulled: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// Cursor position at the end of the run.
    pub cursor: Option<Watermark>,
    pub error: Option<ChangeFailure>,
}

impl EntityReport {
    fn new(entity_name: &str, started_from: Option<Watermark>, pending: usize) -> Self {
        Self {
            entity_name: entity_name.to_string(),
            started_from,
            pending,
            processed: 0,
            pushed: 0,
            pulled: 0,
            deleted: 0,
            skipped: 0,
            cursor: started_from,
            error: None,
        }
    }

    fn record(&mut self, outcome: ChangeOutcome) {
        match outcome {
            ChangeOutcome::DeletedLocally => self.deleted += 1,
            ChangeOutcome::Pushed { pulled } => {
                self.pushed += 1;
                self.pulled += pulled;
            }
            ChangeOutcome::MissingLocally => self.skipped += 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a single incremental run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub entities: Vec<EntityReport>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.entities.iter().all(EntityReport::is_success)
    }

    pub fn processed(&self) -> usize {
        self.entities.iter().map(|e| e.processed).sum()
    }

    pub fn entity(&self, entity_name: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.entity_name == entity_name)
    }
}

/// SyncOrchestrator drains the change ledger through the registered syncers.
///
/// Each run walks the syncers in registration order and, for each one:
/// 1. Reads the entity's cursor (absent means replay everything)
/// 2. Loads the ledger events after that watermark, oldest first
/// 3. Reconciles each event through the syncer
/// 4. Moves the cursor past the event once the syncer calls succeeded
///
/// An adapter failure stops that entity type for the rest of the run and
/// leaves its cursor on the last good event; the next run retries from
/// there. Ledger and cursor storage failures abort the whole run.
pub struct SyncOrchestrator {
    syncers: Vec<Box<dyn EntitySyncer>>,
    ledger: Arc<dyn ChangeLedger>,
    cursors: Arc<dyn CursorStore>,
    config: OrchestratorConfig,
    run_lock: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(
        syncers: Vec<Box<dyn EntitySyncer>>,
        ledger: Arc<dyn ChangeLedger>,
        cursors: Arc<dyn CursorStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            syncers,
            ledger,
            cursors,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn entity_names(&self) -> Vec<&str> {
        self.syncers.iter().map(|s| s.entity_name()).collect()
    }

    /// Runs one incremental pass over every registered syncer.
    ///
    /// Fails with [`SyncError::AlreadyRunning`] if another pass on this
    /// orchestrator has not finished yet.
    pub async fn run_incremental(&self, ctx: &SyncContext) -> Result<RunReport> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        let start = Instant::now();
        let mut report = RunReport::default();

        tracing::info!(
            request_id = %ctx.request_id,
            syncers = self.syncers.len(),
            "Starting incremental sync"
        );

        for syncer in &self.syncers {
            let entity = self.sync_entity(syncer.as_ref(), ctx).await?;
            report.entities.push(entity);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            request_id = %ctx.request_id,
            processed = report.processed(),
            duration_ms = report.duration_ms,
            success = report.is_success(),
            "Finished incremental sync"
        );
        Ok(report)
    }

    async fn sync_entity(
        &self,
        syncer: &dyn EntitySyncer,
        ctx: &SyncContext,
    ) -> Result<EntityReport> {
        let entity_name = syncer.entity_name();

        let since = self
            .cursors
            .find_by_entity(entity_name)
            .with_context(|| format!("Failed to read cursor for {entity_name}"))?
            .as_ref()
            .map(SyncCursor::watermark);
        let changes = self
            .ledger
            .query_by_entity_since(entity_name, since.as_ref())
            .with_context(|| format!("Failed to load pending changes for {entity_name}"))?;

        tracing::info!(
            entity = entity_name,
            since = ?since,
            pending = changes.len(),
            "Processing entity"
        );
        let mut report = EntityReport::new(entity_name, since, changes.len());

        for change in &changes {
            tracing::debug!(
                entity = entity_name,
                entity_id = %change.entity_id,
                operation = %change.operation,
                updated_at = %change.updated_at,
                "Applying change"
            );

            match self.apply(syncer, ctx, change).await {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    let transient = err
                        .downcast_ref::<SyncError>()
                        .map(SyncError::is_transient)
                        .unwrap_or(false);
                    tracing::error!(
                        entity = entity_name,
                        entity_id = %change.entity_id,
                        operation = %change.operation,
                        change_id = change.id,
                        transient,
                        "Change failed, halting {} until the next run: {:?}",
                        entity_name,
                        err
                    );
                    report.error = Some(ChangeFailure {
                        change_id: change.id,
                        entity_id: change.entity_id.clone(),
                        operation: change.operation.to_string(),
                        message: format!("{err:#}"),
                        transient,
                    });
                    break;
                }
            }

            let saved = self
                .cursors
                .upsert(&CursorUpdate::after(change))
                .with_context(|| format!("Failed to advance cursor for {entity_name}"))?;
            report.cursor = Some(saved.watermark());
            report.processed += 1;
        }

        if report.processed > 0 {
            tracing::info!(
                entity = entity_name,
                processed = report.processed,
                pushed = report.pushed,
                pulled = report.pulled,
                deleted = report.deleted,
                skipped = report.skipped,
                cursor = ?report.cursor,
                "Entity caught up"
            );
        }
        Ok(report)
    }

    async fn apply(
        &self,
        syncer: &dyn EntitySyncer,
        ctx: &SyncContext,
        change: &ChangeEvent,
    ) -> Result<ChangeOutcome> {
        match self.config.event_timeout {
            None => syncer.apply_change(ctx, change).await,
            Some(limit) => tokio::time::timeout(limit, syncer.apply_change(ctx, change))
                .await
                .map_err(|_| {
                    anyhow::Error::from(SyncError::Timeout {
                        entity_name: change.entity_name.clone(),
                        entity_id: change.entity_id.clone(),
                        operation: change.operation.to_string(),
                        after: limit,
                    })
                })?,
        }
    }
}

/// Reconciles one ledger event through a syncer.
///
/// Deletes go to `delete_local` when the syncer has that capability.
/// Everything else, including deletes the syncer cannot apply, pushes the
/// matching local record and pulls back the remote records sharing its id.
/// A record that no longer exists locally is skipped without error.
pub(crate) async fn reconcile_change<S>(
    syncer: &S,
    ctx: &SyncContext,
    change: &ChangeEvent,
) -> Result<ChangeOutcome>
where
    S: Syncer + ?Sized,
{
    let entity_name = syncer.entity_name();
    let entity_id = change.entity_id.as_str();

    if change.operation.is_delete() {
        if let Some(deleter) = syncer.local_deletion() {
            tracing::info!(entity = entity_name, entity_id, "Deleting local record");
            deleter
                .delete_local(ctx, std::slice::from_ref(&change.entity_id))
                .await
                .with_context(|| format!("delete_local failed for {entity_name} {entity_id}"))?;
            return Ok(ChangeOutcome::DeletedLocally);
        }
    }

    let locals = syncer
        .fetch_local(ctx)
        .await
        .with_context(|| format!("fetch_local failed for {entity_name}"))?;
    tracing::debug!(entity = entity_name, count = locals.len(), "Fetched local records");

    let Some(local) = locals.into_iter().find(|r| r.record_id() == entity_id) else {
        tracing::info!(
            entity = entity_name,
            entity_id,
            operation = %change.operation,
            "No local record found, skipping"
        );
        return Ok(ChangeOutcome::MissingLocally);
    };

    tracing::info!(entity = entity_name, entity_id, "Pushing local record");
    syncer
        .push(ctx, std::slice::from_ref(&local))
        .await
        .with_context(|| format!("push failed for {entity_name} {entity_id}"))?;

    let remotes = syncer
        .fetch_remote(ctx)
        .await
        .with_context(|| format!("fetch_remote failed for {entity_name}"))?;
    let matches: Vec<S::Remote> = remotes
        .into_iter()
        .filter(|r| r.record_id() == entity_id)
        .collect();

    if !matches.is_empty() {
        tracing::info!(
            entity = entity_name,
            entity_id,
            count = matches.len(),
            "Pulling remote records"
        );
        syncer
            .pull(ctx, &matches)
            .await
            .with_context(|| format!("pull failed for {entity_name} {entity_id}"))?;
    }

    Ok(ChangeOutcome::Pushed {
        pulled: matches.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_report_counts_outcomes() {
        let mut report = EntityReport::new("Product", None, 3);
        report.record(ChangeOutcome::Pushed { pulled: 1 });
        report.record(ChangeOutcome::MissingLocally);
        report.record(ChangeOutcome::DeletedLocally);
        assert_eq!(report.pushed, 1);
        assert_eq!(report.pulled, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.deleted, 1);
        assert!(report.is_success());
    }

    #[test]
    fn test_run_report_success_requires_every_entity() {
        let ok = EntityReport::new("Product", None, 0);
        let mut failed = EntityReport::new("Customer", None, 1);
        failed.error = Some(ChangeFailure {
            change_id: 1,
            entity_id: "C1".to_string(),
            operation: "updated".to_string(),
            message: "boom".to_string(),
            transient: false,
        });
        let report = RunReport {
            entities: vec![ok, failed],
            duration_ms: 10,
        };
        assert!(!report.is_success());
        assert!(report.entity("Product").unwrap().is_success());
    }
}
