// ABOUTME: Syncer adapter contract - per-entity-type read/write access to both sides
// ABOUTME: Optional delete capabilities are explicit accessors, checked before use

pub mod product;

use anyhow::Result;
use async_trait::async_trait;
use sync_ledger::ChangeEvent;

use crate::context::SyncContext;
use crate::orchestrator::{reconcile_change, ChangeOutcome};

pub use product::ProductSyncer;

/// A record from either side that can be matched against a ledger entry.
pub trait SyncRecord: Send + Sync {
    /// Identifier compared with `ChangeEvent::entity_id`. Always a string so
    /// numeric and textual ids compare the same way.
    fn record_id(&self) -> String;
}

/// Removes local records by id (soft or hard, adapter's choice).
#[async_trait]
pub trait DeleteLocal: Send + Sync {
    async fn delete_local(&self, ctx: &SyncContext, ids: &[String]) -> Result<()>;
}

/// Removes remote records by id. The incremental replay never calls it.
#[async_trait]
pub trait DeleteRemote: Send + Sync {
    async fn delete_remote(&self, ctx: &SyncContext, ids: &[String]) -> Result<()>;
}

/// Adapter for one entity type.
///
/// `push` and `pull` must be idempotent: a crash between an adapter call and
/// the cursor write replays the same event on the next run.
#[async_trait]
pub trait Syncer: Send + Sync {
    type Local: SyncRecord;
    type Remote: SyncRecord;

    /// Ledger entity name this adapter handles, e.g. `"Product"`.
    fn entity_name(&self) -> &str;

    /// Current remote view of the entity type.
    async fn fetch_remote(&self, ctx: &SyncContext) -> Result<Vec<Self::Remote>>;

    /// Current local view of the entity type.
    async fn fetch_local(&self, ctx: &SyncContext) -> Result<Vec<Self::Local>>;

    /// Create-or-update the given local records on the remote side.
    async fn push(&self, ctx: &SyncContext, locals: &[Self::Local]) -> Result<()>;

    /// Create-or-update the given remote records on the local side.
    async fn pull(&self, ctx: &SyncContext, remotes: &[Self::Remote]) -> Result<()>;

    fn local_deletion(&self) -> Option<&dyn DeleteLocal> {
        None
    }

    fn remote_deletion(&self) -> Option<&dyn DeleteRemote> {
        None
    }
}

/// Type-erased adapter held in the orchestrator's registration list.
#[async_trait]
pub trait EntitySyncer: Send + Sync {
    fn entity_name(&self) -> &str;

    /// Reconciles a single ledger event.
    async fn apply_change(&self, ctx: &SyncContext, change: &ChangeEvent)
        -> Result<ChangeOutcome>;
}

#[async_trait]
impl<S> EntitySyncer for S
where
    S: Syncer,
{
    fn entity_name(&self) -> &str {
        Syncer::entity_name(self)
    }

    async fn apply_change(
        &self,
        ctx: &SyncContext,
        change: &ChangeEvent,
    ) -> Result<ChangeOutcome> {
        reconcile_change(self, ctx, change).await
    }
}
