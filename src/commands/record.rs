use anyhow::Result;
use clap::Args;
use sync_ledger::ChangeOperation;

use crate::capture::ChangeRecorder;
use crate::config::SyncConfig;

#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    /// Entity type, e.g. Product
    #[arg(long)]
    pub entity: String,
    /// Entity id
    #[arg(long)]
    pub id: String,
    /// created, updated, deleted or any custom verb
    #[arg(long, default_value = "updated")]
    pub operation: String,
    /// Free-form metadata stored with the change
    #[arg(long, default_value = "")]
    pub metadata: String,
}

/// Appends a change to the ledger by hand, e.g. to replay an entity.
pub async fn record(config: &SyncConfig, args: RecordArgs) -> Result<()> {
    let store = super::open_store(config)?;
    let recorder = ChangeRecorder::new(store);
    if !recorder.is_tracked(&args.entity) {
        tracing::warn!(
            entity = %args.entity,
            "Entity type is not tracked by the change listener; recording anyway"
        );
    }
    let event = recorder.record_change(
        &args.entity,
        &args.id,
        ChangeOperation::from(args.operation),
        &args.metadata,
    )?;
    println!(
        "Recorded change {} ({} {} {}) at {}",
        event.id,
        event.operation,
        event.entity_name,
        event.entity_id,
        event.updated_at.to_rfc3339()
    );
    Ok(())
}
