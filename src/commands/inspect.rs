// ABOUTME: Ledger and cursor inspection commands plus retention and cursor reset
// ABOUTME: Operational tools; the sync core never depends on them

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use sync_ledger::{ChangeFilter, ChangeOperation, CursorFilter};

use crate::config::SyncConfig;

#[derive(Args, Debug, Clone, Default)]
pub struct ChangesArgs {
    /// Only this entity type
    #[arg(long)]
    pub entity: Option<String>,
    /// Only this operation
    #[arg(long)]
    pub operation: Option<String>,
    /// Changes at or after this RFC 3339 time
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,
    /// Changes before this RFC 3339 time
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print one JSON object per line
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct CursorsArgs {
    #[arg(long)]
    pub entity: Option<String>,
    /// Cursors updated at or after this RFC 3339 time
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,
    /// Cursors updated before this RFC 3339 time
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,
    #[arg(long)]
    pub json: bool,
}

pub async fn changes(config: &SyncConfig, args: ChangesArgs) -> Result<()> {
    let store = super::open_store(config)?;
    let filter = ChangeFilter {
        entity_name: args.entity,
        operation: args.operation.map(ChangeOperation::from),
        since: args.since,
        until: args.until,
        limit: args.limit,
    };
    let events = store.list_changes(&filter)?;
    if events.is_empty() {
        println!("No changes recorded.");
        return Ok(());
    }
    for event in &events {
        if args.json {
            println!("{}", serde_json::to_string(event)?);
        } else {
            println!(
                "{:>8}  {}  {:<10} {:<12} {}",
                event.id,
                event.updated_at.to_rfc3339(),
                event.operation,
                event.entity_name,
                event.entity_id
            );
        }
    }
    Ok(())
}

pub async fn cursors(config: &SyncConfig, args: CursorsArgs) -> Result<()> {
    let store = super::open_store(config)?;
    let filter = CursorFilter {
        entity_name: args.entity,
        since: args.since,
        until: args.until,
    };
    let cursors = store.list_cursors(&filter)?;
    if cursors.is_empty() {
        println!("No sync cursors yet.");
        return Ok(());
    }
    for cursor in &cursors {
        if args.json {
            println!("{}", serde_json::to_string(cursor)?);
        } else {
            println!(
                "{:<12} last_processed={} last_event_id={} updated_at={}",
                cursor.entity_name,
                cursor.last_processed.to_rfc3339(),
                cursor.last_event_id,
                cursor.updated_at.to_rfc3339()
            );
        }
    }
    Ok(())
}

/// Deletes an entity's cursor; its next run replays the whole ledger.
pub async fn cursor_reset(config: &SyncConfig, entity: &str) -> Result<()> {
    let store = super::open_store(config)?;
    if store.reset_cursor(entity)? {
        tracing::warn!(entity, "Sync cursor reset; next run replays all recorded changes");
        println!("Cursor for {} reset.", entity);
    } else {
        println!("No cursor stored for {}.", entity);
    }
    Ok(())
}

pub async fn prune(config: &SyncConfig, before: DateTime<Utc>) -> Result<()> {
    let store = super::open_store(config)?;
    let deleted = store.prune_before(before)?;
    println!("Removed {} changes recorded before {}.", deleted, before.to_rfc3339());
    Ok(())
}
