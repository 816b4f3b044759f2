// ABOUTME: Command implementations for the entity-sync CLI
// ABOUTME: Exports sync, record, ledger inspection, token and product commands

pub mod inspect;
pub mod product;
pub mod record;
pub mod sync;
pub mod token;

use std::sync::Arc;

use anyhow::{Context, Result};
use sync_ledger::SqliteStore;

use crate::config::SyncConfig;

pub use inspect::{changes, cursor_reset, cursors, prune, ChangesArgs, CursorsArgs};
pub use product::{product, ProductArgs};
pub use record::{record, RecordArgs};
pub use sync::{sync, SyncArgs};
pub use token::{token, TokenArgs};

/// Opens the change ledger and cursor database named by the config.
pub(crate) fn open_store(config: &SyncConfig) -> Result<Arc<SqliteStore>> {
    let path = config.database_path()?;
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Failed to open change ledger at {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Change ledger opened");
    Ok(Arc::new(store))
}
