// ABOUTME: Durable change ledger and per-entity sync cursors backed by SQLite
// ABOUTME: Exposes the storage contracts the sync orchestrator replays against

pub mod cursor;
pub mod error;
pub mod event;
pub mod ledger;
pub mod store;

pub use cursor::{CursorFilter, CursorStore, CursorUpdate, SyncCursor, Watermark};
pub use error::LedgerError;
pub use event::{ChangeEvent, ChangeFilter, ChangeOperation, NewChange};
pub use ledger::ChangeLedger;
pub use store::SqliteStore;
