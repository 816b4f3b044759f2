// ABOUTME: Library root for entity-sync
// ABOUTME: Cursor-driven incremental sync of local entity changes to a remote admin API

pub mod capture;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod remote;
pub mod syncer;
pub mod trigger;

pub use capture::{ChangeRecorder, EntityEvent, EventBus, TRACKED_ENTITIES};
pub use config::SyncConfig;
pub use context::{ApiType, SyncContext};
pub use error::SyncError;
pub use orchestrator::{
    ChangeFailure, ChangeOutcome, EntityReport, OrchestratorConfig, RunReport, SyncOrchestrator,
};
pub use syncer::{DeleteLocal, DeleteRemote, EntitySyncer, SyncRecord, Syncer};
pub use trigger::run_incremental_sync;
