use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::event::ChangeEvent;
use crate::store::{column_time, to_micros, SqliteStore};

const CURSOR_COLUMNS: &str =
    "entity_name, last_processed, last_event_id, metadata, created_at, updated_at";

/// Replay boundary for one entity type. Everything at or before it has
/// already been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Watermark {
    pub at: DateTime<Utc>,
    /// Id of the event that produced `at`; breaks ties between events that
    /// share a timestamp.
    pub event_id: i64,
}

impl Watermark {
    pub fn of(event: &ChangeEvent) -> Self {
        Self {
            at: event.updated_at,
            event_id: event.id,
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.at.to_rfc3339(), self.event_id)
    }
}

/// Per-entity replay position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub entity_name: String,
    pub last_processed: DateTime<Utc>,
    pub last_event_id: i64,
    /// Reserved for adapter-specific resumption state.
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncCursor {
    pub fn watermark(&self) -> Watermark {
        Watermark {
            at: self.last_processed,
            event_id: self.last_event_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorUpdate {
    pub entity_name: String,
    pub watermark: Watermark,
    pub metadata: String,
}

impl CursorUpdate {
    /// Cursor position right after `event` has been fully processed.
    pub fn after(event: &ChangeEvent) -> Self {
        Self {
            entity_name: event.entity_name.clone(),
            watermark: Watermark::of(event),
            metadata: String::new(),
        }
    }
}

/// Filter for the cursor inspection surface.
#[derive(Debug, Clone, Default)]
pub struct CursorFilter {
    pub entity_name: Option<String>,
    /// Inclusive lower bound on the cursor's own `updated_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the cursor's own `updated_at`.
    pub until: Option<DateTime<Utc>>,
}

/// One row per entity type holding its replay watermark.
///
/// Writers must serialize per entity type; there is no compare-and-swap.
pub trait CursorStore: Send + Sync {
    fn find_by_entity(&self, entity_name: &str) -> Result<Option<SyncCursor>>;

    /// Creates the cursor or moves it forward. A request that would move it
    /// backwards fails with [`LedgerError::CursorRegression`].
    fn upsert(&self, update: &CursorUpdate) -> Result<SyncCursor>;
}

impl CursorStore for SqliteStore {
    fn find_by_entity(&self, entity_name: &str) -> Result<Option<SyncCursor>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CURSOR_COLUMNS} FROM sync_cursors WHERE entity_name = ?1"),
            [entity_name],
            cursor_from_row,
        )
        .optional()
        .with_context(|| format!("failed to read sync cursor for {entity_name}"))
    }

    fn upsert(&self, update: &CursorUpdate) -> Result<SyncCursor> {
        if update.entity_name.trim().is_empty() {
            return Err(LedgerError::EmptyEntityName.into());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current = tx
            .query_row(
                &format!("SELECT {CURSOR_COLUMNS} FROM sync_cursors WHERE entity_name = ?1"),
                [&update.entity_name],
                cursor_from_row,
            )
            .optional()?;
        if let Some(current) = current {
            if update.watermark < current.watermark() {
                return Err(LedgerError::CursorRegression {
                    entity_name: update.entity_name.clone(),
                    current: current.watermark(),
                    requested: update.watermark,
                }
                .into());
            }
        }

        let now = to_micros(Utc::now());
        tx.execute(
            "INSERT INTO sync_cursors(entity_name, last_processed, last_event_id, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(entity_name) DO UPDATE SET
                last_processed = excluded.last_processed,
                last_event_id = excluded.last_event_id,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                update.entity_name,
                to_micros(update.watermark.at),
                update.watermark.event_id,
                update.metadata,
                now,
            ],
        )
        .with_context(|| format!("failed to upsert sync cursor for {}", update.entity_name))?;

        let saved = tx.query_row(
            &format!("SELECT {CURSOR_COLUMNS} FROM sync_cursors WHERE entity_name = ?1"),
            [&update.entity_name],
            cursor_from_row,
        )?;
        tx.commit()?;
        Ok(saved)
    }
}

impl SqliteStore {
    pub fn list_cursors(&self, filter: &CursorFilter) -> Result<Vec<SyncCursor>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(name) = &filter.entity_name {
            values.push(Value::Text(name.clone()));
            clauses.push("entity_name = ?");
        }
        if let Some(since) = filter.since {
            values.push(Value::Integer(to_micros(since)));
            clauses.push("updated_at >= ?");
        }
        if let Some(until) = filter.until {
            values.push(Value::Integer(to_micros(until)));
            clauses.push("updated_at < ?");
        }

        let mut sql = format!("SELECT {CURSOR_COLUMNS} FROM sync_cursors");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY entity_name ASC");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), cursor_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list sync cursors")
    }

    /// Deletes the cursor so the next run replays the entity's whole ledger
    /// history. Returns whether a cursor existed.
    pub fn reset_cursor(&self, entity_name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM sync_cursors WHERE entity_name = ?1",
                [entity_name],
            )
            .with_context(|| format!("failed to reset sync cursor for {entity_name}"))?;
        Ok(deleted > 0)
    }
}

fn cursor_from_row(row: &Row<'_>) -> rusqlite::Result<SyncCursor> {
    Ok(SyncCursor {
        entity_name: row.get(0)?,
        last_processed: column_time(row, 1)?,
        last_event_id: row.get(2)?,
        metadata: row.get(3)?,
        created_at: column_time(row, 4)?,
        updated_at: column_time(row, 5)?,
    })
}
