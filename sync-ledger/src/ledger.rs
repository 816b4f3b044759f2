use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, TransactionBehavior};

use crate::cursor::Watermark;
use crate::error::LedgerError;
use crate::event::{ChangeEvent, ChangeFilter, ChangeOperation, NewChange};
use crate::store::{column_time, to_micros, SqliteStore};

const EVENT_COLUMNS: &str =
    "id, entity_name, entity_id, operation, metadata, created_at, updated_at";

/// Append-only record of entity mutations.
pub trait ChangeLedger: Send + Sync {
    /// Persists a change. Fails only when the storage layer does.
    ///
    /// `updated_at` never decreases in insert order within an entity: a
    /// change stamped earlier than the entity's newest row is ordered at that
    /// row's timestamp, keeping its own time in `created_at`.
    fn append(&self, change: &NewChange) -> Result<ChangeEvent>;

    /// Events for `entity_name` strictly after `since` (all of them when
    /// `since` is `None`), ordered by `updated_at` then `id`.
    fn query_by_entity_since(
        &self,
        entity_name: &str,
        since: Option<&Watermark>,
    ) -> Result<Vec<ChangeEvent>>;
}

impl ChangeLedger for SqliteStore {
    fn append(&self, change: &NewChange) -> Result<ChangeEvent> {
        if change.entity_name.trim().is_empty() {
            return Err(LedgerError::EmptyEntityName.into());
        }
        if change.entity_id.trim().is_empty() {
            return Err(LedgerError::EmptyEntityId.into());
        }
        let mut conn = self.conn()?;
        // Write lock is held from the MAX read through the insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // updated_at never decreases in id order within an entity.
        let occurred = to_micros(change.occurred_at.unwrap_or_else(Utc::now));
        let newest: Option<i64> = tx.query_row(
            "SELECT MAX(updated_at) FROM change_events WHERE entity_name = ?1",
            [&change.entity_name],
            |row| row.get(0),
        )?;
        let ordered = newest.map_or(occurred, |max| max.max(occurred));
        if ordered != occurred {
            tracing::debug!(
                entity = %change.entity_name,
                id = %change.entity_id,
                "change predates newest ledger row, ordering it last"
            );
        }

        tx.execute(
            "INSERT INTO change_events(entity_name, entity_id, operation, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                change.entity_name,
                change.entity_id,
                change.operation.as_str(),
                change.metadata,
                occurred,
                ordered,
            ],
        )
        .with_context(|| {
            format!(
                "failed to append {} change for {} {}",
                change.operation, change.entity_name, change.entity_id
            )
        })?;
        let id = tx.last_insert_rowid();
        let saved = tx
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM change_events WHERE id = ?1"),
                [id],
                event_from_row,
            )
            .with_context(|| format!("failed to read back change event {id}"))?;
        tx.commit()?;
        Ok(saved)
    }

    fn query_by_entity_since(
        &self,
        entity_name: &str,
        since: Option<&Watermark>,
    ) -> Result<Vec<ChangeEvent>> {
        let conn = self.conn()?;
        let events = match since {
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM change_events
                     WHERE entity_name = ?1
                     ORDER BY updated_at ASC, id ASC"
                ))?;
                let rows = stmt.query_map([entity_name], event_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
            Some(mark) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM change_events
                     WHERE entity_name = ?1
                       AND (updated_at > ?2 OR (updated_at = ?2 AND id > ?3))
                     ORDER BY updated_at ASC, id ASC"
                ))?;
                let rows = stmt.query_map(
                    params![entity_name, to_micros(mark.at), mark.event_id],
                    event_from_row,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
        };
        events.with_context(|| format!("failed to query pending changes for {entity_name}"))
    }
}

impl SqliteStore {
    pub fn find_change(&self, id: i64) -> Result<Option<ChangeEvent>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM change_events WHERE id = ?1"),
            [id],
            event_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Operational listing, newest rows last.
    pub fn list_changes(&self, filter: &ChangeFilter) -> Result<Vec<ChangeEvent>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(name) = &filter.entity_name {
            values.push(Value::Text(name.clone()));
            clauses.push("entity_name = ?");
        }
        if let Some(op) = &filter.operation {
            values.push(Value::Text(op.as_str().to_string()));
            clauses.push("operation = ?");
        }
        if let Some(since) = filter.since {
            values.push(Value::Integer(to_micros(since)));
            clauses.push("updated_at >= ?");
        }
        if let Some(until) = filter.until {
            values.push(Value::Integer(to_micros(until)));
            clauses.push("updated_at < ?");
        }

        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM change_events");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY updated_at ASC, id ASC");
        if let Some(limit) = filter.limit {
            values.push(Value::Integer(limit as i64));
            sql.push_str(" LIMIT ?");
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), event_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list change events")
    }

    /// Retention helper: removes ledger rows older than `before`. The sync
    /// core never calls this.
    pub fn prune_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM change_events WHERE updated_at < ?1",
                [to_micros(before)],
            )
            .context("failed to prune change events")?;
        tracing::info!(deleted, before = %before, "pruned change ledger");
        Ok(deleted as u64)
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ChangeEvent> {
    let operation: String = row.get(3)?;
    Ok(ChangeEvent {
        id: row.get(0)?,
        entity_name: row.get(1)?,
        entity_id: row.get(2)?,
        operation: ChangeOperation::from(operation),
        metadata: row.get(4)?,
        created_at: column_time(row, 5)?,
        updated_at: column_time(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_rejects_blank_entity() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .append(&NewChange::new(" ", "1", ChangeOperation::Created))
            .unwrap_err();
        assert!(err.downcast_ref::<LedgerError>().is_some());
    }

    #[test]
    fn append_returns_persisted_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let event = store
            .append(&NewChange::new("Order", "42", ChangeOperation::Updated).with_metadata("m"))
            .unwrap();
        assert_eq!(event.entity_name, "Order");
        assert_eq!(event.created_at, event.updated_at);
        assert_eq!(store.find_change(event.id).unwrap(), Some(event));
    }

    #[test]
    fn append_clamps_only_within_entity() {
        let store = SqliteStore::open_in_memory().unwrap();
        let later = Utc::now() + chrono::Duration::hours(1);
        store
            .append(&NewChange::new("Order", "1", ChangeOperation::Created).at(later))
            .unwrap();
        let other = store
            .append(&NewChange::new("Product", "1", ChangeOperation::Created))
            .unwrap();
        assert!(other.updated_at < later);
        assert_eq!(other.created_at, other.updated_at);
    }
}
