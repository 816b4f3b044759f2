// ABOUTME: Local product catalog - the system of record for products on this side
// ABOUTME: Publishes domain events for every mutation so they reach the change ledger

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sync_ledger::ChangeOperation;

use crate::capture::{EntityEvent, EventBus};
use crate::context::SyncContext;
use crate::syncer::SyncRecord;

pub const PRODUCT_ENTITY: &str = "Product";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    slug        TEXT NOT NULL UNIQUE,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    deleted_at  INTEGER
);
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SyncRecord for Product {
    fn record_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInput {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// Local store contract the product syncer works against.
#[async_trait]
pub trait LocalProducts: Send + Sync {
    /// Live (not soft-deleted) products.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Creates or updates a product on behalf of a local user. Publishes a
    /// domain event.
    async fn upsert_product(&self, ctx: &SyncContext, input: &ProductInput) -> Result<Product>;

    /// Marks a product deleted. Returns false when it was already gone.
    /// Publishes a domain event.
    async fn soft_delete_product(&self, ctx: &SyncContext, id: &str) -> Result<bool>;

    /// Writes remote state into the catalog without publishing an event, so
    /// pulled data is not queued to be pushed straight back.
    async fn apply_remote(&self, input: &ProductInput) -> Result<Option<Product>>;
}

pub struct ProductCatalog {
    conn: Mutex<Connection>,
    bus: Option<EventBus>,
}

impl ProductCatalog {
    pub fn open(path: &Path, bus: Option<EventBus>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create catalog directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open product catalog {}", path.display()))?;
        Self::init(conn, bus)
    }

    pub fn open_in_memory(bus: Option<EventBus>) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, bus)
    }

    fn init(conn: Connection, bus: Option<EventBus>) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to initialize product catalog schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
            bus,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("product catalog lock poisoned"))
    }

    /// Looks a product up by id, soft-deleted rows included.
    pub fn find(&self, id: &str) -> Result<Option<Product>> {
        let conn = self.conn()?;
        find_product(&conn, id)
    }

    fn publish(&self, ctx: &SyncContext, id: &str, operation: ChangeOperation) {
        if let Some(bus) = &self.bus {
            bus.publish(EntityEvent {
                entity_name: PRODUCT_ENTITY.to_string(),
                entity_id: id.to_string(),
                operation,
                ctx: ctx.clone(),
            });
        }
    }

    /// Returns the stored product and whether it was newly created.
    fn write(&self, input: &ProductInput) -> Result<(Product, bool)> {
        validate(input)?;
        let conn = self.conn()?;
        let existing = find_product(&conn, &input.id)?;
        let now = Utc::now().timestamp_micros();
        conn.execute(
            "INSERT INTO products(id, name, slug, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?4, NULL)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                slug = excluded.slug,
                updated_at = excluded.updated_at,
                deleted_at = NULL",
            params![input.id, input.name, input.slug, now],
        )
        .with_context(|| format!("failed to write product {}", input.id))?;
        let saved = find_product(&conn, &input.id)?
            .ok_or_else(|| anyhow!("product {} vanished after write", input.id))?;
        let created = existing.map_or(true, |p| p.deleted_at.is_some());
        Ok((saved, created))
    }
}

#[async_trait]
impl LocalProducts for ProductCatalog {
    async fn list_products(&self) -> Result<Vec<Product>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, slug, created_at, updated_at, deleted_at
             FROM products WHERE deleted_at IS NULL ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], product_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list products")
    }

    async fn upsert_product(&self, ctx: &SyncContext, input: &ProductInput) -> Result<Product> {
        let (product, created) = self.write(input)?;
        let operation = if created {
            ChangeOperation::Created
        } else {
            ChangeOperation::Updated
        };
        self.publish(ctx, &product.id, operation);
        Ok(product)
    }

    async fn soft_delete_product(&self, ctx: &SyncContext, id: &str) -> Result<bool> {
        let changed = {
            let conn = self.conn()?;
            let now = Utc::now().timestamp_micros();
            conn.execute(
                "UPDATE products SET deleted_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, now],
            )
            .with_context(|| format!("failed to delete product {id}"))?
        };
        if changed == 0 {
            return Ok(false);
        }
        self.publish(ctx, id, ChangeOperation::Deleted);
        Ok(true)
    }

    async fn apply_remote(&self, input: &ProductInput) -> Result<Option<Product>> {
        if let Some(current) = self.find(&input.id)? {
            if current.deleted_at.is_some() {
                tracing::debug!(id = %input.id, "Ignoring remote state for deleted product");
                return Ok(None);
            }
            if current.name == input.name && current.slug == input.slug {
                return Ok(Some(current));
            }
        }
        self.write(input).map(|(product, _)| Some(product))
    }
}

fn validate(input: &ProductInput) -> Result<()> {
    if input.id.trim().is_empty() {
        bail!("product id must not be empty");
    }
    if input.slug.trim().is_empty() {
        bail!("product {} needs a slug", input.id);
    }
    Ok(())
}

fn find_product(conn: &Connection, id: &str) -> Result<Option<Product>> {
    conn.query_row(
        "SELECT id, name, slug, created_at, updated_at, deleted_at FROM products WHERE id = ?1",
        [id],
        product_from_row,
    )
    .optional()
    .with_context(|| format!("failed to read product {id}"))
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        created_at: micros(row, 3)?,
        updated_at: micros(row, 4)?,
        deleted_at: row
            .get::<_, Option<i64>>(5)?
            .map(|v| from_micros(5, v))
            .transpose()?,
    })
}

fn micros(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    from_micros(idx, row.get(idx)?)
}

fn from_micros(idx: usize, value: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, value))
}
