use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of mutation recorded for an entity.
///
/// The ledger stores the operation as free-form text. Only the three
/// well-known values get their own variant; anything else round-trips
/// through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeOperation {
    Created,
    Updated,
    Deleted,
    Other(String),
}

impl ChangeOperation {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeOperation::Created => "created",
            ChangeOperation::Updated => "updated",
            ChangeOperation::Deleted => "deleted",
            ChangeOperation::Other(value) => value.as_str(),
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeOperation::Deleted)
    }
}

impl From<&str> for ChangeOperation {
    fn from(value: &str) -> Self {
        match value {
            "created" => ChangeOperation::Created,
            "updated" => ChangeOperation::Updated,
            "deleted" => ChangeOperation::Deleted,
            other => ChangeOperation::Other(other.to_string()),
        }
    }
}

impl From<String> for ChangeOperation {
    fn from(value: String) -> Self {
        ChangeOperation::from(value.as_str())
    }
}

impl From<ChangeOperation> for String {
    fn from(value: ChangeOperation) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change about to be appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub entity_name: String,
    pub entity_id: String,
    pub operation: ChangeOperation,
    pub metadata: String,
    /// Timestamp to record instead of "now". Importers and tests use this to
    /// replay history with known ordering.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl NewChange {
    pub fn new(
        entity_name: impl Into<String>,
        entity_id: impl Into<String>,
        operation: ChangeOperation,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            entity_id: entity_id.into(),
            operation,
            metadata: String::new(),
            occurred_at: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// A persisted ledger row. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: i64,
    pub entity_name: String,
    pub entity_id: String,
    pub operation: ChangeOperation,
    pub metadata: String,
    /// When the change happened, as stamped by the writer.
    pub created_at: DateTime<Utc>,
    /// Replay ordering key. Never older than any earlier row of the entity.
    pub updated_at: DateTime<Utc>,
}

/// Filter for operational listing of ledger rows.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    pub entity_name: Option<String>,
    pub operation: Option<ChangeOperation>,
    /// Inclusive lower bound on `updated_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `updated_at`.
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}
