use thiserror::Error;

use crate::cursor::Watermark;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("entity name must not be empty")]
    EmptyEntityName,

    #[error("entity id must not be empty")]
    EmptyEntityId,

    #[error(
        "cursor for {entity_name} cannot move backwards (current {current}, requested {requested})"
    )]
    CursorRegression {
        entity_name: String,
        current: Watermark,
        requested: Watermark,
    },

    #[error("sync store connection lock poisoned")]
    Poisoned,
}
