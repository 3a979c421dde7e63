use thiserror::Error;

use pyr_types::Cancelled;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid date {value:?}: {source}")]
    InvalidDate {
        value: String,
        source: chrono::ParseError,
    },

    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("parent {parent} of {unit} not found in target version")]
    MissingParent { unit: String, parent: String },

    #[error("diff for {0} has no unit to apply")]
    MissingUnit(String),

    #[error("store error: {0}")]
    Store(#[from] pyr_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

pub type SyncResult<T> = Result<T, SyncError>;
