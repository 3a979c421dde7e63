use pyr_types::{GroupId, UnitId, VersionId};

/// Errors from pyramid store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested org unit was not found.
    #[error("org unit not found: {0}")]
    UnitNotFound(UnitId),

    /// The requested group was not found.
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    /// A record references another record of a different version.
    #[error("{what} belongs to version {actual}, expected version {expected}")]
    VersionMismatch {
        what: String,
        expected: VersionId,
        actual: VersionId,
    },

    /// A parent link would be dangling or create a cycle.
    #[error("invalid parent {parent} for org unit {unit}: {reason}")]
    InvalidParent {
        unit: UnitId,
        parent: UnitId,
        reason: String,
    },

    /// Two records share the same local id.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// A record references something the document does not contain.
    #[error("dangling reference: {0}")]
    DanglingReference(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error while reading or writing a pyramid document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
