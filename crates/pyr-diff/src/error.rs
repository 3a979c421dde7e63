//! Error types for the diff crate.

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A field name could not be turned into a field type.
    #[error("unsupported field: {0}")]
    Configuration(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] pyr_store::StoreError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
