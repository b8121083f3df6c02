use thiserror::Error;

/// Errors that may occur while reading from or writing to the ledger store.
///
/// This enum is used across all implementations of the storage traits.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the query.
    #[error("ledger backend unavailable: {0}")]
    Unavailable(String),

    /// The expected entry was not found in the store.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// A write conflicted with concurrent modifications and was rolled back.
    #[error("conflict error: {0}")]
    ConflictError(String),
}
