//! Error types shared across the storage, record, and optimizer layers.

use thiserror::Error;

/// Failures raised by the file-store capability.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage root is misconfigured or a directory could not be created.
    #[error("storage path error: {0}")]
    Path(String),
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures raised by the metadata record store.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The (user, checksum) unique constraint was violated. Treated as
    /// "another writer created this record first", never as a crash.
    #[error("a record for this (user, checksum) already exists")]
    Duplicate,
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(String),
}

/// Failures raised by a post-completion content transform. These are logged
/// by the session and never propagated as a request failure.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("image encode failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
