//! File-store capability behind the chunk writer and the optimizer.
//!
//! The core never touches the filesystem directly; it goes through this
//! trait so the backing store can be the local filesystem, an in-memory
//! store for tests, or eventually object storage.

pub mod local_store;
pub mod mock_store;

use std::io::Read;

use crate::error::StoreError;

/// How an incoming chunk lands on the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// First chunk of a fresh upload: truncate any leftover partial artifact
    /// and start over.
    Create,
    /// Every chunk of a known record: append in arrival order. No
    /// reordering, no gap filling; whole-file integrity is enforced only by
    /// the end-of-stream checksum gate.
    Append,
}

pub trait FileStore: Send + Sync {
    /// Stream a chunk onto the artifact at `logical`.
    fn write_chunk(&self, logical: &str, data: &[u8], mode: WriteMode) -> Result<(), StoreError>;

    /// Write a whole artifact in one shot (optimizer output).
    fn put(&self, logical: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Open the artifact for bounded-block streaming reads.
    fn reader(&self, logical: &str) -> Result<Box<dyn Read + Send>, StoreError>;

    /// Read the whole artifact into memory.
    fn read(&self, logical: &str) -> Result<Vec<u8>, StoreError>;

    /// Remove the artifact. Removing an absent artifact is not an error.
    fn delete(&self, logical: &str) -> Result<(), StoreError>;

    fn exists(&self, logical: &str) -> bool;
}
