//! Local filesystem file store.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::store::{FileStore, WriteMode};

/// Stores artifacts under a media root, creating bucket directories on
/// demand. Logical paths are relative, slash-separated, and become physical
/// paths by joining onto the root.
pub struct LocalFileStore {
    media_root: PathBuf,
}

impl LocalFileStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StoreError> {
        let media_root = PathBuf::from(&config.media_root);
        fs::create_dir_all(&media_root).map_err(|e| {
            StoreError::Path(format!(
                "cannot create media root {}: {}",
                media_root.display(),
                e
            ))
        })?;
        info!("Using local file store at {}", media_root.display());
        Ok(Self { media_root })
    }

    pub fn physical_path(&self, logical: &str) -> PathBuf {
        let mut path = self.media_root.clone();
        // Rebuild from components so a logical path can never climb out of
        // the media root.
        for part in logical.split('/') {
            if !part.is_empty() && part != "." && part != ".." {
                path.push(part);
            }
        }
        path
    }

    /// Idempotent and concurrency-safe: directory-already-exists is not an
    /// error, anything else is a `StoreError::Path`.
    fn ensure_parent(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::Path(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        Ok(())
    }
}

impl FileStore for LocalFileStore {
    fn write_chunk(&self, logical: &str, data: &[u8], mode: WriteMode) -> Result<(), StoreError> {
        let path = self.physical_path(logical);
        self.ensure_parent(&path)?;

        let mut file = match mode {
            WriteMode::Create => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?,
            WriteMode::Append => OpenOptions::new().append(true).create(true).open(&path)?,
        };
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    fn put(&self, logical: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.physical_path(logical);
        self.ensure_parent(&path)?;
        fs::write(&path, data)?;
        Ok(())
    }

    fn reader(&self, logical: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let path = self.physical_path(logical);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(logical.to_string())
            } else {
                StoreError::Io(e)
            }
        })?;
        Ok(Box::new(file))
    }

    fn read(&self, logical: &str) -> Result<Vec<u8>, StoreError> {
        let mut buf = Vec::new();
        self.reader(logical)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn delete(&self, logical: &str) -> Result<(), StoreError> {
        let path = self.physical_path(logical);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn exists(&self, logical: &str) -> bool {
        self.physical_path(logical).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn store(dir: &tempfile::TempDir) -> LocalFileStore {
        let config = StorageConfig {
            media_root: dir.path().join("media").to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };
        LocalFileStore::new(&config).unwrap()
    }

    #[test]
    fn test_append_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store
            .write_chunk("2026/08/25/a.bin", b"one-", WriteMode::Create)
            .unwrap();
        store
            .write_chunk("2026/08/25/a.bin", b"two-", WriteMode::Append)
            .unwrap();
        store
            .write_chunk("2026/08/25/a.bin", b"three", WriteMode::Append)
            .unwrap();

        assert_eq!(store.read("2026/08/25/a.bin").unwrap(), b"one-two-three");
    }

    #[test]
    fn test_create_mode_truncates_partial_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store
            .write_chunk("a.bin", b"stale partial bytes", WriteMode::Create)
            .unwrap();
        store.write_chunk("a.bin", b"fresh", WriteMode::Create).unwrap();

        assert_eq!(store.read("a.bin").unwrap(), b"fresh");
    }

    #[test]
    fn test_delete_is_tolerant_of_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.put("b.bin", b"x").unwrap();
        assert!(store.exists("b.bin"));
        store.delete("b.bin").unwrap();
        assert!(!store.exists("b.bin"));
        store.delete("b.bin").unwrap();
    }

    #[test]
    fn test_reader_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.reader("missing.bin"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_logical_path_cannot_escape_media_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let path = store.physical_path("../../etc/passwd");
        assert!(path.starts_with(dir.path().join("media")));
    }
}
