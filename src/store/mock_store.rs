//! In-memory file store used by tests and the mock backend.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::store::{FileStore, WriteMode};

#[derive(Default)]
pub struct MemoryFileStore {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FileStore for MemoryFileStore {
    fn write_chunk(&self, logical: &str, data: &[u8], mode: WriteMode) -> Result<(), StoreError> {
        let mut artifacts = self.artifacts.lock().unwrap();
        match mode {
            WriteMode::Create => {
                artifacts.insert(logical.to_string(), data.to_vec());
            }
            WriteMode::Append => {
                artifacts
                    .entry(logical.to_string())
                    .or_default()
                    .extend_from_slice(data);
            }
        }
        Ok(())
    }

    fn put(&self, logical: &str, data: &[u8]) -> Result<(), StoreError> {
        self.artifacts
            .lock()
            .unwrap()
            .insert(logical.to_string(), data.to_vec());
        Ok(())
    }

    fn reader(&self, logical: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let data = self.read(logical)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn read(&self, logical: &str) -> Result<Vec<u8>, StoreError> {
        self.artifacts
            .lock()
            .unwrap()
            .get(logical)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(logical.to_string()))
    }

    fn delete(&self, logical: &str) -> Result<(), StoreError> {
        self.artifacts.lock().unwrap().remove(logical);
        Ok(())
    }

    fn exists(&self, logical: &str) -> bool {
        self.artifacts.lock().unwrap().contains_key(logical)
    }
}
