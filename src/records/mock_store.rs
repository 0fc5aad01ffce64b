//! In-memory record store used by tests and the mock backend.
//!
//! Mirrors the SQL semantics, including the detail that anonymous (NULL)
//! owners never collide under the (user, checksum) unique constraint.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::RecordError;
use crate::records::{RecordStore, UploadRecord};

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<Uuid, UploadRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert(&self, record: &UploadRecord) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.id) {
            return Err(RecordError::Duplicate);
        }
        if record.user.is_some()
            && records
                .values()
                .any(|r| r.user == record.user && r.checksum == record.checksum)
        {
            return Err(RecordError::Duplicate);
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    fn update(&self, record: &UploadRecord) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(RecordError::NotFound),
        }
    }

    fn find_by_id(&self, id: &Uuid) -> Result<Option<UploadRecord>, RecordError> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    fn find(&self, user: Option<&str>, checksum: &str) -> Result<Option<UploadRecord>, RecordError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.user.as_deref() == user && r.checksum == checksum)
            .cloned())
    }

    fn delete(&self, id: &Uuid) -> Result<(), RecordError> {
        self.records.lock().unwrap().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity;

    #[test]
    fn test_duplicate_detection_matches_sql_semantics() {
        let store = MemoryRecordStore::new();
        let first = UploadRecord::new(identity::derive(Some("alice"), "x"), "x", Some("alice"));
        store.insert(&first).unwrap();

        let clash = UploadRecord::new(Uuid::new_v4(), "x", Some("alice"));
        assert!(matches!(store.insert(&clash), Err(RecordError::Duplicate)));

        // NULL owners never collide, as in SQL.
        let anon_a = UploadRecord::new(Uuid::new_v4(), "y", None);
        let anon_b = UploadRecord::new(Uuid::new_v4(), "y", None);
        store.insert(&anon_a).unwrap();
        store.insert(&anon_b).unwrap();
    }
}
