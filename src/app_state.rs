//! Shared application state handed to every actix worker.

use std::sync::Arc;

use log::info;

use crate::config::{AppConfig, MetadataBackend, PermissionPolicy, StorageBackend};
use crate::records::mock_store::MemoryRecordStore;
use crate::records::sqlite_store::SqliteRecordStore;
use crate::records::RecordStore;
use crate::session::UploadSession;
use crate::store::local_store::LocalFileStore;
use crate::store::mock_store::MemoryFileStore;
use crate::store::FileStore;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<UploadSession>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load()?;
        Self::from_config(config)
    }

    /// Wire up the backends named by the configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let files: Arc<dyn FileStore> = match config.storage.backend {
            StorageBackend::Local => Arc::new(LocalFileStore::new(&config.storage)?),
            StorageBackend::Mock => {
                info!("Using in-memory file store");
                Arc::new(MemoryFileStore::new())
            }
        };

        let records: Arc<dyn RecordStore> = match config.metadata.backend {
            MetadataBackend::Sqlite => Arc::new(SqliteRecordStore::new(&config.metadata)?),
            MetadataBackend::Mock => {
                info!("Using in-memory record store");
                Arc::new(MemoryRecordStore::new())
            }
        };

        let session = Arc::new(UploadSession::new(&config, records, files));
        Ok(Self { session, config })
    }

    /// In-memory backends throughout, for handler tests.
    pub fn new_for_testing() -> Self {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Mock;
        config.metadata.backend = MetadataBackend::Mock;
        config.upload.permissions = vec![PermissionPolicy::AllowAny];
        config.upload.optimize = false;
        Self::from_config(config).expect("mock backends cannot fail to build")
    }
}
