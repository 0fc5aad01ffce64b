//! Application configuration.
//!
//! Loaded from a YAML file with every default enumerated once; the resulting
//! struct is passed explicitly into the session and the optimizer at
//! construction time.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::permissions::{
    AllowAny, IsAdminUser, IsAuthenticated, IsAuthenticatedOrReadOnly, IsSuperUser, Permission,
};
use crate::records::{ContentKind, Status};

/// File storage backend types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Local,
    Mock,
}

/// Record store backend types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MetadataBackend {
    Sqlite,
    Mock,
}

/// Named permission evaluators that can be listed in the config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionPolicy {
    AllowAny,
    IsAuthenticated,
    IsSuperUser,
    IsAdminUser,
    IsAuthenticatedOrReadOnly,
}

impl PermissionPolicy {
    pub fn evaluator(&self) -> Box<dyn Permission> {
        match self {
            PermissionPolicy::AllowAny => Box::new(AllowAny),
            PermissionPolicy::IsAuthenticated => Box::new(IsAuthenticated),
            PermissionPolicy::IsSuperUser => Box::new(IsSuperUser),
            PermissionPolicy::IsAdminUser => Box::new(IsAdminUser),
            PermissionPolicy::IsAuthenticatedOrReadOnly => Box::new(IsAuthenticatedOrReadOnly),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    pub upload: UploadConfig,
    pub optimizer: OptimizerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Maximum payload size per chunk request, in bytes.
    pub max_payload_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for stored artifacts.
    pub media_root: String,
    /// Public URL prefix under which artifacts are served.
    pub media_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            media_root: "./data/media".to_string(),
            media_url: "/media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    pub backend: MetadataBackend,
    pub db_path: String,
}

/// Behavior of the upload session itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Advisory chunk size advertised to clients, in bytes.
    pub chunk_size: usize,
    /// strftime pattern for the time-bucketed upload directory.
    pub upload_to: String,
    /// Persist the per-request metadata blob onto the record.
    pub persist_metadata: bool,
    /// Delete the previous artifact when an update re-uploads a file.
    pub remove_file_on_update: bool,
    /// Initial status for freshly created records.
    pub default_status: Status,
    /// Capability gate: the request passes if ANY listed evaluator grants.
    pub permissions: Vec<PermissionPolicy>,
    /// Accepted MIME patterns per content classification. A kind with no
    /// entry accepts any type.
    pub accepted_types: HashMap<ContentKind, Vec<String>>,
    /// Run the post-completion optimizer pipeline.
    pub optimize: bool,
}

/// Image optimizer parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// JPEG quality, 1-100.
    pub quality: u8,
    /// PNG compression level, 0-9.
    pub compress_level: u8,
    pub max_width: u32,
    pub max_height: u32,
    /// Encode every supported image as WEBP regardless of source format.
    pub to_webp: bool,
    /// Keep the pre-optimization artifact instead of deleting it.
    pub keep_original: bool,
    /// Optional crop box, applied before resizing.
    pub crop: Option<CropBox>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Path to the log4rs configuration file.
    pub config_file: String,
}

impl AppConfig {
    /// Load configuration from `config.yaml`, falling back to defaults when
    /// the file is absent.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = "config.yaml";
        if Path::new(config_path).exists() {
            let content = fs::read_to_string(config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path);
            Ok(config)
        } else {
            warn!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 9720,
                workers: 4,
                max_payload_size: 64 * 1024 * 1024,
            },
            storage: StorageConfig::default(),
            metadata: MetadataConfig {
                backend: MetadataBackend::Sqlite,
                db_path: "./data/records.db".to_string(),
            },
            upload: UploadConfig {
                chunk_size: 2 * 1024 * 1024,
                upload_to: "%Y/%m/%d".to_string(),
                persist_metadata: false,
                remove_file_on_update: true,
                default_status: Status::Pending,
                permissions: vec![PermissionPolicy::IsAuthenticated],
                accepted_types: HashMap::new(),
                optimize: true,
            },
            optimizer: OptimizerConfig {
                quality: 82,
                compress_level: 9,
                max_width: 1280,
                max_height: 720,
                to_webp: true,
                keep_original: false,
                crop: None,
            },
            logging: LoggingConfig {
                config_file: "server_log.yaml".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.upload.chunk_size, 2 * 1024 * 1024);
        assert_eq!(config.upload.permissions, vec![PermissionPolicy::IsAuthenticated]);
        assert_eq!(config.optimizer.max_width, 1280);
        assert_eq!(config.optimizer.max_height, 720);
        assert!(config.optimizer.to_webp);
        assert!(config.upload.optimize);
    }

    #[test]
    fn test_config_round_trips_through_yaml() {
        let mut config = AppConfig::default();
        config
            .upload
            .accepted_types
            .insert(ContentKind::Image, vec!["image/*".to_string()]);
        config.optimizer.crop = Some(CropBox {
            x: 10,
            y: 20,
            width: 100,
            height: 50,
        });

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            parsed.upload.accepted_types.get(&ContentKind::Image),
            Some(&vec!["image/*".to_string()])
        );
        assert_eq!(parsed.optimizer.crop, config.optimizer.crop);
    }
}
