//! Transient per-request upload metadata.
//!
//! Reconstructed fresh from each request's `x-file-*` headers and never
//! persisted as-is; only the fields that map onto the durable record
//! survive the request.

use std::collections::HashMap;

use actix_web::http::header::HeaderMap;
use log::warn;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::paths;
use crate::records::ContentKind;

/// Literal tokens accepted as a truthy end-of-stream flag.
const TRUTHY: [&str; 4] = ["true", "1", "yes", "on"];

/// Pattern applied to kinds with no configured accept list.
const ACCEPT_ANY: &str = ".*/*";

#[derive(Debug, Clone, Default)]
pub struct ChunkMetadata {
    /// Explicit record id, bypassing the checksum lookup.
    pub id: Option<Uuid>,
    /// Original client-side file name.
    pub name: String,
    /// Whole-file digest declared by the client; also the session key.
    pub checksum: String,
    /// Advisory byte-range bookkeeping; never used to reject chunks.
    pub chunk_from: Option<u64>,
    pub chunk_to: Option<u64>,
    pub chunk_size: Option<u64>,
    /// Client-asserted "this was the last chunk".
    pub eof: bool,
    /// Advisory declared total size.
    pub size: Option<u64>,
    pub mime_type: Option<String>,
}

impl ChunkMetadata {
    /// Parse the `x-file-*` header set. Missing or malformed numeric fields
    /// are dropped rather than rejected; they are advisory only.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| -> Option<String> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let number = |name: &str| -> Option<u64> { text(name).and_then(|v| v.parse().ok()) };

        Self {
            id: text("x-file-id").and_then(|v| Uuid::parse_str(&v).ok()),
            name: text("x-file-name").unwrap_or_default(),
            checksum: text("x-file-checksum").unwrap_or_default(),
            chunk_from: number("x-file-chunk-from"),
            chunk_to: number("x-file-chunk-to"),
            chunk_size: number("x-file-chunk-size"),
            eof: text("x-file-eof").map(|v| parse_eof(&v)).unwrap_or(false),
            size: number("x-file-size"),
            mime_type: text("x-file-mime-type"),
        }
    }

    pub fn extension(&self) -> String {
        paths::file_extension(&self.name)
    }

    pub fn kind(&self) -> ContentKind {
        ContentKind::from_extension(&self.extension())
    }

    /// Addressability and acceptance gate: checksum and payload must be
    /// present, and the MIME type must match the accept list for the file's
    /// classification. Patterns are matched from the start of the type, the
    /// way the accept lists are written (`image/*`, `application/pdf`).
    pub fn validate(
        &self,
        payload_len: usize,
        accepted_types: &HashMap<ContentKind, Vec<String>>,
    ) -> Result<(), String> {
        if self.checksum.is_empty() {
            return Err("Missing file checksum.".to_string());
        }
        if payload_len == 0 {
            return Err("Missing file content.".to_string());
        }

        let patterns = match accepted_types.get(&self.kind()) {
            Some(patterns) => patterns.clone(),
            None => vec![ACCEPT_ANY.to_string()],
        };
        let mime = self.mime_type.as_deref().unwrap_or("");
        for pattern in &patterns {
            match Regex::new(&format!("^(?:{})", pattern)) {
                Ok(re) if re.is_match(mime) => return Ok(()),
                Ok(_) => {}
                Err(e) => warn!("Invalid accept pattern {:?}: {}", pattern, e),
            }
        }
        Err(format!("File type {:?} is not accepted.", mime))
    }

    /// Snapshot persisted onto the record's metadata blob when enabled.
    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::to_value(ReplyBody::new(self, "", None)).unwrap_or_default()
    }
}

pub fn parse_eof(value: &str) -> bool {
    TRUTHY.contains(&value.to_ascii_lowercase().as_str())
}

/// Flat response body echoed back on every chunk request, success or
/// failure. `url` is present only once the upload is fully complete.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyBody {
    pub checksum: String,
    pub chunk_from: Option<u64>,
    pub chunk_size: Option<u64>,
    pub chunk_to: Option<u64>,
    pub eof: bool,
    pub mime_type: Option<String>,
    pub name: String,
    pub size: Option<u64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ReplyBody {
    pub fn new(meta: &ChunkMetadata, message: &str, url: Option<String>) -> Self {
        Self {
            checksum: meta.checksum.clone(),
            chunk_from: meta.chunk_from,
            chunk_size: meta.chunk_size,
            chunk_to: meta.chunk_to,
            eof: meta.eof,
            mime_type: meta.mime_type.clone(),
            name: meta.name.clone(),
            size: meta.size,
            message: message.to_string(),
            url,
        }
    }
}
