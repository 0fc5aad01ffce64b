//! The chunked-upload session state machine.
//!
//! Each request is handled statelessly: the session re-derives the upload
//! identity from (user, checksum), resolves or creates the backing record,
//! gates on permissions, lands the chunk, and on end-of-stream verifies the
//! assembled artifact and runs the optimizer pipeline. All cross-request
//! coordination is delegated to the record store's unique constraint and the
//! final checksum gate; the session holds no locks.

use std::sync::Arc;

use actix_web::http::StatusCode;
use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;

use crate::checksum;
use crate::config::AppConfig;
use crate::error::{RecordError, StoreError};
use crate::identity;
use crate::metadata::{ChunkMetadata, ReplyBody};
use crate::optimize::{ImageOptimizer, Optimizer, OptimizerRegistry};
use crate::paths;
use crate::permissions::{self, Action, Permission, RequestContext};
use crate::records::{ContentKind, RecordStore, Status, UploadRecord};
use crate::store::{FileStore, WriteMode};
use crate::config::UploadConfig;

pub const MSG_IN_PROGRESS: &str = "Uploading file, please wait a moment.";
pub const MSG_COMPLETE: &str = "File upload is completed.";
pub const MSG_ALREADY_EXISTS: &str = "The file already exists.";
pub const MSG_CHECKSUM_MISMATCH: &str = "The file does not match the MD5 checksum.";
pub const MSG_DELETED: &str = "The file deleted successfully.";
pub const MSG_PERMISSION_DENIED: &str = "Permission denied.";
pub const MSG_NOT_FOUND: &str = "Not found.";
pub const MSG_CONCURRENT_WRITER: &str = "The file was created by another user.";

/// Client-visible failure modes of a chunk request. Every variant maps onto
/// a reply; none of them crash the request.
#[derive(Debug, Error)]
enum UploadError {
    #[error("{}", MSG_CONCURRENT_WRITER)]
    ConcurrentWriter,
    #[error("{0}")]
    Database(String),
    #[error("{0}")]
    Storage(#[from] StoreError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl From<RecordError> for UploadError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Duplicate => UploadError::ConcurrentWriter,
            other => UploadError::Database(format!("DB error: {}.", other)),
        }
    }
}

/// Outcome of one chunk request: an HTTP status plus the flat reply body.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub status: StatusCode,
    pub body: ReplyBody,
}

/// Hook invoked after verification succeeds and before optimization runs.
/// No-op by default; registered by embedders that need to kick off indexing
/// or notifications.
pub trait UploadHook: Send + Sync {
    fn on_complete(&self, record: &UploadRecord);
}

pub struct UploadSession {
    upload: UploadConfig,
    media_url: String,
    records: Arc<dyn RecordStore>,
    files: Arc<dyn FileStore>,
    optimizers: OptimizerRegistry,
    evaluators: Vec<Box<dyn Permission>>,
    hooks: Vec<Box<dyn UploadHook>>,
}

impl UploadSession {
    pub fn new(config: &AppConfig, records: Arc<dyn RecordStore>, files: Arc<dyn FileStore>) -> Self {
        let evaluators = config
            .upload
            .permissions
            .iter()
            .map(|policy| policy.evaluator())
            .collect();

        let mut optimizers = OptimizerRegistry::new();
        optimizers.register(
            ContentKind::Image,
            Box::new(ImageOptimizer::new(
                config.optimizer.clone(),
                &config.upload.upload_to,
            )),
        );

        Self {
            upload: config.upload.clone(),
            media_url: config.storage.media_url.clone(),
            records,
            files,
            optimizers,
            evaluators,
            hooks: Vec::new(),
        }
    }

    /// Replace the transform for a content classification.
    pub fn register_optimizer(&mut self, kind: ContentKind, transform: Box<dyn Optimizer>) {
        self.optimizers.register(kind, transform);
    }

    pub fn register_hook(&mut self, hook: Box<dyn UploadHook>) {
        self.hooks.push(hook);
    }

    /// Handle one chunk request (create or update).
    pub fn handle_chunk(
        &self,
        ctx: &RequestContext,
        meta: &ChunkMetadata,
        payload: &[u8],
    ) -> ChunkOutcome {
        if let Err(message) = meta.validate(payload.len(), &self.upload.accepted_types) {
            return reply(StatusCode::BAD_REQUEST, meta, &message, None);
        }
        if !permissions::gate(&self.evaluators, ctx) {
            return reply(StatusCode::BAD_REQUEST, meta, MSG_PERMISSION_DENIED, None);
        }

        let existing = match self.resolve_record(ctx, meta) {
            Ok(existing) => existing,
            Err(e) => return reply(StatusCode::BAD_REQUEST, meta, &e.to_string(), None),
        };

        let (record, is_new) = match (existing, ctx.action) {
            (Some(record), Action::Update) => {
                // Ownership must be settled before the reset below touches
                // the record or its artifact.
                if !self.can_touch(ctx, &record) {
                    return reply(StatusCode::BAD_REQUEST, meta, MSG_PERMISSION_DENIED, None);
                }
                match self.prepare_update(record) {
                    Ok(record) => (record, false),
                    Err(e) => return reply(StatusCode::BAD_REQUEST, meta, &e.to_string(), None),
                }
            }
            (None, Action::Update) => {
                return reply(StatusCode::BAD_REQUEST, meta, MSG_NOT_FOUND, None)
            }
            (Some(record), _) => (record, false),
            (None, _) => {
                let id = identity::derive(ctx.user_key(), &meta.checksum);
                let mut record = UploadRecord::new(id, &meta.checksum, ctx.user_key());
                record.status = self.upload.default_status;
                (record, true)
            }
        };

        match self.process_chunk(ctx, meta, payload, record, is_new) {
            Ok(outcome) => outcome,
            Err(e) => reply(StatusCode::BAD_REQUEST, meta, &e.to_string(), None),
        }
    }

    /// Read a record's public representation.
    pub fn handle_read(&self, ctx: &RequestContext, meta: &ChunkMetadata) -> ChunkOutcome {
        // Existence is not disclosed to callers the gate rejects.
        if !permissions::gate(&self.evaluators, ctx) {
            return reply(StatusCode::NOT_FOUND, meta, MSG_NOT_FOUND, None);
        }
        match self.resolve_record(ctx, meta) {
            Ok(Some(record)) if self.can_touch(ctx, &record) => {
                let url = record.eof.then(|| self.public_url(&record.file_path));
                let message = if record.eof { MSG_COMPLETE } else { MSG_IN_PROGRESS };
                reply(StatusCode::OK, meta, message, url)
            }
            _ => reply(StatusCode::NOT_FOUND, meta, MSG_NOT_FOUND, None),
        }
    }

    /// Delete a record and its artifact. Owner-gated: only the owning user
    /// or a superuser may delete, and absence is a client error.
    pub fn handle_delete(&self, ctx: &RequestContext, meta: &ChunkMetadata) -> ChunkOutcome {
        if !permissions::gate(&self.evaluators, ctx) {
            return reply(StatusCode::BAD_REQUEST, meta, MSG_PERMISSION_DENIED, None);
        }
        let record = match self.resolve_record(ctx, meta) {
            Ok(record) => record,
            Err(e) => return reply(StatusCode::BAD_REQUEST, meta, &e.to_string(), None),
        };
        match record {
            Some(record) if self.can_touch(ctx, &record) => {
                if !record.file_path.is_empty() {
                    if let Err(e) = self.files.delete(&record.file_path) {
                        warn!("Cannot delete artifact {}: {}", record.file_path, e);
                    }
                }
                if let Err(e) = self.records.delete(&record.id) {
                    return reply(StatusCode::BAD_REQUEST, meta, &e.to_string(), None);
                }
                info!("Deleted upload {} for user {:?}", record.id, record.user);
                reply(StatusCode::OK, meta, MSG_DELETED, None)
            }
            Some(_) => reply(StatusCode::BAD_REQUEST, meta, MSG_PERMISSION_DENIED, None),
            None => reply(StatusCode::BAD_REQUEST, meta, MSG_NOT_FOUND, None),
        }
    }

    /// Resolve by explicit id when given, else by (user, checksum).
    fn resolve_record(
        &self,
        ctx: &RequestContext,
        meta: &ChunkMetadata,
    ) -> Result<Option<UploadRecord>, UploadError> {
        if let Some(id) = meta.id {
            return Ok(self.records.find_by_id(&id)?);
        }
        Ok(self.records.find(ctx.user_key(), &meta.checksum)?)
    }

    /// An update re-opens the record: optionally drop the previous artifact
    /// and clear the verified flag so the resumed stream is re-verified.
    fn prepare_update(&self, mut record: UploadRecord) -> Result<UploadRecord, UploadError> {
        if self.upload.remove_file_on_update && !record.file_path.is_empty() {
            self.files.delete(&record.file_path)?;
            record.file_path.clear();
        }
        record.eof = false;
        record.updated_at = Utc::now();
        self.records.update(&record)?;
        Ok(record)
    }

    fn process_chunk(
        &self,
        ctx: &RequestContext,
        meta: &ChunkMetadata,
        payload: &[u8],
        mut record: UploadRecord,
        is_new: bool,
    ) -> Result<ChunkOutcome, UploadError> {
        // Never append to a completed artifact.
        if record.eof {
            return Ok(reply(StatusCode::FORBIDDEN, meta, MSG_ALREADY_EXISTS, None));
        }
        if !self.can_touch(ctx, &record) {
            return Ok(reply(StatusCode::BAD_REQUEST, meta, MSG_PERMISSION_DENIED, None));
        }

        // A record that already carries a path is a resumed upload and gets
        // appends; a pathless record starts a fresh artifact, truncating any
        // leftover partial bytes.
        let mode = if record.file_path.is_empty() {
            let bucket = paths::upload_bucket(&self.upload.upload_to);
            let filename = format!("{}{}", record.id, meta.extension());
            record.file_path = paths::logical_path(&filename, &bucket);
            WriteMode::Create
        } else {
            WriteMode::Append
        };

        record.kind = meta.kind();
        record.status = Status::Processing;
        // Provisional: reverted if verification fails below.
        record.eof = meta.eof;
        record.user = ctx.user_key().map(str::to_string);
        if self.upload.persist_metadata {
            record.metadata = meta.to_metadata();
        }
        record.updated_at = Utc::now();

        // The record is claimed before any bytes land: the loser of a
        // concurrent create races on the unique constraint here and never
        // touches the winner's artifact.
        if is_new {
            self.records.insert(&record)?;
        } else {
            self.records.update(&record)?;
        }

        self.files.write_chunk(&record.file_path, payload, mode)?;
        debug!(
            "Wrote {} bytes to {} (mode {:?}, eof {})",
            payload.len(),
            record.file_path,
            mode,
            meta.eof
        );

        if !meta.eof {
            return Ok(reply(StatusCode::CREATED, meta, MSG_IN_PROGRESS, None));
        }

        // End of stream: re-digest the assembled artifact.
        let digest = {
            let mut reader = self.files.reader(&record.file_path)?;
            checksum::digest_reader(reader.as_mut())?
        };
        if digest != record.checksum {
            warn!(
                "Checksum mismatch for {}: expected {}, got {}",
                record.id, record.checksum, digest
            );
            self.files.delete(&record.file_path)?;
            record.file_path.clear();
            record.eof = false;
            record.status = Status::Error;
            record.updated_at = Utc::now();
            self.records.update(&record)?;
            return Ok(reply(StatusCode::BAD_REQUEST, meta, MSG_CHECKSUM_MISMATCH, None));
        }

        for hook in &self.hooks {
            hook.on_complete(&record);
        }

        if self.upload.optimize {
            // Optimization failure never fails a verified upload.
            if let Err(e) = self.optimizers.run(&mut record, self.files.as_ref()) {
                warn!("Optimization failed for {}: {}", record.id, e);
            }
        }

        record.status = Status::Completed;
        record.eof = true;
        record.updated_at = Utc::now();
        self.records.update(&record)?;
        info!("Upload {} completed at {}", record.id, record.file_path);

        let url = self.public_url(&record.file_path);
        Ok(reply(StatusCode::CREATED, meta, MSG_COMPLETE, Some(url)))
    }

    /// Ownership rule shared by update, read, and delete: the owning user or
    /// a superuser. Anonymous records are owned by the anonymous caller, so
    /// named users other than a superuser never touch them.
    fn can_touch(&self, ctx: &RequestContext, record: &UploadRecord) -> bool {
        ctx.is_superuser() || record.user.as_deref() == ctx.user_key()
    }

    fn public_url(&self, logical: &str) -> String {
        format!("{}/{}", self.media_url.trim_end_matches('/'), logical)
    }
}

fn reply(status: StatusCode, meta: &ChunkMetadata, message: &str, url: Option<String>) -> ChunkOutcome {
    ChunkOutcome {
        status,
        body: ReplyBody::new(meta, message, url),
    }
}
