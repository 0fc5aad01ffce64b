//! SQLite implementation of the record store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::config::MetadataConfig;
use crate::error::RecordError;
use crate::records::{ContentKind, RecordStore, Status, UploadRecord};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS upload_records (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    kind TEXT NOT NULL,
    checksum TEXT NOT NULL,
    eof INTEGER NOT NULL DEFAULT 0,
    user TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(user, checksum)
)";

const CHECKSUM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS upload_records_checksum_idx ON upload_records(checksum)";

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn new(config: &MetadataConfig) -> Result<Self, RecordError> {
        let db_path = Path::new(&config.db_path);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RecordError::Database(format!("cannot create {:?}: {}", parent, e)))?;
        }
        let conn = Connection::open(db_path).map_err(db_error)?;
        info!("Using SQLite record store at {}", config.db_path);
        Self::with_connection(conn)
    }

    /// Private database for tests.
    pub fn open_in_memory() -> Result<Self, RecordError> {
        Self::with_connection(Connection::open_in_memory().map_err(db_error)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RecordError> {
        conn.execute(SCHEMA, []).map_err(db_error)?;
        conn.execute(CHECKSUM_INDEX, []).map_err(db_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn db_error(e: rusqlite::Error) -> RecordError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            RecordError::Duplicate
        }
        other => RecordError::Database(other.to_string()),
    }
}

fn conversion_error<E>(e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_timestamp(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(conversion_error)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<UploadRecord> {
    let id: String = row.get("id")?;
    let status: String = row.get("status")?;
    let kind: String = row.get("kind")?;
    let metadata: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(UploadRecord {
        id: Uuid::parse_str(&id).map_err(conversion_error)?,
        file_path: row.get("file_path")?,
        status: Status::parse(&status).unwrap_or(Status::Pending),
        kind: ContentKind::parse(&kind).unwrap_or(ContentKind::Unknown),
        checksum: row.get("checksum")?,
        eof: row.get("eof")?,
        user: row.get("user")?,
        metadata: serde_json::from_str(&metadata).map_err(conversion_error)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

impl RecordStore for SqliteRecordStore {
    fn insert(&self, record: &UploadRecord) -> Result<(), RecordError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO upload_records
                (id, file_path, status, kind, checksum, eof, user, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id.to_string(),
                record.file_path,
                record.status.as_str(),
                record.kind.as_str(),
                record.checksum,
                record.eof,
                record.user,
                record.metadata.to_string(),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_error)?;
        Ok(())
    }

    fn update(&self, record: &UploadRecord) -> Result<(), RecordError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute(
                "UPDATE upload_records
                 SET file_path = ?2, status = ?3, kind = ?4, checksum = ?5, eof = ?6,
                     user = ?7, metadata = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    record.id.to_string(),
                    record.file_path,
                    record.status.as_str(),
                    record.kind.as_str(),
                    record.checksum,
                    record.eof,
                    record.user,
                    record.metadata.to_string(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(db_error)?;
        if affected == 0 {
            return Err(RecordError::NotFound);
        }
        Ok(())
    }

    fn find_by_id(&self, id: &Uuid) -> Result<Option<UploadRecord>, RecordError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM upload_records WHERE id = ?1",
            params![id.to_string()],
            row_to_record,
        )
        .optional()
        .map_err(db_error)
    }

    fn find(&self, user: Option<&str>, checksum: &str) -> Result<Option<UploadRecord>, RecordError> {
        let conn = self.conn.lock().unwrap();
        // `IS` gives NULL-safe matching for anonymous owners.
        conn.query_row(
            "SELECT * FROM upload_records WHERE user IS ?1 AND checksum = ?2",
            params![user, checksum],
            row_to_record,
        )
        .optional()
        .map_err(db_error)
    }

    fn delete(&self, id: &Uuid) -> Result<(), RecordError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM upload_records WHERE id = ?1",
            params![id.to_string()],
        )
        .map_err(db_error)?;
        Ok(())
    }
}
