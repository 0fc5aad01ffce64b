//! Durable upload records and the metadata store contract.
//!
//! One record per logical file, uniquely keyed by (user, checksum). The
//! record carries everything the protocol needs to resume, verify, and serve
//! an upload; the bytes themselves live in the file store.

pub mod mock_store;
pub mod sqlite_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RecordError;

/// Upload lifecycle status. Advances Pending -> Processing on any chunk
/// write, then Completed on verification or Error on failure. An Error
/// record is re-entered by a fresh resumed upload like a Pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Processing => "PROCESSING",
            Status::Completed => "COMPLETED",
            Status::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Status::Pending),
            "PROCESSING" => Some(Status::Processing),
            "COMPLETED" => Some(Status::Completed),
            "ERROR" => Some(Status::Error),
            _ => None,
        }
    }
}

/// Content classification derived from the file extension. Drives the
/// accepted-MIME-pattern lookup and the optimizer dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Archive,
    Audio,
    Binary,
    Document,
    Font,
    HyperText,
    Image,
    Json,
    MicrosoftWord,
    MicrosoftPowerPoint,
    MicrosoftExcel,
    Separated,
    Text,
    Video,
    Xml,
    Unknown,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Archive => "ARCHIVE",
            ContentKind::Audio => "AUDIO",
            ContentKind::Binary => "BINARY",
            ContentKind::Document => "DOCUMENT",
            ContentKind::Font => "FONT",
            ContentKind::HyperText => "HYPERTEXT",
            ContentKind::Image => "IMAGE",
            ContentKind::Json => "JSON",
            ContentKind::MicrosoftWord => "MICROSOFT_WORD",
            ContentKind::MicrosoftPowerPoint => "MICROSOFT_POWERPOINT",
            ContentKind::MicrosoftExcel => "MICROSOFT_EXCEL",
            ContentKind::Separated => "SEPARATED",
            ContentKind::Text => "TEXT",
            ContentKind::Video => "VIDEO",
            ContentKind::Xml => "XML",
            ContentKind::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ARCHIVE" => Some(ContentKind::Archive),
            "AUDIO" => Some(ContentKind::Audio),
            "BINARY" => Some(ContentKind::Binary),
            "DOCUMENT" => Some(ContentKind::Document),
            "FONT" => Some(ContentKind::Font),
            "HYPERTEXT" => Some(ContentKind::HyperText),
            "IMAGE" => Some(ContentKind::Image),
            "JSON" => Some(ContentKind::Json),
            "MICROSOFT_WORD" => Some(ContentKind::MicrosoftWord),
            "MICROSOFT_POWERPOINT" => Some(ContentKind::MicrosoftPowerPoint),
            "MICROSOFT_EXCEL" => Some(ContentKind::MicrosoftExcel),
            "SEPARATED" => Some(ContentKind::Separated),
            "TEXT" => Some(ContentKind::Text),
            "VIDEO" => Some(ContentKind::Video),
            "XML" => Some(ContentKind::Xml),
            "UNKNOWN" => Some(ContentKind::Unknown),
            _ => None,
        }
    }

    /// Classify a file extension (dot included, any case).
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.to_ascii_lowercase();
        let table: &[(ContentKind, &[&str])] = &[
            (
                ContentKind::Archive,
                &[".bz", ".bz2", ".gz", ".jar", ".rar", ".tar", ".zip", ".7z"],
            ),
            (
                ContentKind::Audio,
                &[
                    ".aac", ".mid", ".midi", ".mp3", ".oga", ".opus", ".wav", ".weba", ".3gp",
                    ".3g2",
                ],
            ),
            (ContentKind::Binary, &[".bin"]),
            (
                ContentKind::Document,
                &[".abw", ".arc", ".odp", ".odt", ".pdf", ".md"],
            ),
            (
                ContentKind::Font,
                &[".eot", ".otf", ".ttf", ".woff", ".woff2"],
            ),
            (ContentKind::HyperText, &[".html", ".htm"]),
            (
                ContentKind::Image,
                &[
                    ".apng", ".avif", ".bmp", ".gif", ".ico", ".jpeg", ".jpg", ".png", ".svg",
                    ".tif", ".tiff", ".webp",
                ],
            ),
            (ContentKind::Json, &[".json", ".jsonld"]),
            (ContentKind::MicrosoftWord, &[".doc", ".docx"]),
            (ContentKind::MicrosoftPowerPoint, &[".ppt", ".pptx"]),
            (ContentKind::MicrosoftExcel, &[".xls", ".xlsx"]),
            (ContentKind::Separated, &[".csv", ".tsv"]),
            (ContentKind::Text, &[".txt"]),
            (
                ContentKind::Video,
                &[
                    ".avi", ".mp4", ".mpeg", ".ogg", ".mp2t", ".webm", ".3gpp", ".3gpp2",
                ],
            ),
            (ContentKind::Xml, &[".xml"]),
        ];
        for (kind, extensions) in table {
            if extensions.contains(&ext.as_str()) {
                return *kind;
            }
        }
        ContentKind::Unknown
    }
}

/// One durable row per logical uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    /// Logical path of the backing artifact; empty until the first chunk.
    pub file_path: String,
    pub status: Status,
    pub kind: ContentKind,
    pub checksum: String,
    /// Set to true only after end-of-stream checksum verification succeeds.
    pub eof: bool,
    /// Owning user key; None for anonymous uploads.
    pub user: Option<String>,
    /// Free-form metadata blob, persisted when the config enables it.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn new(id: Uuid, checksum: &str, user: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id,
            file_path: String::new(),
            status: Status::Pending,
            kind: ContentKind::Unknown,
            checksum: checksum.to_string(),
            eof: false,
            user: user.map(str::to_string),
            metadata: serde_json::Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// External metadata store contract. Cross-request coordination relies on the
/// backing store enforcing the (user, checksum) unique constraint: the loser
/// of a concurrent insert gets `RecordError::Duplicate`.
pub trait RecordStore: Send + Sync {
    fn insert(&self, record: &UploadRecord) -> Result<(), RecordError>;
    fn update(&self, record: &UploadRecord) -> Result<(), RecordError>;
    fn find_by_id(&self, id: &Uuid) -> Result<Option<UploadRecord>, RecordError>;
    fn find(&self, user: Option<&str>, checksum: &str) -> Result<Option<UploadRecord>, RecordError>;
    fn delete(&self, id: &Uuid) -> Result<(), RecordError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(ContentKind::from_extension(".PNG"), ContentKind::Image);
        assert_eq!(ContentKind::from_extension(".tar"), ContentKind::Archive);
        assert_eq!(ContentKind::from_extension(".docx"), ContentKind::MicrosoftWord);
        assert_eq!(ContentKind::from_extension(".xyz"), ContentKind::Unknown);
        assert_eq!(ContentKind::from_extension(""), ContentKind::Unknown);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            Status::Pending,
            Status::Processing,
            Status::Completed,
            Status::Error,
        ] {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert_eq!(Status::parse("bogus"), None);
    }

    #[test]
    fn test_record_serializes_to_json() {
        let record = UploadRecord::new(Uuid::nil(), "abc123", Some("alice"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["user"], "alice");

        let back: UploadRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.checksum, record.checksum);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ContentKind::Image,
            ContentKind::MicrosoftPowerPoint,
            ContentKind::Unknown,
        ] {
            assert_eq!(ContentKind::parse(kind.as_str()), Some(kind));
        }
    }
}
