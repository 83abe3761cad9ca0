//! Represents an uploaded audio asset and its processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Processing lifecycle of an upload.
///
/// Legal transitions: `Pending -> Processing -> {Completed, Error}`.
/// `Completed` and `Error` are terminal for a given upload; chord
/// regeneration replaces the chord artifact without touching this status.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One isolated component of a separated mix, as produced by the
/// separation tool. `All` means the combined stem mix.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Other,
    All,
}

impl Stem {
    /// Stable lowercase name, matching stem file names on disk
    /// (`vocals.wav`, `bass.wav`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
            Stem::All => "all",
        }
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vocals" => Ok(Stem::Vocals),
            "drums" => Ok(Stem::Drums),
            "bass" => Ok(Stem::Bass),
            "other" => Ok(Stem::Other),
            "all" => Ok(Stem::All),
            other => Err(format!(
                "invalid stem `{}`, expected one of vocals, drums, bass, other, all",
                other
            )),
        }
    }
}

/// A single user-submitted audio asset plus its processing metadata.
///
/// Provenance columns (`original_filename`, `saved_filename`,
/// `storage_path`, `size_bytes`, `etag`) are written once at creation and
/// never mutated. `status` and `result_path` are owned by the processing
/// state machine; `result_path` is non-null iff `status == Completed`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadRecord {
    /// Internal UUID, assigned at creation.
    pub id: Uuid,

    /// The uploading principal. Immutable after creation; owner deletion
    /// cascades to the owned rows.
    pub owner_id: Uuid,

    /// Filename as submitted by the client.
    pub original_filename: String,

    /// Unique on-disk filename chosen at save time.
    pub saved_filename: String,

    /// Absolute or root-relative path of the stored raw file.
    pub storage_path: String,

    /// Raw file size in bytes.
    pub size_bytes: i64,

    /// MD5 of the raw bytes, computed while streaming to disk.
    pub etag: Option<String>,

    /// Display metadata, editable by the owner or an administrator.
    pub artist: String,

    /// Display metadata, editable by the owner or an administrator.
    pub title: String,

    /// Current lifecycle state. Mutated only by the state machine.
    pub status: ProcessingStatus,

    /// Directory of separated stems and chord artifact, set exactly once
    /// on the `Completed` transition.
    pub result_path: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
