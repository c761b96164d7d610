//! The portable export bundle and its on-disk wire format.

use chrono::{DateTime, Utc};
use couplet_types::{DatePlan, DiaryEntry, Memory, UserProfile};
use serde::{Deserialize, Serialize};

/// Bundle schema version. Importers reject versions they do not know.
pub const FORMAT_VERSION: u32 = 1;

/// Placeholder substituted for media URLs when media is excluded.
pub const MEDIA_OMITTED: &str = "[media omitted]";

/// A serialized snapshot of one couple's data. Entry content is readable
/// here — when export encryption is requested the whole serialized bundle
/// becomes the plaintext of a single password-derived envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub metadata: ExportMetadata,
    pub profiles: Vec<UserProfile>,
    pub entries: Vec<DiaryEntry>,
    pub plans: Vec<DatePlan>,
    pub memories: Vec<Memory>,
    pub statistics: ExportStatistics,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub exported_at: DateTime<Utc>,
    pub exported_by: String,
    pub couple_id: String,
    pub format_version: u32,
    pub encrypted: bool,
}

/// Derived statistics computed at export time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportStatistics {
    pub entry_count: usize,
    pub plan_count: usize,
    pub memory_count: usize,
    #[serde(default)]
    pub first_entry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_entry_at: Option<DateTime<Utc>>,
    pub days_together: i64,
}

/// The finished export: serialized payload plus integrity metadata. The
/// payload string is exactly what lands in the download file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportOutput {
    /// Plain bundle JSON, or envelope JSON when encryption was requested.
    pub payload: String,
    /// Hex SHA-256 over the payload bytes, encrypted or not.
    pub checksum: String,
    pub encrypted: bool,
    /// `couples-diary-export-{YYYY-MM-DD}.json`
    pub file_name: String,
}

/// What to include in an export. Defaults are fixed here, at construction.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// When false, diary entries are restricted to those the exporting user
    /// authored.
    pub include_partner_data: bool,
    /// When false, media URLs are replaced with a placeholder.
    pub include_media: bool,
    /// Inclusive bounds on entry creation time.
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub encrypt_export: bool,
    /// Mandatory when `encrypt_export` is set.
    pub export_password: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_partner_data: true,
            include_media: true,
            date_range: None,
            encrypt_export: false,
            export_password: None,
        }
    }
}
