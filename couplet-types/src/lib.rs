//! Shared data model for the Couplet core.
//!
//! Plain serde types exchanged between the encryption layer and the
//! surrounding application. Ids are strings minted by the persistence
//! collaborator; the core never parses them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mints a random id for records the core creates itself (entries, archives).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A diary entry. When `is_encrypted` is true, `content` holds a serialized
/// encryption envelope instead of readable text, and each media attachment's
/// sensitive fields are enveloped the same way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: String,
    pub couple_id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
    #[serde(default)]
    pub is_encrypted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Media attached to a diary entry.
///
/// The binary itself lives in object storage and is not re-encrypted by this
/// layer; only `file_name` and `source_url` are treated as sensitive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub id: String,
    pub kind: MediaKind,
    pub file_name: String,
    pub source_url: String,
    #[serde(default)]
    pub is_encrypted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
}

/// Author-reported mood on an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Loved,
    Excited,
    Content,
    Neutral,
    Sad,
    Stressed,
    Angry,
}

/// A planned date. Plans carry no encrypted fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatePlan {
    pub id: String,
    pub couple_id: String,
    pub created_by: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
}

/// A shared memory (photo + caption timeline item).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub couple_id: String,
    pub created_by: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub taken_at: DateTime<Utc>,
}

/// The relationship record the breakup flow flips.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoupleRecord {
    pub id: String,
    pub user_id: String,
    pub partner_id: String,
    pub status: CoupleStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoupleStatus {
    Active,
    Ended,
}

/// Profile fields safe to include in an export. Auth and contact fields
/// never pass through the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// An encrypted breakup archive with a time-boxed recovery window.
///
/// `payload.encrypted_data` is an envelope JSON string the persistence layer
/// stores verbatim; once the archive password is gone it is unrecoverable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakupArchive {
    pub id: String,
    pub couple_id: String,
    pub user_id: String,
    pub archived_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
    pub recovery_expires_at: DateTime<Utc>,
    pub is_recoverable: bool,
    pub payload: ArchivePayload,
}

/// The opaque archive contents plus non-secret recovery aids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivePayload {
    /// Envelope JSON of the full export bundle, keyed by the archive password.
    pub encrypted_data: String,
    /// Hex SHA-256 of the serialized bundle before encryption.
    pub checksum: String,
    /// Coarse password-shape descriptor. Never the password itself.
    pub password_hint: String,
    /// Archive password encrypted under the archive-id-scoped recovery key;
    /// present only when recovery was allowed.
    #[serde(default)]
    pub protected_password: Option<String>,
}

/// Which use a symmetric key is scoped to. Keys never cross purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPurpose {
    Diary,
    Media,
    Backup,
}

impl KeyPurpose {
    pub const ALL: [KeyPurpose; 3] = [KeyPurpose::Diary, KeyPurpose::Media, KeyPurpose::Backup];

    /// Stable label used in derivation inputs and cache keys.
    pub fn label(&self) -> &'static str {
        match self {
            KeyPurpose::Diary => "diary",
            KeyPurpose::Media => "media",
            KeyPurpose::Backup => "backup",
        }
    }
}

impl std::fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Non-secret record describing one purpose key. Persisted independently of
/// the key itself; answers "is encryption enabled" without touching secrets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub key_id: String,
    pub couple_id: String,
    pub purpose: KeyPurpose,
    pub algorithm: String,
    /// Argon2id salt when the key was passphrase-derived; absent for random keys.
    #[serde(default)]
    pub salt_b64: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// Monotonic, incremented on each rotation.
    pub version: u32,
}
