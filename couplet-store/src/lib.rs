//! Persistence and notification collaborator contracts.
//!
//! The crypto core never talks to a database or API directly — it is handed
//! implementations of these traits by the composition root. Encrypted fields
//! (`DiaryEntry::content`, `ArchivePayload::encrypted_data`) are opaque blobs
//! to every implementation: stored and returned verbatim, never parsed or
//! indexed.
//!
//! `MemoryStore` implements the full surface for tests and the desktop shell.

mod error;
mod memory;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

use async_trait::async_trait;
use couplet_types::{
    BreakupArchive, CoupleRecord, CoupleStatus, DatePlan, DiaryEntry, KeyMetadata, KeyPurpose,
    Memory, UserProfile,
};

/// Diary entry persistence.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn insert_entry(&self, entry: &DiaryEntry) -> StoreResult<()>;

    async fn fetch_entry(&self, id: &str) -> StoreResult<Option<DiaryEntry>>;

    /// Entries for a couple, newest first, optionally capped.
    async fn fetch_entries(
        &self,
        couple_id: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<DiaryEntry>>;

    async fn update_entry(&self, entry: &DiaryEntry) -> StoreResult<()>;

    async fn delete_entry(&self, id: &str) -> StoreResult<()>;
}

/// Relationship data owned by the surrounding application: the couple
/// record, plans, memories, and profile fields safe for export.
#[async_trait]
pub trait CoupleStore: Send + Sync {
    async fn fetch_couple(&self, couple_id: &str) -> StoreResult<Option<CoupleRecord>>;

    async fn set_couple_status(&self, couple_id: &str, status: CoupleStatus) -> StoreResult<()>;

    async fn fetch_plans(&self, couple_id: &str) -> StoreResult<Vec<DatePlan>>;

    async fn fetch_memories(&self, couple_id: &str) -> StoreResult<Vec<Memory>>;

    async fn fetch_profiles(&self, couple_id: &str) -> StoreResult<Vec<UserProfile>>;

    /// Replaces a couple's entries/plans/memories wholesale (archive recovery).
    async fn restore_data(
        &self,
        couple_id: &str,
        entries: &[DiaryEntry],
        plans: &[DatePlan],
        memories: &[Memory],
    ) -> StoreResult<()>;

    /// Deletes every shared record for the couple.
    async fn delete_shared_data(&self, couple_id: &str) -> StoreResult<()>;

    /// Marks a couple's shared data read-restricted (or lifts the
    /// restriction). Data stays in place, the application stops serving it.
    async fn set_access_restricted(&self, couple_id: &str, restricted: bool) -> StoreResult<()>;
}

/// Breakup archive persistence.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn insert_archive(&self, archive: &BreakupArchive) -> StoreResult<()>;

    async fn fetch_archive(&self, id: &str) -> StoreResult<Option<BreakupArchive>>;

    async fn update_archive(&self, archive: &BreakupArchive) -> StoreResult<()>;

    async fn delete_archive(&self, id: &str) -> StoreResult<()>;
}

/// Durable storage for non-secret key metadata. Raw key bytes never pass
/// through this trait.
#[async_trait]
pub trait KeyMetadataStore: Send + Sync {
    async fn upsert_metadata(&self, metadata: &KeyMetadata) -> StoreResult<()>;

    async fn fetch_metadata(
        &self,
        couple_id: &str,
        purpose: KeyPurpose,
    ) -> StoreResult<Option<KeyMetadata>>;

    async fn fetch_all_metadata(&self, couple_id: &str) -> StoreResult<Vec<KeyMetadata>>;

    async fn delete_metadata(&self, couple_id: &str) -> StoreResult<()>;
}

/// Best-effort partner notification. Callers log failures and move on; the
/// breakup flow's data-safety guarantees never depend on delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_breakup(&self, couple_id: &str, initiated_by: &str) -> StoreResult<()>;
}
