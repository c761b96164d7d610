//! In-memory store backing tests and the desktop shell.

use crate::error::{StoreError, StoreResult};
use crate::{ArchiveStore, CoupleStore, EntryStore, KeyMetadataStore, NotificationSink};
use async_trait::async_trait;
use couplet_types::{
    BreakupArchive, CoupleRecord, CoupleStatus, DatePlan, DiaryEntry, KeyMetadata, KeyPurpose,
    Memory, UserProfile,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory implementation of every collaborator trait.
///
/// State lives behind `Arc<RwLock<_>>` so clones share one backing store.
/// A write-op counter lets tests assert that a flow failed before reaching
/// persistence. `fail_notifications` simulates an unreachable notification
/// service for best-effort delivery tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    write_ops: Arc<AtomicUsize>,
    data_reads: Arc<AtomicUsize>,
    fail_notifications: Arc<AtomicUsize>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, DiaryEntry>,
    couples: HashMap<String, CoupleRecord>,
    plans: HashMap<String, Vec<DatePlan>>,
    memories: HashMap<String, Vec<Memory>>,
    profiles: HashMap<String, Vec<UserProfile>>,
    archives: HashMap<String, BreakupArchive>,
    key_metadata: HashMap<(String, KeyPurpose), KeyMetadata>,
    restricted: std::collections::HashSet<String>,
    notifications: Vec<(String, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating store calls observed so far.
    pub fn write_op_count(&self) -> usize {
        self.write_ops.load(Ordering::SeqCst)
    }

    /// Number of entry/plan/memory/profile reads observed so far. Key
    /// metadata reads are not counted — tests use this to assert a flow
    /// failed before touching relationship data.
    pub fn data_read_count(&self) -> usize {
        self.data_reads.load(Ordering::SeqCst)
    }

    /// Makes every subsequent `notify_breakup` fail.
    pub fn break_notifications(&self) {
        self.fail_notifications.store(1, Ordering::SeqCst);
    }

    /// Breakup notifications delivered so far, as `(couple_id, initiated_by)`.
    pub async fn delivered_notifications(&self) -> Vec<(String, String)> {
        self.inner.read().await.notifications.clone()
    }

    /// Seeds a couple record with two profiles.
    pub async fn seed_couple(&self, record: CoupleRecord, profiles: Vec<UserProfile>) {
        let mut inner = self.inner.write().await;
        inner.profiles.insert(record.id.clone(), profiles);
        inner.couples.insert(record.id.clone(), record);
    }

    pub async fn seed_plan(&self, plan: DatePlan) {
        let mut inner = self.inner.write().await;
        inner.plans.entry(plan.couple_id.clone()).or_default().push(plan);
    }

    pub async fn seed_memory(&self, memory: Memory) {
        let mut inner = self.inner.write().await;
        inner
            .memories
            .entry(memory.couple_id.clone())
            .or_default()
            .push(memory);
    }

    /// Whether a couple's shared data is currently access-restricted.
    pub async fn is_restricted(&self, couple_id: &str) -> bool {
        self.inner.read().await.restricted.contains(couple_id)
    }

    /// Direct archive mutation for recovery-window tests.
    pub async fn patch_archive<F>(&self, id: &str, patch: F) -> bool
    where
        F: FnOnce(&mut BreakupArchive),
    {
        let mut inner = self.inner.write().await;
        match inner.archives.get_mut(id) {
            Some(archive) => {
                patch(archive);
                true
            }
            None => false,
        }
    }

    fn record_write(&self) {
        self.write_ops.fetch_add(1, Ordering::SeqCst);
    }

    fn record_read(&self) {
        self.data_reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn insert_entry(&self, entry: &DiaryEntry) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        if inner.entries.contains_key(&entry.id) {
            return Err(StoreError::Conflict(format!("entry {} exists", entry.id)));
        }
        inner.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn fetch_entry(&self, id: &str) -> StoreResult<Option<DiaryEntry>> {
        self.record_read();
        Ok(self.inner.read().await.entries.get(id).cloned())
    }

    async fn fetch_entries(
        &self,
        couple_id: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<DiaryEntry>> {
        self.record_read();
        let inner = self.inner.read().await;
        let mut entries: Vec<DiaryEntry> = inner
            .entries
            .values()
            .filter(|e| e.couple_id == couple_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn update_entry(&self, entry: &DiaryEntry) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        if !inner.entries.contains_key(&entry.id) {
            return Err(StoreError::NotFound(format!("entry {}", entry.id)));
        }
        inner.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn delete_entry(&self, id: &str) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        inner
            .entries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("entry {id}")))
    }
}

#[async_trait]
impl CoupleStore for MemoryStore {
    async fn fetch_couple(&self, couple_id: &str) -> StoreResult<Option<CoupleRecord>> {
        self.record_read();
        Ok(self.inner.read().await.couples.get(couple_id).cloned())
    }

    async fn set_couple_status(&self, couple_id: &str, status: CoupleStatus) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        let record = inner
            .couples
            .get_mut(couple_id)
            .ok_or_else(|| StoreError::NotFound(format!("couple {couple_id}")))?;
        record.status = status;
        record.ended_at = match status {
            CoupleStatus::Active => None,
            _ => Some(chrono::Utc::now()),
        };
        Ok(())
    }

    async fn fetch_plans(&self, couple_id: &str) -> StoreResult<Vec<DatePlan>> {
        self.record_read();
        Ok(self
            .inner
            .read()
            .await
            .plans
            .get(couple_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_memories(&self, couple_id: &str) -> StoreResult<Vec<Memory>> {
        self.record_read();
        Ok(self
            .inner
            .read()
            .await
            .memories
            .get(couple_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_profiles(&self, couple_id: &str) -> StoreResult<Vec<UserProfile>> {
        self.record_read();
        Ok(self
            .inner
            .read()
            .await
            .profiles
            .get(couple_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn restore_data(
        &self,
        couple_id: &str,
        entries: &[DiaryEntry],
        plans: &[DatePlan],
        memories: &[Memory],
    ) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        inner.entries.retain(|_, e| e.couple_id != couple_id);
        for entry in entries {
            inner.entries.insert(entry.id.clone(), entry.clone());
        }
        inner.plans.insert(couple_id.to_string(), plans.to_vec());
        inner
            .memories
            .insert(couple_id.to_string(), memories.to_vec());
        Ok(())
    }

    async fn delete_shared_data(&self, couple_id: &str) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        inner.entries.retain(|_, e| e.couple_id != couple_id);
        inner.plans.remove(couple_id);
        inner.memories.remove(couple_id);
        Ok(())
    }

    async fn set_access_restricted(&self, couple_id: &str, restricted: bool) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        if restricted {
            inner.restricted.insert(couple_id.to_string());
        } else {
            inner.restricted.remove(couple_id);
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn insert_archive(&self, archive: &BreakupArchive) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        if inner.archives.contains_key(&archive.id) {
            return Err(StoreError::Conflict(format!("archive {} exists", archive.id)));
        }
        inner.archives.insert(archive.id.clone(), archive.clone());
        Ok(())
    }

    async fn fetch_archive(&self, id: &str) -> StoreResult<Option<BreakupArchive>> {
        self.record_read();
        Ok(self.inner.read().await.archives.get(id).cloned())
    }

    async fn update_archive(&self, archive: &BreakupArchive) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        if !inner.archives.contains_key(&archive.id) {
            return Err(StoreError::NotFound(format!("archive {}", archive.id)));
        }
        inner.archives.insert(archive.id.clone(), archive.clone());
        Ok(())
    }

    async fn delete_archive(&self, id: &str) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        inner
            .archives
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("archive {id}")))
    }
}

#[async_trait]
impl KeyMetadataStore for MemoryStore {
    async fn upsert_metadata(&self, metadata: &KeyMetadata) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        inner.key_metadata.insert(
            (metadata.couple_id.clone(), metadata.purpose),
            metadata.clone(),
        );
        Ok(())
    }

    async fn fetch_metadata(
        &self,
        couple_id: &str,
        purpose: KeyPurpose,
    ) -> StoreResult<Option<KeyMetadata>> {
        Ok(self
            .inner
            .read()
            .await
            .key_metadata
            .get(&(couple_id.to_string(), purpose))
            .cloned())
    }

    async fn fetch_all_metadata(&self, couple_id: &str) -> StoreResult<Vec<KeyMetadata>> {
        let inner = self.inner.read().await;
        let mut all: Vec<KeyMetadata> = inner
            .key_metadata
            .values()
            .filter(|m| m.couple_id == couple_id)
            .cloned()
            .collect();
        all.sort_by_key(|m| m.purpose.label());
        Ok(all)
    }

    async fn delete_metadata(&self, couple_id: &str) -> StoreResult<()> {
        self.record_write();
        let mut inner = self.inner.write().await;
        inner.key_metadata.retain(|(cid, _), _| cid != couple_id);
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for MemoryStore {
    async fn notify_breakup(&self, couple_id: &str, initiated_by: &str) -> StoreResult<()> {
        if self.fail_notifications.load(Ordering::SeqCst) != 0 {
            return Err(StoreError::Backend("notification service unreachable".into()));
        }
        let mut inner = self.inner.write().await;
        inner
            .notifications
            .push((couple_id.to_string(), initiated_by.to_string()));
        Ok(())
    }
}
