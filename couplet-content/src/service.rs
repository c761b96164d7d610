//! Encrypt-on-write, decrypt-on-read service over the entry store.

use crate::error::{ContentError, ContentResult};
use chrono::Utc;
use couplet_crypto::{Envelope, SymmetricKey, decrypt_string, encrypt_string};
use couplet_keys::{KeyManager, PurposeKeySet};
use couplet_store::EntryStore;
use couplet_types::{DiaryEntry, MediaAttachment, Mood, new_id};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fields an update may touch. Absent fields are left exactly as stored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntryUpdate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub media: Option<Vec<MediaAttachment>>,
}

/// Per-item outcome collection for the re-encryption sweep. The sweep never
/// aborts on a bad record; failures are reported here instead.
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    /// Entries successfully migrated to the new key.
    pub processed: usize,
    /// Entries stored as plaintext, which need no migration.
    pub skipped: usize,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Serialize)]
pub struct SweepFailure {
    pub entry_id: String,
    pub reason: String,
}

impl SweepReport {
    /// Entries still on the old key. Feed this to `KeyRotation::finish`.
    pub fn unprocessed(&self) -> usize {
        self.failures.len()
    }
}

/// Encrypts diary entry bodies and media metadata with keys from the
/// manager; hands opaque envelope strings to the injected store.
pub struct SecureContentService {
    keys: Arc<KeyManager>,
    entries: Arc<dyn EntryStore>,
}

impl SecureContentService {
    pub fn new(keys: Arc<KeyManager>, entries: Arc<dyn EntryStore>) -> Self {
        Self { keys, entries }
    }

    /// Creates an entry, encrypting the body and media metadata before
    /// anything is persisted. Returns the decrypted view — callers never
    /// decrypt what they just wrote.
    pub async fn create_secure_entry(
        &self,
        couple_id: &str,
        author_id: &str,
        content: &str,
        mood: Option<Mood>,
        media: Vec<MediaAttachment>,
    ) -> ContentResult<DiaryEntry> {
        let diary_key = self
            .keys
            .get_diary_key(couple_id)
            .await?
            .ok_or_else(|| ContentError::EncryptionUnavailable(couple_id.to_string()))?;

        let media_key = if media.is_empty() {
            None
        } else {
            Some(
                self.keys
                    .get_media_key(couple_id)
                    .await?
                    .ok_or_else(|| ContentError::EncryptionUnavailable(couple_id.to_string()))?,
            )
        };

        let sealed_media = match &media_key {
            Some(key) => media
                .iter()
                .map(|item| seal_media(item, key))
                .collect::<ContentResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let now = Utc::now();
        let stored = DiaryEntry {
            id: new_id(),
            couple_id: couple_id.to_string(),
            author_id: author_id.to_string(),
            content: encrypt_string(&diary_key, content)?.to_json()?,
            mood,
            media: sealed_media,
            is_encrypted: true,
            created_at: now,
            updated_at: now,
        };

        self.entries.insert_entry(&stored).await?;
        debug!(entry_id = %stored.id, %couple_id, "created encrypted entry");

        let mut view = stored;
        view.content = content.to_string();
        view.media = media;
        view.is_encrypted = false;
        Ok(view)
    }

    /// Fetches entries newest-first, decrypting each. Entries whose key is
    /// gone or whose envelope fails authentication come back in their raw
    /// encrypted form — the UI marks them undecryptable, nothing is dropped.
    pub async fn get_secure_entries(
        &self,
        couple_id: &str,
        limit: Option<usize>,
    ) -> ContentResult<Vec<DiaryEntry>> {
        let diary_key = self.keys.get_diary_key(couple_id).await?;
        let media_key = self.keys.get_media_key(couple_id).await?;

        let raw = self.entries.fetch_entries(couple_id, limit).await?;
        let mut out = Vec::with_capacity(raw.len());
        for entry in raw {
            out.push(self.open_entry(entry, diary_key.as_ref(), media_key.as_ref()));
        }
        Ok(out)
    }

    /// Re-encrypts the fields present in `updates` and persists; everything
    /// else on the stored entry stays byte-identical.
    pub async fn update_secure_entry(
        &self,
        id: &str,
        couple_id: &str,
        updates: EntryUpdate,
    ) -> ContentResult<DiaryEntry> {
        let mut stored = self
            .entries
            .fetch_entry(id)
            .await?
            .filter(|e| e.couple_id == couple_id)
            .ok_or_else(|| ContentError::NotFound(id.to_string()))?;

        if let Some(content) = &updates.content {
            let diary_key = self
                .keys
                .get_diary_key(couple_id)
                .await?
                .ok_or_else(|| ContentError::EncryptionUnavailable(couple_id.to_string()))?;
            stored.content = encrypt_string(&diary_key, content)?.to_json()?;
            stored.is_encrypted = true;
        }

        if let Some(mood) = updates.mood {
            stored.mood = Some(mood);
        }

        if let Some(media) = &updates.media {
            let media_key = self
                .keys
                .get_media_key(couple_id)
                .await?
                .ok_or_else(|| ContentError::EncryptionUnavailable(couple_id.to_string()))?;
            stored.media = media
                .iter()
                .map(|item| seal_media(item, &media_key))
                .collect::<ContentResult<Vec<_>>>()?;
        }

        stored.updated_at = Utc::now();
        self.entries.update_entry(&stored).await?;
        debug!(entry_id = %id, %couple_id, "updated entry");

        let diary_key = self.keys.get_diary_key(couple_id).await?;
        let media_key = self.keys.get_media_key(couple_id).await?;
        Ok(self.open_entry(stored, diary_key.as_ref(), media_key.as_ref()))
    }

    /// Deletes an entry. Storage passthrough — nothing cryptographic.
    pub async fn delete_secure_entry(&self, id: &str, couple_id: &str) -> ContentResult<()> {
        let exists = self
            .entries
            .fetch_entry(id)
            .await?
            .filter(|e| e.couple_id == couple_id)
            .is_some();
        if !exists {
            return Err(ContentError::NotFound(id.to_string()));
        }
        self.entries.delete_entry(id).await?;
        Ok(())
    }

    /// Decrypts a single entry. Idempotent: an already-plaintext entry is
    /// returned unchanged, never double-decrypted.
    pub async fn decrypt_entry(
        &self,
        entry: DiaryEntry,
        couple_id: &str,
    ) -> ContentResult<DiaryEntry> {
        if !entry.is_encrypted {
            return Ok(entry);
        }
        let diary_key = self
            .keys
            .get_diary_key(couple_id)
            .await?
            .ok_or_else(|| ContentError::EncryptionUnavailable(couple_id.to_string()))?;
        let media_key = self.keys.get_media_key(couple_id).await?;

        let opened = self.open_entry(entry, Some(&diary_key), media_key.as_ref());
        if opened.is_encrypted {
            return Err(ContentError::Crypto(
                couplet_crypto::CryptoError::Authentication,
            ));
        }
        Ok(opened)
    }

    /// The rotation-completion sweep: decrypts every encrypted entry with
    /// the OLD keys and re-encrypts with the NEW ones. One corrupt entry
    /// never blocks the rest — failures are collected per item.
    pub async fn reencrypt_all_entries(
        &self,
        couple_id: &str,
        old_keys: &PurposeKeySet,
        new_keys: &PurposeKeySet,
    ) -> ContentResult<SweepReport> {
        let raw = self.entries.fetch_entries(couple_id, None).await?;
        let mut report = SweepReport::default();

        for entry in raw {
            if !entry.is_encrypted {
                report.skipped += 1;
                continue;
            }
            let entry_id = entry.id.clone();
            match self.migrate_entry(entry, old_keys, new_keys).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!(%entry_id, %couple_id, "sweep failed for entry: {e}");
                    report.failures.push(SweepFailure {
                        entry_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            %couple_id,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failures.len(),
            "re-encryption sweep complete"
        );
        Ok(report)
    }

    /// Decrypt-only integrity probe. Any failure — missing key, bad
    /// envelope, tag mismatch — yields `false`; this never errors.
    pub async fn validate_entry_integrity(&self, entry: &DiaryEntry, couple_id: &str) -> bool {
        if !entry.is_encrypted {
            return true;
        }
        let Ok(Some(diary_key)) = self.keys.get_diary_key(couple_id).await else {
            return false;
        };
        let Ok(envelope) = Envelope::from_json(&entry.content) else {
            return false;
        };
        if decrypt_string(&diary_key, &envelope).is_err() {
            return false;
        }

        if entry.media.iter().any(|m| m.is_encrypted) {
            let Ok(Some(media_key)) = self.keys.get_media_key(couple_id).await else {
                return false;
            };
            for item in entry.media.iter().filter(|m| m.is_encrypted) {
                if open_media(item, &media_key).is_none() {
                    return false;
                }
            }
        }
        true
    }

    /// Best-effort decrypt of one entry; failure leaves it in raw form.
    fn open_entry(
        &self,
        mut entry: DiaryEntry,
        diary_key: Option<&SymmetricKey>,
        media_key: Option<&SymmetricKey>,
    ) -> DiaryEntry {
        if !entry.is_encrypted {
            return entry;
        }
        let Some(diary_key) = diary_key else {
            return entry;
        };

        let plaintext = Envelope::from_json(&entry.content)
            .and_then(|envelope| decrypt_string(diary_key, &envelope));
        let Ok(plaintext) = plaintext else {
            debug!(entry_id = %entry.id, "entry undecryptable, returning raw");
            return entry;
        };

        let mut opened_media = Vec::with_capacity(entry.media.len());
        for item in &entry.media {
            if !item.is_encrypted {
                opened_media.push(item.clone());
                continue;
            }
            match media_key.and_then(|key| open_media(item, key)) {
                Some(open) => opened_media.push(open),
                // Keep the sealed attachment visible rather than dropping it.
                None => opened_media.push(item.clone()),
            }
        }

        entry.content = plaintext;
        entry.media = opened_media;
        entry.is_encrypted = false;
        entry
    }

    async fn migrate_entry(
        &self,
        mut entry: DiaryEntry,
        old_keys: &PurposeKeySet,
        new_keys: &PurposeKeySet,
    ) -> ContentResult<()> {
        let envelope = Envelope::from_json(&entry.content)?;
        let plaintext = decrypt_string(&old_keys.diary, &envelope)?;
        entry.content = encrypt_string(&new_keys.diary, &plaintext)?.to_json()?;

        let mut migrated_media = Vec::with_capacity(entry.media.len());
        for item in &entry.media {
            if !item.is_encrypted {
                migrated_media.push(item.clone());
                continue;
            }
            let open = open_media(item, &old_keys.media).ok_or(
                couplet_crypto::CryptoError::Authentication,
            )?;
            migrated_media.push(seal_media(&open, &new_keys.media)?);
        }
        entry.media = migrated_media;

        entry.updated_at = Utc::now();
        self.entries.update_entry(&entry).await?;
        Ok(())
    }
}

fn seal_media(item: &MediaAttachment, key: &SymmetricKey) -> ContentResult<MediaAttachment> {
    Ok(MediaAttachment {
        id: item.id.clone(),
        kind: item.kind,
        file_name: encrypt_string(key, &item.file_name)?.to_json()?,
        source_url: encrypt_string(key, &item.source_url)?.to_json()?,
        is_encrypted: true,
    })
}

fn open_media(item: &MediaAttachment, key: &SymmetricKey) -> Option<MediaAttachment> {
    let file_name = Envelope::from_json(&item.file_name)
        .and_then(|e| decrypt_string(key, &e))
        .ok()?;
    let source_url = Envelope::from_json(&item.source_url)
        .and_then(|e| decrypt_string(key, &e))
        .ok()?;
    Some(MediaAttachment {
        id: item.id.clone(),
        kind: item.kind,
        file_name,
        source_url,
        is_encrypted: false,
    })
}
