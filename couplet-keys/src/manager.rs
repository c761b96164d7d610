//! Per-couple purpose-key lifecycle.
//!
//! State machine per couple: uninitialized → initialized → rotated* →
//! cleared. `cleared` is terminal for a key generation; a later
//! `initialize_couple_keys` starts a new generation, it does not resurrect
//! the old one.
//!
//! An explicit, constructed service — the composition root owns one instance
//! per process and hands it to the services that need it.

use crate::error::{KeyError, KeyResult};
use crate::store::SessionKeyStore;
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::Utc;
use couplet_crypto::{
    Envelope, KdfParams, Salt, SymmetricKey, decrypt, derive_key, encrypt, generate_key,
};
use couplet_store::KeyMetadataStore;
use couplet_types::{KeyMetadata, KeyPurpose};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Algorithm tag recorded in key metadata.
pub const ALGORITHM: &str = "chacha20poly1305";

/// Separator between passphrase and purpose label in derivation input, so
/// each purpose key comes from a distinct input and compromise of one
/// reveals nothing about the others.
const PURPOSE_SEPARATOR: char = '\u{1f}';

/// The three purpose keys active for a couple.
#[derive(Clone, Debug)]
pub struct PurposeKeySet {
    pub diary: SymmetricKey,
    pub media: SymmetricKey,
    pub backup: SymmetricKey,
}

impl PurposeKeySet {
    pub fn key_for(&self, purpose: KeyPurpose) -> &SymmetricKey {
        match purpose {
            KeyPurpose::Diary => &self.diary,
            KeyPurpose::Media => &self.media,
            KeyPurpose::Backup => &self.backup,
        }
    }
}

/// Handle returned by `rotate_keys`, owning both key generations.
///
/// The superseded keys live only here — the session cache already holds the
/// new generation. Pass both sets through the re-encryption sweep, then call
/// [`KeyRotation::finish`] with the sweep's failure count. Dropping the
/// handle without finishing zeroizes the old keys immediately and makes any
/// entry the sweep did not process permanently unreadable.
#[derive(Debug)]
pub struct KeyRotation {
    couple_id: String,
    previous: PurposeKeySet,
    current: PurposeKeySet,
}

impl KeyRotation {
    pub fn couple_id(&self) -> &str {
        &self.couple_id
    }

    /// The superseded key set, needed to decrypt pre-rotation ciphertext.
    pub fn previous(&self) -> &PurposeKeySet {
        &self.previous
    }

    /// The freshly generated key set now active for writes.
    pub fn current(&self) -> &PurposeKeySet {
        &self.current
    }

    /// Disposes of the superseded keys once the sweep is clean.
    ///
    /// Refuses while any entries remain unprocessed, handing the rotation
    /// back so the caller can re-run the sweep and try again.
    pub fn finish(self, unprocessed: usize) -> Result<(), KeyRotation> {
        if unprocessed > 0 {
            warn!(
                couple_id = %self.couple_id,
                unprocessed, "rotation not finished: sweep left entries on the old key"
            );
            return Err(self);
        }
        info!(couple_id = %self.couple_id, "rotation finished, superseded keys disposed");
        Ok(())
    }
}

/// Serialized form of a key backup before password wrapping.
#[derive(Serialize, Deserialize)]
struct KeyBackup {
    couple_id: String,
    exported_at: chrono::DateTime<Utc>,
    /// purpose → base64 raw key bytes.
    keys: Vec<(KeyPurpose, String)>,
}

impl KeyBackup {
    fn key_for(&self, purpose: KeyPurpose) -> KeyResult<SymmetricKey> {
        let (_, encoded) = self
            .keys
            .iter()
            .find(|(p, _)| *p == purpose)
            .ok_or_else(|| KeyError::InvalidBackup(format!("backup missing {purpose} key")))?;
        let bytes = B64
            .decode(encoded)
            .map_err(|e| KeyError::InvalidBackup(format!("bad key encoding: {e}")))?;
        Ok(SymmetricKey::from_slice(&bytes)?)
    }
}

/// Per-couple key lifecycle service.
pub struct KeyManager {
    store: SessionKeyStore,
    metadata: Arc<dyn KeyMetadataStore>,
    params: KdfParams,
}

impl KeyManager {
    pub fn new(store: SessionKeyStore, metadata: Arc<dyn KeyMetadataStore>) -> Self {
        Self {
            store,
            metadata,
            params: KdfParams::default(),
        }
    }

    /// Initializes the three purpose keys for a couple.
    ///
    /// With a shared passphrase, each purpose key is derived independently
    /// (purpose-tagged input, per-purpose random salt); without one, three
    /// independent random keys are generated. Metadata is persisted at
    /// version 1 and raw keys land in the session cache.
    pub async fn initialize_couple_keys(
        &self,
        user_id: &str,
        couple_id: &str,
        master_password: Option<&str>,
    ) -> KeyResult<PurposeKeySet> {
        let diary = self
            .provision_key(couple_id, KeyPurpose::Diary, master_password)
            .await?;
        let media = self
            .provision_key(couple_id, KeyPurpose::Media, master_password)
            .await?;
        let backup = self
            .provision_key(couple_id, KeyPurpose::Backup, master_password)
            .await?;

        info!(%couple_id, %user_id, derived = master_password.is_some(), "initialized couple keys");

        Ok(PurposeKeySet {
            diary,
            media,
            backup,
        })
    }

    /// Creates one purpose key at version 1, persists its metadata, and
    /// caches the raw key for the session.
    async fn provision_key(
        &self,
        couple_id: &str,
        purpose: KeyPurpose,
        master_password: Option<&str>,
    ) -> KeyResult<SymmetricKey> {
        let (key, salt_b64) = match master_password {
            Some(password) => {
                let salt = Salt::random();
                let input = format!("{password}{PURPOSE_SEPARATOR}{}", purpose.label());
                let key = derive_key(&input, &salt, &self.params)?;
                (key, Some(salt.to_b64()))
            }
            None => (generate_key(), None),
        };

        let now = Utc::now();
        self.metadata
            .upsert_metadata(&KeyMetadata {
                key_id: Uuid::new_v4().to_string(),
                couple_id: couple_id.to_string(),
                purpose,
                algorithm: ALGORITHM.to_string(),
                salt_b64,
                created_at: now,
                last_used_at: now,
                version: 1,
            })
            .await?;

        self.store
            .store(&SessionKeyStore::cache_id(couple_id, purpose.label()), key.clone())
            .await;
        Ok(key)
    }

    /// Fetches one purpose key from the session cache.
    ///
    /// `None` means "encryption unavailable" — keys were never initialized
    /// this session or have been cleared. Callers decide whether that blocks
    /// the operation; it is not an error here.
    pub async fn get_key(
        &self,
        couple_id: &str,
        purpose: KeyPurpose,
    ) -> KeyResult<Option<SymmetricKey>> {
        let key = self
            .store
            .retrieve(&SessionKeyStore::cache_id(couple_id, purpose.label()))
            .await;

        if key.is_some() {
            self.touch(couple_id, purpose).await;
        }
        Ok(key)
    }

    pub async fn get_diary_key(&self, couple_id: &str) -> KeyResult<Option<SymmetricKey>> {
        self.get_key(couple_id, KeyPurpose::Diary).await
    }

    pub async fn get_media_key(&self, couple_id: &str) -> KeyResult<Option<SymmetricKey>> {
        self.get_key(couple_id, KeyPurpose::Media).await
    }

    pub async fn get_backup_key(&self, couple_id: &str) -> KeyResult<Option<SymmetricKey>> {
        self.get_key(couple_id, KeyPurpose::Backup).await
    }

    /// Whether encryption is enabled for a couple, answered from persisted
    /// metadata without touching secret material.
    pub async fn is_encryption_enabled(&self, couple_id: &str) -> KeyResult<bool> {
        Ok(!self.metadata.fetch_all_metadata(couple_id).await?.is_empty())
    }

    /// Rotates all three purpose keys.
    ///
    /// Fresh random keys supersede the old set in the cache and each
    /// purpose's metadata version is incremented. Existing ciphertext is NOT
    /// re-encrypted here — run the content layer's re-encryption sweep with
    /// the returned handle, then `finish` it. Requires the old keys to be
    /// present this session, otherwise pre-rotation entries could never be
    /// migrated.
    pub async fn rotate_keys(&self, couple_id: &str) -> KeyResult<KeyRotation> {
        if !self.is_encryption_enabled(couple_id).await? {
            return Err(KeyError::NotInitialized(couple_id.to_string()));
        }

        let previous = self
            .current_key_set(couple_id)
            .await?
            .ok_or_else(|| KeyError::KeysUnavailable(couple_id.to_string()))?;

        let current = PurposeKeySet {
            diary: generate_key(),
            media: generate_key(),
            backup: generate_key(),
        };

        for purpose in KeyPurpose::ALL {
            let version = match self.metadata.fetch_metadata(couple_id, purpose).await? {
                Some(existing) => existing.version + 1,
                None => 1,
            };
            let now = Utc::now();
            self.metadata
                .upsert_metadata(&KeyMetadata {
                    key_id: Uuid::new_v4().to_string(),
                    couple_id: couple_id.to_string(),
                    purpose,
                    algorithm: ALGORITHM.to_string(),
                    salt_b64: None,
                    created_at: now,
                    last_used_at: now,
                    version,
                })
                .await?;

            self.store
                .store(
                    &SessionKeyStore::cache_id(couple_id, purpose.label()),
                    current.key_for(purpose).clone(),
                )
                .await;
        }

        info!(%couple_id, "rotated purpose keys");

        Ok(KeyRotation {
            couple_id: couple_id.to_string(),
            previous,
            current,
        })
    }

    /// Exports all three purpose keys wrapped in a password-derived envelope.
    /// Raw key bytes never leave this function in the clear.
    pub async fn export_keys_for_backup(
        &self,
        couple_id: &str,
        backup_password: &str,
    ) -> KeyResult<Envelope> {
        let keys = self
            .current_key_set(couple_id)
            .await?
            .ok_or_else(|| KeyError::KeysUnavailable(couple_id.to_string()))?;

        let backup = KeyBackup {
            couple_id: couple_id.to_string(),
            exported_at: Utc::now(),
            keys: KeyPurpose::ALL
                .into_iter()
                .map(|p| (p, B64.encode(keys.key_for(p).as_bytes())))
                .collect(),
        };
        let plaintext = serde_json::to_vec(&backup)?;

        let salt = Salt::random();
        let wrap_key = derive_key(backup_password, &salt, &self.params)?;
        let envelope = encrypt(&wrap_key, &plaintext)?.with_salt(salt);

        debug!(%couple_id, "exported key backup");
        Ok(envelope)
    }

    /// Imports a key backup, fully replacing any keys cached for that couple.
    pub async fn import_keys_from_backup(
        &self,
        encrypted_backup: &Envelope,
        backup_password: &str,
    ) -> KeyResult<PurposeKeySet> {
        let salt = encrypted_backup
            .salt
            .ok_or_else(|| KeyError::InvalidBackup("missing KDF salt".into()))?;
        let wrap_key = derive_key(backup_password, &salt, &self.params)?;
        let plaintext = decrypt(&wrap_key, encrypted_backup)?;

        let backup: KeyBackup = serde_json::from_slice(&plaintext)
            .map_err(|e| KeyError::InvalidBackup(format!("malformed backup payload: {e}")))?;

        let restored = PurposeKeySet {
            diary: backup.key_for(KeyPurpose::Diary)?,
            media: backup.key_for(KeyPurpose::Media)?,
            backup: backup.key_for(KeyPurpose::Backup)?,
        };

        for purpose in KeyPurpose::ALL {
            self.store
                .store(
                    &SessionKeyStore::cache_id(&backup.couple_id, purpose.label()),
                    restored.key_for(purpose).clone(),
                )
                .await;
        }

        info!(couple_id = %backup.couple_id, "imported key backup");
        Ok(restored)
    }

    /// Irreversibly clears one couple's cached keys and metadata. Called by
    /// breakup mode when recovery is disallowed.
    pub async fn clear_couple_keys(&self, couple_id: &str) -> KeyResult<()> {
        for purpose in KeyPurpose::ALL {
            self.store
                .remove(&SessionKeyStore::cache_id(couple_id, purpose.label()))
                .await;
        }
        self.metadata.delete_metadata(couple_id).await?;
        info!(%couple_id, "cleared couple keys and metadata");
        Ok(())
    }

    /// Clears every cached key in the session namespace (full logout).
    /// Durable metadata for other couples is left for their own clear calls.
    pub async fn clear_all_keys(&self) {
        self.store.clear_all().await;
        info!("cleared all session key material");
    }

    async fn current_key_set(&self, couple_id: &str) -> KeyResult<Option<PurposeKeySet>> {
        let diary = self
            .store
            .retrieve(&SessionKeyStore::cache_id(couple_id, KeyPurpose::Diary.label()))
            .await;
        let media = self
            .store
            .retrieve(&SessionKeyStore::cache_id(couple_id, KeyPurpose::Media.label()))
            .await;
        let backup = self
            .store
            .retrieve(&SessionKeyStore::cache_id(couple_id, KeyPurpose::Backup.label()))
            .await;

        Ok(match (diary, media, backup) {
            (Some(diary), Some(media), Some(backup)) => Some(PurposeKeySet {
                diary,
                media,
                backup,
            }),
            _ => None,
        })
    }

    /// Bumps `last_used_at`, best-effort — a metadata write failure must not
    /// break a key fetch.
    async fn touch(&self, couple_id: &str, purpose: KeyPurpose) {
        match self.metadata.fetch_metadata(couple_id, purpose).await {
            Ok(Some(mut meta)) => {
                meta.last_used_at = Utc::now();
                if let Err(e) = self.metadata.upsert_metadata(&meta).await {
                    debug!(%couple_id, %purpose, "last_used_at update failed: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => debug!(%couple_id, %purpose, "metadata fetch failed: {e}"),
        }
    }
}
