//! Export assembly, password wrapping, and import validation.

use crate::bundle::{
    ExportBundle, ExportMetadata, ExportOptions, ExportOutput, ExportStatistics, FORMAT_VERSION,
    MEDIA_OMITTED,
};
use crate::error::{ExportError, ExportResult};
use chrono::Utc;
use couplet_crypto::{
    Envelope, checksum_hex, decrypt, derive_password_key, encrypt,
};
use couplet_keys::KeyManager;
use couplet_store::{CoupleStore, EntryStore};
use couplet_types::DiaryEntry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Assembles portable snapshots and reverses them on import.
pub struct ExportService {
    keys: Arc<KeyManager>,
    entries: Arc<dyn EntryStore>,
    couples: Arc<dyn CoupleStore>,
}

impl ExportService {
    pub fn new(
        keys: Arc<KeyManager>,
        entries: Arc<dyn EntryStore>,
        couples: Arc<dyn CoupleStore>,
    ) -> Self {
        Self {
            keys,
            entries,
            couples,
        }
    }

    /// Builds an export bundle for a couple.
    ///
    /// Encrypted diary content is decrypted first — the export carries
    /// readable data unless the whole bundle is then password-wrapped.
    /// With `encrypt_export` set and no password, fails with a validation
    /// error before touching any store.
    pub async fn export_couple_data(
        &self,
        user_id: &str,
        couple_id: &str,
        options: &ExportOptions,
    ) -> ExportResult<ExportOutput> {
        let export_password = match (options.encrypt_export, options.export_password.as_deref()) {
            (true, None) => {
                return Err(ExportError::Validation(
                    "export password is required when encryption is requested".into(),
                ));
            }
            (true, Some(password)) => Some(password),
            (false, _) => None,
        };

        let bundle = self.assemble_bundle(user_id, couple_id, options).await?;
        let serialized = serde_json::to_string(&bundle)
            .map_err(|e| ExportError::InvalidFormat(e.to_string()))?;

        let payload = match export_password {
            Some(password) => {
                let (key, salt) = derive_password_key(password, None)?;
                encrypt(&key, serialized.as_bytes())?.with_salt(salt).to_json()?
            }
            None => serialized,
        };

        let checksum = checksum_hex(payload.as_bytes());
        let file_name = format!(
            "couples-diary-export-{}.json",
            Utc::now().format("%Y-%m-%d")
        );

        info!(
            %couple_id,
            entries = bundle.statistics.entry_count,
            encrypted = options.encrypt_export,
            "assembled export"
        );

        Ok(ExportOutput {
            payload,
            checksum,
            encrypted: options.encrypt_export,
            file_name,
        })
    }

    /// Parses an export payload back into a bundle.
    ///
    /// Envelope-shaped payloads require a password; plain JSON is validated
    /// structurally. Nothing is ever partially imported — either the whole
    /// payload parses as a supported bundle, or this fails.
    pub fn import_couple_data(
        &self,
        data: &str,
        password: Option<&str>,
    ) -> ExportResult<ExportBundle> {
        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| ExportError::InvalidFormat(format!("not JSON: {e}")))?;

        let bundle_json = if Envelope::is_envelope_shaped(&value) {
            let password = password.ok_or(ExportError::PasswordRequired)?;
            let envelope = Envelope::from_json(data)?;
            let salt = envelope
                .salt
                .ok_or_else(|| ExportError::InvalidFormat("encrypted export missing salt".into()))?;
            let (key, _) = derive_password_key(password, Some(salt))?;
            let plaintext = decrypt(&key, &envelope)?;
            String::from_utf8(plaintext)
                .map_err(|e| ExportError::InvalidFormat(format!("plaintext not UTF-8: {e}")))?
        } else {
            data.to_string()
        };

        let bundle: ExportBundle = serde_json::from_str(&bundle_json)
            .map_err(|e| ExportError::InvalidFormat(e.to_string()))?;

        if bundle.metadata.format_version > FORMAT_VERSION {
            return Err(ExportError::InvalidFormat(format!(
                "unsupported format version {}",
                bundle.metadata.format_version
            )));
        }

        debug!(couple_id = %bundle.metadata.couple_id, "imported export bundle");
        Ok(bundle)
    }

    /// Verifies a payload against the checksum that travelled with it.
    pub fn verify_checksum(&self, payload: &str, expected: &str) -> ExportResult<()> {
        if checksum_hex(payload.as_bytes()) != expected {
            return Err(ExportError::ChecksumMismatch);
        }
        Ok(())
    }

    /// Writes the export payload under its date-stamped file name. Returns
    /// the full path. Purely a convenience; not security-relevant.
    pub async fn write_to_dir(&self, output: &ExportOutput, dir: &Path) -> ExportResult<PathBuf> {
        let path = dir.join(&output.file_name);
        tokio::fs::write(&path, output.payload.as_bytes()).await?;
        Ok(path)
    }

    async fn assemble_bundle(
        &self,
        user_id: &str,
        couple_id: &str,
        options: &ExportOptions,
    ) -> ExportResult<ExportBundle> {
        let diary_key = self.keys.get_diary_key(couple_id).await?;
        let media_key = self.keys.get_media_key(couple_id).await?;

        let raw_entries = self.entries.fetch_entries(couple_id, None).await?;
        let mut entries = Vec::with_capacity(raw_entries.len());
        for entry in raw_entries {
            if !options.include_partner_data && entry.author_id != user_id {
                continue;
            }
            if let Some((from, to)) = options.date_range {
                if entry.created_at < from || entry.created_at > to {
                    continue;
                }
            }
            entries.push(self.readable_entry(entry, diary_key.as_ref(), media_key.as_ref(), options));
        }

        let plans = self.couples.fetch_plans(couple_id).await?;
        let memories = self.couples.fetch_memories(couple_id).await?;
        let profiles = self.couples.fetch_profiles(couple_id).await?;

        let days_together = match self.couples.fetch_couple(couple_id).await? {
            Some(record) => (Utc::now() - record.started_at).num_days().max(0),
            None => 0,
        };

        let statistics = ExportStatistics {
            entry_count: entries.len(),
            plan_count: plans.len(),
            memory_count: memories.len(),
            first_entry_at: entries.iter().map(|e| e.created_at).min(),
            last_entry_at: entries.iter().map(|e| e.created_at).max(),
            days_together,
        };

        Ok(ExportBundle {
            metadata: ExportMetadata {
                exported_at: Utc::now(),
                exported_by: user_id.to_string(),
                couple_id: couple_id.to_string(),
                format_version: FORMAT_VERSION,
                encrypted: options.encrypt_export,
            },
            profiles,
            entries,
            plans,
            memories,
            statistics,
        })
    }

    /// Decrypts one entry for export. An entry that cannot be decrypted is
    /// carried in raw form rather than silently omitted.
    fn readable_entry(
        &self,
        mut entry: DiaryEntry,
        diary_key: Option<&couplet_crypto::SymmetricKey>,
        media_key: Option<&couplet_crypto::SymmetricKey>,
        options: &ExportOptions,
    ) -> DiaryEntry {
        if entry.is_encrypted {
            let opened = diary_key.and_then(|key| {
                Envelope::from_json(&entry.content)
                    .and_then(|envelope| couplet_crypto::decrypt_string(key, &envelope))
                    .ok()
            });
            match opened {
                Some(plaintext) => {
                    entry.content = plaintext;
                    entry.is_encrypted = false;
                }
                None => {
                    warn!(entry_id = %entry.id, "exporting entry in undecryptable form");
                }
            }
        }

        let mut media = Vec::with_capacity(entry.media.len());
        for item in &entry.media {
            let mut item = item.clone();
            if item.is_encrypted {
                if let Some(key) = media_key {
                    if let (Ok(name), Ok(url)) = (
                        Envelope::from_json(&item.file_name)
                            .and_then(|e| couplet_crypto::decrypt_string(key, &e)),
                        Envelope::from_json(&item.source_url)
                            .and_then(|e| couplet_crypto::decrypt_string(key, &e)),
                    ) {
                        item.file_name = name;
                        item.source_url = url;
                        item.is_encrypted = false;
                    }
                }
            }
            if !options.include_media {
                item.source_url = MEDIA_OMITTED.to_string();
            }
            media.push(item);
        }
        entry.media = media;
        entry
    }
}
