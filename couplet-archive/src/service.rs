//! Breakup-mode orchestration.

use crate::error::{ArchiveError, ArchiveResult};
use crate::session::{SessionCache, password_cache_key};
use chrono::{Duration, Utc};
use couplet_crypto::{
    Envelope, KdfParams, Salt, SymmetricKey, checksum_hex, decrypt, derive_key,
    derive_password_key, encrypt, encrypt_string, decrypt_string, generate_password, shape_hint,
};
use couplet_keys::KeyManager;
use couplet_export::{ExportOptions, ExportOutput, ExportService};
use couplet_store::{ArchiveStore, CoupleStore, NotificationSink};
use couplet_types::{ArchivePayload, BreakupArchive, CoupleStatus, new_id};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Domain salt for the archive-id-scoped recovery key. Fixed: the archive id
/// is high-entropy, so determinism per id is the point, not a weakness.
const RECOVERY_DOMAIN_SALT: &[u8; 16] = b"couplet-archive\0";

/// Archival policy fixed at construction.
#[derive(Clone, Debug)]
pub struct ArchiveConfig {
    /// Recovery window applied when the caller does not pick one.
    pub default_recovery_period_days: i64,
    /// Length of generated archive passwords.
    pub archive_password_length: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            default_recovery_period_days: 30,
            archive_password_length: 32,
        }
    }
}

/// Per-breakup choices. Each flag is independent; defaults favor the
/// recoverable path.
#[derive(Clone, Debug)]
pub struct BreakupOptions {
    /// Produce a downloadable export before anything else.
    pub export_before_breakup: bool,
    /// Create a recoverable encrypted archive.
    pub archive_data: bool,
    /// Delete shared data outright instead of merely restricting access.
    pub delete_shared_data: bool,
    /// Whether recovery is allowed at all. When false, keys are erased and
    /// un-archived ciphertext becomes permanently unreadable.
    pub allow_data_recovery: bool,
    /// Persist the archive password encrypted under the archive-scoped
    /// recovery key, in addition to the ephemeral session cache.
    pub persist_recovery_password: bool,
    /// Recovery window length; the config default applies when absent.
    pub recovery_period_days: Option<i64>,
    pub reason: Option<String>,
}

impl Default for BreakupOptions {
    fn default() -> Self {
        Self {
            export_before_breakup: false,
            archive_data: true,
            delete_shared_data: false,
            allow_data_recovery: true,
            persist_recovery_password: false,
            recovery_period_days: None,
            reason: None,
        }
    }
}

/// What breakup activation produced, reported to the UI.
#[derive(Debug, Serialize)]
pub struct BreakupOutcome {
    pub archive_id: Option<String>,
    pub export: Option<ExportOutput>,
}

/// What a successful recovery restored, reported to the UI.
#[derive(Debug, Serialize)]
pub struct RecoveryOutcome {
    pub couple_id: String,
    pub restored_entries: usize,
    pub restored_plans: usize,
    pub restored_memories: usize,
}

/// Orchestrates archival, access restriction, key erasure, and recovery.
pub struct ArchivalService {
    keys: Arc<KeyManager>,
    export: Arc<ExportService>,
    couples: Arc<dyn CoupleStore>,
    archives: Arc<dyn ArchiveStore>,
    notifications: Arc<dyn NotificationSink>,
    session: SessionCache,
    config: ArchiveConfig,
}

impl ArchivalService {
    pub fn new(
        keys: Arc<KeyManager>,
        export: Arc<ExportService>,
        couples: Arc<dyn CoupleStore>,
        archives: Arc<dyn ArchiveStore>,
        notifications: Arc<dyn NotificationSink>,
        config: ArchiveConfig,
    ) -> Self {
        Self {
            keys,
            export,
            couples,
            archives,
            notifications,
            session: SessionCache::new(),
            config,
        }
    }

    /// The ephemeral archive-password cache, for the shell to clear on
    /// session end.
    pub fn session_cache(&self) -> &SessionCache {
        &self.session
    }

    /// Runs the breakup sequence: optional export, optional archive, end the
    /// relationship, restrict or delete shared data, erase keys when
    /// recovery is disallowed, then notify the partner best-effort.
    ///
    /// Ordering is load-bearing: the export and archive run before key
    /// erasure, because clearing keys makes any not-yet-captured ciphertext
    /// permanently unreadable.
    pub async fn activate_breakup_mode(
        &self,
        user_id: &str,
        couple_id: &str,
        options: &BreakupOptions,
    ) -> ArchiveResult<BreakupOutcome> {
        info!(%couple_id, %user_id, "activating breakup mode");

        // 1. Downloadable export, while keys are still present.
        let export = if options.export_before_breakup {
            Some(
                self.export
                    .export_couple_data(user_id, couple_id, &ExportOptions::default())
                    .await?,
            )
        } else {
            None
        };

        // 2. Recoverable encrypted archive.
        let archive_id = if options.archive_data {
            Some(self.create_archive(user_id, couple_id, options).await?)
        } else {
            None
        };

        // 3. Flag the relationship as ended.
        self.couples
            .set_couple_status(couple_id, CoupleStatus::Ended)
            .await?;

        // 4. Restrict or delete shared data.
        if options.delete_shared_data {
            self.couples.delete_shared_data(couple_id).await?;
        } else {
            self.couples.set_access_restricted(couple_id, true).await?;
        }

        // 5. Irreversible key erasure, only once steps 1-2 have captured
        //    whatever the user asked to keep.
        if !options.allow_data_recovery {
            self.keys.clear_couple_keys(couple_id).await?;
        }

        // 6. Best-effort partner notification; delivery failure never rolls
        //    back the breakup.
        if let Err(e) = self.notifications.notify_breakup(couple_id, user_id).await {
            warn!(%couple_id, "breakup notification failed: {e}");
        }

        info!(
            %couple_id,
            archived = archive_id.is_some(),
            exported = export.is_some(),
            recoverable = options.allow_data_recovery,
            "breakup mode active"
        );

        Ok(BreakupOutcome { archive_id, export })
    }

    /// Recovers a couple's data from an archive, single-use.
    ///
    /// The password comes from the explicit argument, the session cache, or
    /// (when it was persisted) the archive-scoped recovery key. On success
    /// the bundle is re-imported, the relationship reactivated, and the
    /// archive deleted — recovering twice is not supported.
    pub async fn recover_from_breakup(
        &self,
        archive_id: &str,
        recovery_password: Option<&str>,
    ) -> ArchiveResult<RecoveryOutcome> {
        let archive = self
            .archives
            .fetch_archive(archive_id)
            .await?
            .ok_or_else(|| ArchiveError::NotFound(archive_id.to_string()))?;

        let result = self.try_recover(&archive, recovery_password).await;
        // The cached password is cleared after any attempt, success or not.
        self.session.remove(&password_cache_key(archive_id)).await;
        result
    }

    /// The terminal, no-recovery path: key erasure, then deletion of every
    /// shared record. Requires its own explicit confirmation upstream.
    pub async fn permanently_delete_data(
        &self,
        couple_id: &str,
        user_id: &str,
    ) -> ArchiveResult<()> {
        self.keys.clear_couple_keys(couple_id).await?;
        self.couples.delete_shared_data(couple_id).await?;
        self.couples
            .set_couple_status(couple_id, CoupleStatus::Ended)
            .await?;
        info!(%couple_id, %user_id, "permanently deleted shared data");
        Ok(())
    }

    async fn create_archive(
        &self,
        user_id: &str,
        couple_id: &str,
        options: &BreakupOptions,
    ) -> ArchiveResult<String> {
        let archive_id = new_id();

        // Full-fidelity bundle, readable, then sealed as one envelope.
        let bundle = self
            .export
            .export_couple_data(user_id, couple_id, &ExportOptions::default())
            .await?;
        let checksum = checksum_hex(bundle.payload.as_bytes());

        let password = generate_password(self.config.archive_password_length);
        let (archive_key, salt) = derive_password_key(&password, None)?;
        let encrypted_data = encrypt(&archive_key, bundle.payload.as_bytes())?
            .with_salt(salt)
            .to_json()?;

        let protected_password = if options.persist_recovery_password {
            let recovery_key = archive_recovery_key(&archive_id)?;
            Some(encrypt_string(&recovery_key, &password)?.to_json()?)
        } else {
            None
        };

        let recovery_days = options
            .recovery_period_days
            .unwrap_or(self.config.default_recovery_period_days);
        let archived_at = Utc::now();

        let archive = BreakupArchive {
            id: archive_id.clone(),
            couple_id: couple_id.to_string(),
            user_id: user_id.to_string(),
            archived_at,
            reason: options.reason.clone(),
            recovery_expires_at: archived_at + Duration::days(recovery_days),
            is_recoverable: options.allow_data_recovery,
            payload: ArchivePayload {
                encrypted_data,
                checksum,
                password_hint: shape_hint(&password),
                protected_password,
            },
        };

        self.archives.insert_archive(&archive).await?;

        if options.allow_data_recovery {
            self.session
                .put(&password_cache_key(&archive_id), password)
                .await;
        }

        info!(%couple_id, %archive_id, days = recovery_days, "created breakup archive");
        Ok(archive_id)
    }

    async fn try_recover(
        &self,
        archive: &BreakupArchive,
        recovery_password: Option<&str>,
    ) -> ArchiveResult<RecoveryOutcome> {
        if !archive.is_recoverable || Utc::now() > archive.recovery_expires_at {
            return Err(ArchiveError::RecoveryExpired);
        }

        let password = match recovery_password {
            Some(p) => p.to_string(),
            None => match self.session.get(&password_cache_key(&archive.id)).await {
                Some(p) => p,
                None => self
                    .unprotect_password(archive)?
                    .ok_or(ArchiveError::PasswordRequired)?,
            },
        };

        let envelope = Envelope::from_json(&archive.payload.encrypted_data)?;
        let salt = envelope
            .salt
            .ok_or(couplet_crypto::CryptoError::InvalidEnvelope(
                "archive envelope missing salt".into(),
            ))?;
        let (archive_key, _) = derive_password_key(&password, Some(salt))?;
        let plaintext = decrypt(&archive_key, &envelope)?;
        let bundle_json = String::from_utf8(plaintext).map_err(|e| {
            ArchiveError::Crypto(couplet_crypto::CryptoError::InvalidEnvelope(format!(
                "archive plaintext not UTF-8: {e}"
            )))
        })?;

        if checksum_hex(bundle_json.as_bytes()) != archive.payload.checksum {
            return Err(ArchiveError::ChecksumMismatch);
        }

        let bundle = self.export.import_couple_data(&bundle_json, None)?;

        self.couples
            .restore_data(
                &archive.couple_id,
                &bundle.entries,
                &bundle.plans,
                &bundle.memories,
            )
            .await?;
        self.couples
            .set_couple_status(&archive.couple_id, CoupleStatus::Active)
            .await?;
        self.couples
            .set_access_restricted(&archive.couple_id, false)
            .await?;

        // Single-use: the archive is gone once recovered.
        self.archives.delete_archive(&archive.id).await?;

        info!(couple_id = %archive.couple_id, archive_id = %archive.id, "recovered from breakup");

        Ok(RecoveryOutcome {
            couple_id: archive.couple_id.clone(),
            restored_entries: bundle.entries.len(),
            restored_plans: bundle.plans.len(),
            restored_memories: bundle.memories.len(),
        })
    }

    /// Decrypts the persisted archive password, when one was stored.
    fn unprotect_password(&self, archive: &BreakupArchive) -> ArchiveResult<Option<String>> {
        let Some(protected) = &archive.payload.protected_password else {
            return Ok(None);
        };
        let recovery_key = archive_recovery_key(&archive.id)?;
        let envelope = Envelope::from_json(protected)?;
        Ok(Some(decrypt_string(&recovery_key, &envelope)?))
    }
}

/// Deterministic, archive-id-scoped recovery key. A fixed domain salt is
/// safe here because the archive id itself is a random UUID.
fn archive_recovery_key(archive_id: &str) -> ArchiveResult<SymmetricKey> {
    let salt = Salt::from_bytes(*RECOVERY_DOMAIN_SALT);
    Ok(derive_key(archive_id, &salt, &KdfParams::default())?)
}
