//! Breakup-mode tests: archival, recovery windows, key erasure, and the
//! permanent-deletion path.

use chrono::{Duration, Utc};
use couplet_archive::{
    ArchivalService, ArchiveConfig, ArchiveError, BreakupOptions, password_cache_key,
};
use couplet_content::SecureContentService;
use couplet_crypto::Envelope;
use couplet_export::ExportService;
use couplet_keys::{KeyManager, SessionKeyStore};
use couplet_store::{ArchiveStore, CoupleStore, EntryStore, MemoryStore};
use couplet_types::{CoupleRecord, CoupleStatus, UserProfile};
use std::sync::Arc;

struct Fixture {
    archival: ArchivalService,
    content: SecureContentService,
    keys: Arc<KeyManager>,
    store: MemoryStore,
}

async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let keys = Arc::new(KeyManager::new(
        SessionKeyStore::new(),
        Arc::new(store.clone()),
    ));
    let content = SecureContentService::new(keys.clone(), Arc::new(store.clone()));
    let export = Arc::new(ExportService::new(
        keys.clone(),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    ));
    let archival = ArchivalService::new(
        keys.clone(),
        export,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        ArchiveConfig::default(),
    );

    store
        .seed_couple(
            CoupleRecord {
                id: "c1".into(),
                user_id: "user-1".into(),
                partner_id: "user-2".into(),
                status: CoupleStatus::Active,
                started_at: Utc::now() - Duration::days(200),
                ended_at: None,
            },
            vec![
                UserProfile {
                    id: "user-1".into(),
                    display_name: "Ada".into(),
                    avatar_url: None,
                },
                UserProfile {
                    id: "user-2".into(),
                    display_name: "Grace".into(),
                    avatar_url: None,
                },
            ],
        )
        .await;

    keys.initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    Fixture {
        archival,
        content,
        keys,
        store,
    }
}

#[tokio::test]
async fn activation_creates_a_recoverable_archive_and_restricts_access() {
    let fx = fixture().await;
    fx.content
        .create_secure_entry("c1", "user-1", "keep me safe", None, vec![])
        .await
        .unwrap();

    let outcome = fx
        .archival
        .activate_breakup_mode("user-1", "c1", &BreakupOptions::default())
        .await
        .unwrap();

    let archive_id = outcome.archive_id.expect("archive requested by default");
    assert!(outcome.export.is_none());

    let archive = fx
        .store
        .fetch_archive(&archive_id)
        .await
        .unwrap()
        .unwrap();
    assert!(archive.is_recoverable);
    assert_eq!(
        (archive.recovery_expires_at - archive.archived_at).num_days(),
        30
    );
    assert!(archive.payload.password_hint.contains("32 chars"));
    assert!(archive.payload.protected_password.is_none());

    // The archive body is a single envelope, opaque to the store.
    let value: serde_json::Value =
        serde_json::from_str(&archive.payload.encrypted_data).unwrap();
    assert!(Envelope::is_envelope_shaped(&value));

    // Relationship ended, access restricted, keys retained (recovery allowed).
    let couple = fx.store.fetch_couple("c1").await.unwrap().unwrap();
    assert_eq!(couple.status, CoupleStatus::Ended);
    assert!(fx.store.is_restricted("c1").await);
    assert!(fx.keys.get_diary_key("c1").await.unwrap().is_some());

    // Password cached for this session.
    assert!(
        fx.archival
            .session_cache()
            .get(&password_cache_key(&archive_id))
            .await
            .is_some()
    );
}

#[tokio::test]
async fn recovery_from_session_cache_restores_and_consumes_the_archive() {
    let fx = fixture().await;
    fx.content
        .create_secure_entry("c1", "user-1", "before the storm", None, vec![])
        .await
        .unwrap();

    let outcome = fx
        .archival
        .activate_breakup_mode("user-1", "c1", &BreakupOptions::default())
        .await
        .unwrap();
    let archive_id = outcome.archive_id.unwrap();

    let recovery = fx
        .archival
        .recover_from_breakup(&archive_id, None)
        .await
        .unwrap();
    assert_eq!(recovery.couple_id, "c1");
    assert_eq!(recovery.restored_entries, 1);

    // Relationship reactivated and data readable again.
    let couple = fx.store.fetch_couple("c1").await.unwrap().unwrap();
    assert_eq!(couple.status, CoupleStatus::Active);
    assert!(!fx.store.is_restricted("c1").await);

    let entries = fx.store.fetch_entries("c1", None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "before the storm");

    // Single-use: the archive and its cached password are gone.
    assert!(fx.store.fetch_archive(&archive_id).await.unwrap().is_none());
    assert!(
        fx.archival
            .session_cache()
            .get(&password_cache_key(&archive_id))
            .await
            .is_none()
    );
    assert!(matches!(
        fx.archival.recover_from_breakup(&archive_id, None).await,
        Err(ArchiveError::NotFound(_))
    ));
}

#[tokio::test]
async fn recovery_works_with_an_explicit_password() {
    let fx = fixture().await;
    fx.content
        .create_secure_entry("c1", "user-1", "portable secret", None, vec![])
        .await
        .unwrap();

    let outcome = fx
        .archival
        .activate_breakup_mode("user-1", "c1", &BreakupOptions::default())
        .await
        .unwrap();
    let archive_id = outcome.archive_id.unwrap();

    // The user noted the password; the session cache is gone (new session).
    let password = fx
        .archival
        .session_cache()
        .get(&password_cache_key(&archive_id))
        .await
        .unwrap();
    fx.archival.session_cache().clear().await;

    let recovery = fx
        .archival
        .recover_from_breakup(&archive_id, Some(&password))
        .await
        .unwrap();
    assert_eq!(recovery.restored_entries, 1);
}

#[tokio::test]
async fn recovery_without_any_password_source_is_refused() {
    let fx = fixture().await;

    let outcome = fx
        .archival
        .activate_breakup_mode("user-1", "c1", &BreakupOptions::default())
        .await
        .unwrap();
    let archive_id = outcome.archive_id.unwrap();

    fx.archival.session_cache().clear().await;

    assert!(matches!(
        fx.archival.recover_from_breakup(&archive_id, None).await,
        Err(ArchiveError::PasswordRequired)
    ));
}

#[tokio::test]
async fn wrong_explicit_password_fails_authentication() {
    let fx = fixture().await;

    let outcome = fx
        .archival
        .activate_breakup_mode("user-1", "c1", &BreakupOptions::default())
        .await
        .unwrap();
    let archive_id = outcome.archive_id.unwrap();
    fx.archival.session_cache().clear().await;

    assert!(matches!(
        fx.archival
            .recover_from_breakup(&archive_id, Some("not the password"))
            .await,
        Err(ArchiveError::Crypto(couplet_crypto::CryptoError::Authentication))
    ));
}

#[tokio::test]
async fn persisted_recovery_password_survives_the_session() {
    let fx = fixture().await;
    fx.content
        .create_secure_entry("c1", "user-1", "belt and suspenders", None, vec![])
        .await
        .unwrap();

    let outcome = fx
        .archival
        .activate_breakup_mode(
            "user-1",
            "c1",
            &BreakupOptions {
                persist_recovery_password: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let archive_id = outcome.archive_id.unwrap();

    let archive = fx
        .store
        .fetch_archive(&archive_id)
        .await
        .unwrap()
        .unwrap();
    assert!(archive.payload.protected_password.is_some());

    // Fresh session: no cache, no explicit password — the persisted copy
    // under the archive-scoped recovery key carries the flow.
    fx.archival.session_cache().clear().await;
    let recovery = fx
        .archival
        .recover_from_breakup(&archive_id, None)
        .await
        .unwrap();
    assert_eq!(recovery.restored_entries, 1);
}

#[tokio::test]
async fn lapsed_window_refuses_recovery() {
    let fx = fixture().await;

    let outcome = fx
        .archival
        .activate_breakup_mode("user-1", "c1", &BreakupOptions::default())
        .await
        .unwrap();
    let archive_id = outcome.archive_id.unwrap();

    fx.store
        .patch_archive(&archive_id, |archive| {
            archive.recovery_expires_at = Utc::now() - Duration::hours(1);
        })
        .await;

    assert!(matches!(
        fx.archival.recover_from_breakup(&archive_id, None).await,
        Err(ArchiveError::RecoveryExpired)
    ));
}

#[tokio::test]
async fn non_recoverable_archive_refuses_recovery() {
    let fx = fixture().await;

    let outcome = fx
        .archival
        .activate_breakup_mode("user-1", "c1", &BreakupOptions::default())
        .await
        .unwrap();
    let archive_id = outcome.archive_id.unwrap();

    fx.store
        .patch_archive(&archive_id, |archive| {
            archive.is_recoverable = false;
        })
        .await;

    assert!(matches!(
        fx.archival.recover_from_breakup(&archive_id, None).await,
        Err(ArchiveError::RecoveryExpired)
    ));
}

#[tokio::test]
async fn unknown_archive_is_not_found() {
    let fx = fixture().await;
    assert!(matches!(
        fx.archival.recover_from_breakup("no-such-archive", None).await,
        Err(ArchiveError::NotFound(_))
    ));
}

#[tokio::test]
async fn no_recovery_breakup_erases_keys_and_orphans_ciphertext() {
    let fx = fixture().await;
    fx.content
        .create_secure_entry("c1", "user-1", "never archived", None, vec![])
        .await
        .unwrap();

    let outcome = fx
        .archival
        .activate_breakup_mode(
            "user-1",
            "c1",
            &BreakupOptions {
                archive_data: false,
                allow_data_recovery: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(outcome.archive_id.is_none());

    // Keys are gone for good.
    assert!(fx.keys.get_diary_key("c1").await.unwrap().is_none());
    assert!(!fx.keys.is_encryption_enabled("c1").await.unwrap());

    // The un-archived entry survives only as unreadable ciphertext.
    let entries = fx.content.get_secure_entries("c1", None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_encrypted);
}

#[tokio::test]
async fn delete_flag_removes_shared_data_outright() {
    let fx = fixture().await;
    fx.content
        .create_secure_entry("c1", "user-1", "gone with the flag", None, vec![])
        .await
        .unwrap();

    fx.archival
        .activate_breakup_mode(
            "user-1",
            "c1",
            &BreakupOptions {
                archive_data: false,
                delete_shared_data: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(fx.store.fetch_entries("c1", None).await.unwrap().is_empty());
    assert!(!fx.store.is_restricted("c1").await);
}

#[tokio::test]
async fn export_before_breakup_returns_a_download() {
    let fx = fixture().await;
    fx.content
        .create_secure_entry("c1", "user-1", "take this with you", None, vec![])
        .await
        .unwrap();

    let outcome = fx
        .archival
        .activate_breakup_mode(
            "user-1",
            "c1",
            &BreakupOptions {
                export_before_breakup: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let export = outcome.export.unwrap();
    assert!(export.file_name.starts_with("couples-diary-export-"));
    assert!(export.payload.contains("take this with you"));
}

#[tokio::test]
async fn notification_failure_does_not_roll_back_the_breakup() {
    let fx = fixture().await;
    fx.store.break_notifications();

    let outcome = fx
        .archival
        .activate_breakup_mode("user-1", "c1", &BreakupOptions::default())
        .await
        .unwrap();
    assert!(outcome.archive_id.is_some());

    let couple = fx.store.fetch_couple("c1").await.unwrap().unwrap();
    assert_eq!(couple.status, CoupleStatus::Ended);
    assert!(fx.store.delivered_notifications().await.is_empty());
}

#[tokio::test]
async fn permanent_deletion_erases_keys_then_data() {
    let fx = fixture().await;
    fx.content
        .create_secure_entry("c1", "user-1", "to be destroyed", None, vec![])
        .await
        .unwrap();

    fx.archival
        .permanently_delete_data("c1", "user-1")
        .await
        .unwrap();

    assert!(fx.keys.get_diary_key("c1").await.unwrap().is_none());
    assert!(fx.store.fetch_entries("c1", None).await.unwrap().is_empty());
    let couple = fx.store.fetch_couple("c1").await.unwrap().unwrap();
    assert_eq!(couple.status, CoupleStatus::Ended);
}
