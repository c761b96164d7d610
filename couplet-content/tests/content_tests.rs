//! Content service tests: encrypt-on-write, decrypt-on-read, undecryptable
//! passthrough, and the partial-failure-tolerant rotation sweep.

use couplet_content::{ContentError, EntryUpdate, SecureContentService};
use couplet_crypto::Envelope;
use couplet_keys::{KeyManager, SessionKeyStore};
use couplet_store::{EntryStore, MemoryStore};
use couplet_types::{MediaAttachment, MediaKind, Mood, new_id};
use std::sync::Arc;

struct Fixture {
    service: SecureContentService,
    keys: Arc<KeyManager>,
    store: MemoryStore,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let keys = Arc::new(KeyManager::new(
        SessionKeyStore::new(),
        Arc::new(store.clone()),
    ));
    let service = SecureContentService::new(keys.clone(), Arc::new(store.clone()));
    Fixture {
        service,
        keys,
        store,
    }
}

fn photo(file_name: &str) -> MediaAttachment {
    MediaAttachment {
        id: new_id(),
        kind: MediaKind::Photo,
        file_name: file_name.into(),
        source_url: format!("https://cdn.example/{file_name}"),
        is_encrypted: false,
    }
}

#[tokio::test]
async fn created_entry_is_enveloped_at_rest_and_readable_on_fetch() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    let view = fx
        .service
        .create_secure_entry("c1", "user-1", "Had a great day!", Some(Mood::Happy), vec![])
        .await
        .unwrap();

    // The caller gets the decrypted view back.
    assert_eq!(view.content, "Had a great day!");
    assert!(!view.is_encrypted);

    // At rest the content field is an envelope JSON string.
    let stored = fx.store.fetch_entry(&view.id).await.unwrap().unwrap();
    assert!(stored.is_encrypted);
    assert_ne!(stored.content, "Had a great day!");
    let value: serde_json::Value = serde_json::from_str(&stored.content).unwrap();
    assert!(Envelope::is_envelope_shaped(&value));

    let entries = fx.service.get_secure_entries("c1", None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "Had a great day!");
    assert_eq!(entries[0].mood, Some(Mood::Happy));
}

#[tokio::test]
async fn create_without_keys_fails_before_any_write() {
    let fx = fixture();

    let err = fx
        .service
        .create_secure_entry("c1", "user-1", "never stored", None, vec![])
        .await
        .unwrap_err();

    assert!(matches!(err, ContentError::EncryptionUnavailable(_)));
    assert_eq!(fx.store.write_op_count(), 0);
}

#[tokio::test]
async fn media_metadata_is_sealed_under_the_media_key() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    let view = fx
        .service
        .create_secure_entry("c1", "user-1", "beach day", None, vec![photo("beach.jpg")])
        .await
        .unwrap();
    assert_eq!(view.media[0].file_name, "beach.jpg");

    let stored = fx.store.fetch_entry(&view.id).await.unwrap().unwrap();
    assert!(stored.media[0].is_encrypted);
    assert_ne!(stored.media[0].file_name, "beach.jpg");
    assert_ne!(
        stored.media[0].source_url,
        "https://cdn.example/beach.jpg"
    );

    let entries = fx.service.get_secure_entries("c1", None).await.unwrap();
    assert_eq!(entries[0].media[0].file_name, "beach.jpg");
    assert!(!entries[0].media[0].is_encrypted);
}

#[tokio::test]
async fn update_reencrypts_only_present_fields() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    let created = fx
        .service
        .create_secure_entry("c1", "user-1", "original", Some(Mood::Content), vec![])
        .await
        .unwrap();
    let before = fx.store.fetch_entry(&created.id).await.unwrap().unwrap();

    // Mood-only update: stored ciphertext must stay byte-identical.
    let updated = fx
        .service
        .update_secure_entry(
            &created.id,
            "c1",
            EntryUpdate {
                mood: Some(Mood::Excited),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.mood, Some(Mood::Excited));
    let after = fx.store.fetch_entry(&created.id).await.unwrap().unwrap();
    assert_eq!(before.content, after.content);

    // Content update: new ciphertext, readable round trip.
    let updated = fx
        .service
        .update_secure_entry(
            &created.id,
            "c1",
            EntryUpdate {
                content: Some("rewritten".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.content, "rewritten");
    let after = fx.store.fetch_entry(&created.id).await.unwrap().unwrap();
    assert_ne!(after.content, before.content);
}

#[tokio::test]
async fn undecryptable_entries_come_back_raw_not_dropped() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    fx.service
        .create_secure_entry("c1", "user-1", "secret one", None, vec![])
        .await
        .unwrap();
    fx.service
        .create_secure_entry("c1", "user-1", "secret two", None, vec![])
        .await
        .unwrap();

    fx.keys.clear_couple_keys("c1").await.unwrap();

    let entries = fx.service.get_secure_entries("c1", None).await.unwrap();
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert!(entry.is_encrypted);
        let value: serde_json::Value = serde_json::from_str(&entry.content).unwrap();
        assert!(Envelope::is_envelope_shaped(&value));
    }
}

#[tokio::test]
async fn tampered_entry_comes_back_raw_while_others_decrypt() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    let good = fx
        .service
        .create_secure_entry("c1", "user-1", "intact", None, vec![])
        .await
        .unwrap();
    let victim = fx
        .service
        .create_secure_entry("c1", "user-1", "to be corrupted", None, vec![])
        .await
        .unwrap();

    // Corrupt the stored ciphertext out-of-band.
    let mut raw = fx.store.fetch_entry(&victim.id).await.unwrap().unwrap();
    let mut envelope = Envelope::from_json(&raw.content).unwrap();
    envelope.ciphertext[0] ^= 0xFF;
    raw.content = envelope.to_json().unwrap();
    fx.store.update_entry(&raw).await.unwrap();

    let entries = fx.service.get_secure_entries("c1", None).await.unwrap();
    let intact = entries.iter().find(|e| e.id == good.id).unwrap();
    let corrupted = entries.iter().find(|e| e.id == victim.id).unwrap();

    assert_eq!(intact.content, "intact");
    assert!(corrupted.is_encrypted);
}

#[tokio::test]
async fn decrypt_entry_is_idempotent() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    let view = fx
        .service
        .create_secure_entry("c1", "user-1", "once", None, vec![])
        .await
        .unwrap();

    // Already decrypted: passes through unchanged.
    let again = fx.service.decrypt_entry(view.clone(), "c1").await.unwrap();
    assert_eq!(again, view);

    // Raw stored entry decrypts to the same view content.
    let stored = fx.store.fetch_entry(&view.id).await.unwrap().unwrap();
    let opened = fx.service.decrypt_entry(stored, "c1").await.unwrap();
    assert_eq!(opened.content, "once");
    assert!(!opened.is_encrypted);
}

#[tokio::test]
async fn sweep_migrates_all_entries_to_the_new_generation() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    for text in ["first", "second", "third"] {
        fx.service
            .create_secure_entry("c1", "user-1", text, None, vec![photo("pic.jpg")])
            .await
            .unwrap();
    }

    let rotation = fx.keys.rotate_keys("c1").await.unwrap();
    let report = fx
        .service
        .reencrypt_all_entries("c1", rotation.previous(), rotation.current())
        .await
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.unprocessed(), 0);
    rotation.finish(report.unprocessed()).unwrap();

    // Everything readable under the active (new) keys.
    let entries = fx.service.get_secure_entries("c1", None).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| !e.is_encrypted));
    assert!(entries.iter().all(|e| e.media[0].file_name == "pic.jpg"));
}

#[tokio::test]
async fn sweep_tolerates_corrupt_entries_and_reports_them() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    let ok1 = fx
        .service
        .create_secure_entry("c1", "user-1", "fine", None, vec![])
        .await
        .unwrap();
    let victim = fx
        .service
        .create_secure_entry("c1", "user-1", "doomed", None, vec![])
        .await
        .unwrap();
    let ok2 = fx
        .service
        .create_secure_entry("c1", "user-1", "also fine", None, vec![])
        .await
        .unwrap();

    let mut raw = fx.store.fetch_entry(&victim.id).await.unwrap().unwrap();
    raw.content = "{not an envelope at all".into();
    fx.store.update_entry(&raw).await.unwrap();

    let rotation = fx.keys.rotate_keys("c1").await.unwrap();
    let report = fx
        .service
        .reencrypt_all_entries("c1", rotation.previous(), rotation.current())
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entry_id, victim.id);

    // Old keys must not be disposable while the sweep reports failures.
    let rotation = rotation.finish(report.unprocessed()).unwrap_err();
    drop(rotation);

    let entries = fx.service.get_secure_entries("c1", None).await.unwrap();
    let readable: Vec<_> = entries.iter().filter(|e| !e.is_encrypted).collect();
    assert_eq!(readable.len(), 2);
    assert!(readable.iter().any(|e| e.id == ok1.id));
    assert!(readable.iter().any(|e| e.id == ok2.id));
}

#[tokio::test]
async fn discarding_old_keys_before_the_sweep_orphans_old_ciphertext() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    fx.service
        .create_secure_entry("c1", "user-1", "written before rotation", None, vec![])
        .await
        .unwrap();

    // Rotation hazard: dropping the handle zeroizes the old keys with no
    // sweep having run. Pre-rotation ciphertext is now unreadable.
    let rotation = fx.keys.rotate_keys("c1").await.unwrap();
    drop(rotation);

    let entries = fx.service.get_secure_entries("c1", None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_encrypted);
}

#[tokio::test]
async fn integrity_validation_never_errors() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    let view = fx
        .service
        .create_secure_entry("c1", "user-1", "check me", None, vec![])
        .await
        .unwrap();
    let stored = fx.store.fetch_entry(&view.id).await.unwrap().unwrap();

    assert!(fx.service.validate_entry_integrity(&stored, "c1").await);

    // Plaintext entries are trivially valid.
    assert!(fx.service.validate_entry_integrity(&view, "c1").await);

    // Tampering flips the verdict, without an error.
    let mut tampered = stored.clone();
    let mut envelope = Envelope::from_json(&tampered.content).unwrap();
    envelope.ciphertext[0] ^= 0x01;
    tampered.content = envelope.to_json().unwrap();
    assert!(!fx.service.validate_entry_integrity(&tampered, "c1").await);

    // Missing keys mean integrity cannot be proven.
    fx.keys.clear_couple_keys("c1").await.unwrap();
    assert!(!fx.service.validate_entry_integrity(&stored, "c1").await);
}

#[tokio::test]
async fn delete_secure_entry_removes_the_record() {
    let fx = fixture();
    fx.keys
        .initialize_couple_keys("user-1", "c1", None)
        .await
        .unwrap();

    let view = fx
        .service
        .create_secure_entry("c1", "user-1", "short lived", None, vec![])
        .await
        .unwrap();

    fx.service.delete_secure_entry(&view.id, "c1").await.unwrap();
    assert!(fx.store.fetch_entry(&view.id).await.unwrap().is_none());

    assert!(matches!(
        fx.service.delete_secure_entry(&view.id, "c1").await,
        Err(ContentError::NotFound(_))
    ));
}
