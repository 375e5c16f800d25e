use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crypto_core::{
    encrypt_for, looks_like_ciphertext, CryptoError, CryptoResult, FileKeyStore, IdentityKeypair,
    KeyManager, KeyPublisher, KeyStore, MemoryKeyStore,
};
use once_cell::sync::Lazy;

// Key generation dominates test time; share one pair where identity does not matter.
static BOB: Lazy<IdentityKeypair> =
    Lazy::new(|| IdentityKeypair::generate().expect("generate keypair"));

#[derive(Default)]
struct RecordingPublisher {
    calls: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl KeyPublisher for RecordingPublisher {
    async fn publish(&self, user_id: &str, public_key_b64: &str) -> CryptoResult<()> {
        if self.fail {
            return Err(CryptoError::Publish("server unavailable".into()));
        }
        self.calls
            .lock()
            .unwrap()
            .push((user_id.to_string(), public_key_b64.to_string()));
        Ok(())
    }
}

#[test]
fn test_encrypt_then_decrypt_round_trip() {
    let ciphertext = encrypt_for(Some(BOB.public_key_base64()), "hello bob").unwrap();

    assert_ne!(ciphertext, "hello bob");
    assert!(looks_like_ciphertext(&ciphertext));
    assert_eq!(BOB.decrypt_own(&ciphertext), "hello bob");
}

#[test]
fn test_ciphertext_is_randomized() {
    let a = encrypt_for(Some(BOB.public_key_base64()), "same body").unwrap();
    let b = encrypt_for(Some(BOB.public_key_base64()), "same body").unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_absent_key_sends_plaintext() {
    let body = encrypt_for(None, "hello bob").unwrap();
    assert_eq!(body, "hello bob");
    // Receiver sees the plaintext untouched
    assert_eq!(BOB.decrypt_own(&body), "hello bob");
}

#[test]
fn test_decrypt_with_wrong_key_returns_input() {
    let carol = IdentityKeypair::generate().unwrap();
    let ciphertext = encrypt_for(Some(carol.public_key_base64()), "for carol").unwrap();

    assert_eq!(BOB.decrypt_own(&ciphertext), ciphertext);
}

#[test]
fn test_long_base64_plaintext_is_returned_unchanged() {
    // Misclassified as ciphertext; decryption fails and the text comes back
    let body = "QUJD".repeat(40);
    assert!(looks_like_ciphertext(&body));
    assert_eq!(BOB.decrypt_own(&body), body);
}

#[test]
fn test_plaintext_over_oaep_limit_is_rejected() {
    let body = "x".repeat(BOB.max_plaintext_len() + 1);
    let err = encrypt_for(Some(BOB.public_key_base64()), &body).unwrap_err();
    assert!(matches!(err, CryptoError::PlaintextTooLong { max: 190, .. }));

    let fits = "x".repeat(BOB.max_plaintext_len());
    let ciphertext = encrypt_for(Some(BOB.public_key_base64()), &fits).unwrap();
    assert_eq!(BOB.decrypt_own(&ciphertext), fits);
}

#[test]
fn test_unicode_round_trip() {
    let body = "héllo 👋 世界";
    let ciphertext = encrypt_for(Some(BOB.public_key_base64()), body).unwrap();
    assert_eq!(BOB.decrypt_own(&ciphertext), body);
}

#[test]
fn test_invalid_recipient_key_is_an_error() {
    let err = encrypt_for(Some("definitely-not-a-key"), "hi").unwrap_err();
    assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
}

#[tokio::test]
async fn test_key_manager_generates_once_and_publishes_once() {
    let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
    let publisher = RecordingPublisher::default();

    let mut first = KeyManager::new("alice", store.clone());
    assert!(first.ensure_keys().unwrap());
    assert!(first.publish_public_key(&publisher).await.unwrap());
    let public_key = first.public_key_base64().unwrap().to_string();

    // A second session for the same identity reuses the stored pair
    let mut second = KeyManager::new("alice", store.clone());
    assert!(!second.ensure_keys().unwrap());
    assert_eq!(second.public_key_base64().unwrap(), public_key);
    assert!(!second.publish_public_key(&publisher).await.unwrap());

    let calls = publisher.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], ("alice".to_string(), public_key));
}

#[tokio::test]
async fn test_failed_publish_is_retried_next_session() {
    let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());

    let mut first = KeyManager::new("dave", store.clone());
    first.ensure_keys().unwrap();
    let failing = RecordingPublisher {
        fail: true,
        ..Default::default()
    };
    assert!(first.publish_public_key(&failing).await.is_err());

    let publisher = RecordingPublisher::default();
    let mut second = KeyManager::new("dave", store);
    assert!(second.publish_public_key(&publisher).await.unwrap());
    assert_eq!(publisher.calls.lock().unwrap().len(), 1);
}

#[test]
fn test_key_manager_decrypts_messages_encrypted_for_it() {
    let mut manager = KeyManager::new("erin", Arc::new(MemoryKeyStore::new()));
    manager.ensure_keys().unwrap();

    let public_key = manager.public_key_base64().unwrap().to_string();
    let ciphertext = manager.encrypt_for(Some(&public_key), "note to self").unwrap();

    assert_eq!(manager.decrypt_own(&ciphertext), "note to self");
    assert_eq!(manager.decrypt_own("plain text"), "plain text");
}

#[test]
fn test_file_key_store_persists_across_managers() {
    let dir = std::env::temp_dir().join(format!("crypto-core-test-{}", std::process::id()));
    let store: Arc<dyn KeyStore> = Arc::new(FileKeyStore::new(&dir));

    let mut first = KeyManager::new("frank", store.clone());
    assert!(first.ensure_keys().unwrap());
    let public_key = first.public_key_base64().unwrap().to_string();

    let mut second = KeyManager::new("frank", store);
    assert!(!second.ensure_keys().unwrap());
    assert_eq!(second.public_key_base64().unwrap(), public_key);

    let _ = std::fs::remove_dir_all(dir);
}
