//! Client-side key management and message encryption
//!
//! Every identity owns one RSA-2048 keypair. The public half is published to
//! the chat server as base64 SPKI DER; the private half stays in the local
//! [`KeyStore`] as base64 PKCS#8 DER and is never transmitted.
//!
//! Message bodies are encrypted with RSA-OAEP/SHA-256. There is exactly one
//! scheme and no version tag on the wire, so decryption has to guess whether a
//! body is ciphertext at all (see [`envelope::looks_like_ciphertext`]).

pub mod envelope;
pub mod key_manager;
pub mod key_store;
pub mod keys;

pub use envelope::{decrypt_own, encrypt_for, looks_like_ciphertext, MIN_CIPHERTEXT_LEN};
pub use key_manager::{HttpKeyPublisher, KeyManager, KeyPublisher};
pub use key_store::{FileKeyStore, KeyStore, MemoryKeyStore, StoredKeys};
pub use keys::{parse_public_key, IdentityKeypair, RSA_KEY_BITS};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("key encoding error: {0}")]
    KeyEncoding(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("plaintext too long for RSA-OAEP: {len} bytes (max {max})")]
    PlaintextTooLong { len: usize, max: usize },

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("key store error: {0}")]
    Store(String),

    #[error("key publication failed: {0}")]
    Publish(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
