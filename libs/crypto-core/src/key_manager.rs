use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::key_store::{KeyStore, StoredKeys};
use crate::keys::IdentityKeypair;
use crate::{envelope, CryptoError, CryptoResult};

/// Uploads a public key so peers can encrypt for this identity
#[async_trait]
pub trait KeyPublisher: Send + Sync {
    async fn publish(&self, user_id: &str, public_key_b64: &str) -> CryptoResult<()>;
}

/// Publishes through `POST {base_url}/api/identity/{id}/public-key`
#[derive(Debug, Clone)]
pub struct HttpKeyPublisher {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishKeyRequest<'a> {
    public_key: &'a str,
}

impl HttpKeyPublisher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl KeyPublisher for HttpKeyPublisher {
    async fn publish(&self, user_id: &str, public_key_b64: &str) -> CryptoResult<()> {
        let url = format!("{}/api/identity/{}/public-key", self.base_url, user_id);
        let response = self
            .client
            .post(&url)
            .json(&PublishKeyRequest {
                public_key: public_key_b64,
            })
            .send()
            .await
            .map_err(|e| CryptoError::Publish(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CryptoError::Publish(format!("{status}: {body}")));
        }
        Ok(())
    }
}

/// Per-identity key lifecycle: load or generate, publish once, encrypt and
/// decrypt message bodies.
pub struct KeyManager {
    user_id: String,
    store: Arc<dyn KeyStore>,
    keypair: Option<IdentityKeypair>,
    published: bool,
}

impl KeyManager {
    pub fn new(user_id: impl Into<String>, store: Arc<dyn KeyStore>) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            keypair: None,
            published: false,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Load keys from the store, generating and persisting a new pair if none
    /// exist. Returns `true` when a new pair was created.
    pub fn ensure_keys(&mut self) -> CryptoResult<bool> {
        if self.keypair.is_some() {
            return Ok(false);
        }

        if let Some(stored) = self.store.load(&self.user_id)? {
            let keypair = IdentityKeypair::from_private_base64(&stored.private_key)?;
            if keypair.public_key_base64() != stored.public_key {
                warn!(user_id = %self.user_id, "stored public key does not match private key; using derived key");
            }
            debug!(user_id = %self.user_id, "loaded existing identity keys");
            self.published = stored.published;
            self.keypair = Some(keypair);
            return Ok(false);
        }

        let keypair = IdentityKeypair::generate()?;
        let stored = StoredKeys {
            user_id: self.user_id.clone(),
            public_key: keypair.public_key_base64().to_string(),
            private_key: keypair.private_key_base64()?.to_string(),
            published: false,
        };
        self.store.save(&stored)?;
        info!(user_id = %self.user_id, "generated identity keys");

        self.published = false;
        self.keypair = Some(keypair);
        Ok(true)
    }

    /// Upload the public key unless this identity already did so.
    ///
    /// Returns `Ok(false)` when the upload was skipped.
    pub async fn publish_public_key(&mut self, publisher: &dyn KeyPublisher) -> CryptoResult<bool> {
        self.ensure_keys()?;
        if self.published {
            debug!(user_id = %self.user_id, "public key already published; skipping");
            return Ok(false);
        }

        let public_key = self.public_key_base64()?.to_string();
        publisher.publish(&self.user_id, &public_key).await?;

        if let Some(mut stored) = self.store.load(&self.user_id)? {
            stored.published = true;
            self.store.save(&stored)?;
        }
        self.published = true;
        info!(user_id = %self.user_id, "public key published");
        Ok(true)
    }

    pub fn public_key_base64(&self) -> CryptoResult<&str> {
        self.keypair
            .as_ref()
            .map(IdentityKeypair::public_key_base64)
            .ok_or_else(|| CryptoError::Store(format!("no keys loaded for {}", self.user_id)))
    }

    /// Encrypt a body for a recipient; `None` means the recipient has no
    /// published key and the plaintext is sent as-is.
    pub fn encrypt_for(
        &self,
        recipient_public_key: Option<&str>,
        plaintext: &str,
    ) -> CryptoResult<String> {
        envelope::encrypt_for(recipient_public_key, plaintext)
    }

    /// Decrypt a body addressed to this identity. Never fails: bodies that are
    /// not ciphertext, or that do not decrypt, come back unchanged.
    pub fn decrypt_own(&self, body: &str) -> String {
        match &self.keypair {
            Some(keypair) => keypair.decrypt_own(body),
            None => body.to_string(),
        }
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("user_id", &self.user_id)
            .field("has_keys", &self.keypair.is_some())
            .field("published", &self.published)
            .finish()
    }
}
