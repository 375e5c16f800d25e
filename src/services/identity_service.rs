use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Identity, Profile, UserId};
use crate::storage::IdentityStore;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterIdentity {
    #[validate(length(min = 3, max = 20, message = "username must be 3-20 characters"))]
    pub username: String,
    #[validate(length(max = 2048))]
    pub avatar_image: Option<String>,
}

#[derive(Clone)]
pub struct IdentityService {
    identities: Arc<dyn IdentityStore>,
}

impl IdentityService {
    pub fn new(identities: Arc<dyn IdentityStore>) -> Self {
        Self { identities }
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, mut request: RegisterIdentity) -> AppResult<Identity> {
        request.username = request.username.trim().to_string();
        request.validate()?;

        let identity = self
            .identities
            .create(Identity::new(request.username, request.avatar_image))
            .await?;
        tracing::info!(user_id = %identity.id, "identity registered");
        Ok(identity)
    }

    pub async fn get(&self, id: UserId) -> AppResult<Identity> {
        self.identities
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    /// Directory lookup so a friend request can start from a username
    pub async fn find_by_username(&self, username: &str) -> AppResult<Profile> {
        self.identities
            .find_by_username(username.trim())
            .await?
            .map(|identity| identity.profile())
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    /// Store the identity's public key. Publishing the same key again is a no-op.
    #[instrument(skip(self, public_key))]
    pub async fn publish_public_key(&self, id: UserId, public_key: &str) -> AppResult<()> {
        let public_key = public_key.trim();
        if public_key.is_empty() {
            return Err(AppError::BadRequest("publicKey is required".into()));
        }
        crypto_core::parse_public_key(public_key)
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if !self.identities.set_public_key(id, public_key).await? {
            return Err(AppError::NotFound("User not found".into()));
        }
        tracing::info!(user_id = %id, "public key published");
        Ok(())
    }
}
