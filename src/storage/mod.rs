//! Persistence seams
//!
//! Every store is a trait object so the service layer runs unchanged over
//! Postgres in production and over the in-memory backend in tests or when no
//! `DATABASE_URL` is configured.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::AppResult;
use crate::models::{
    FriendOp, FriendSets, FriendStatus, Group, GroupId, Identity, MessagePayload, MessageTarget,
    Profile, StoredMessage, UserId,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fails with `AppError::Conflict` when the username is taken
    async fn create(&self, identity: Identity) -> AppResult<Identity>;

    async fn get(&self, id: UserId) -> AppResult<Option<Identity>>;

    /// Exact, case-sensitive username match
    async fn find_by_username(&self, username: &str) -> AppResult<Option<Identity>>;

    /// Returns false when the identity does not exist
    async fn set_public_key(&self, id: UserId, public_key: &str) -> AppResult<bool>;

    /// Display metadata for the given ids, in the given order; unknown ids are skipped
    async fn profiles(&self, ids: &[UserId]) -> AppResult<Vec<Profile>>;
}

#[async_trait]
pub trait FriendStore: Send + Sync {
    async fn friend_sets(&self, id: UserId) -> AppResult<Option<FriendSets>>;

    /// Apply one transition to both documents atomically
    async fn apply(&self, op: FriendOp, actor: UserId, other: UserId) -> AppResult<FriendStatus>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(
        &self,
        sender: UserId,
        target: MessageTarget,
        payload: MessagePayload,
    ) -> AppResult<StoredMessage>;

    /// Direct messages between two identities, oldest first
    async fn conversation(&self, a: UserId, b: UserId) -> AppResult<Vec<StoredMessage>>;

    /// Messages posted to a group, oldest first
    async fn group_messages(&self, group_id: GroupId) -> AppResult<Vec<StoredMessage>>;
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn create(&self, group: Group) -> AppResult<Group>;

    async fn get(&self, id: GroupId) -> AppResult<Option<Group>>;

    /// Groups the user belongs to, oldest first
    async fn for_member(&self, user: UserId) -> AppResult<Vec<Group>>;
}

/// The set of stores backing one server instance
#[derive(Clone)]
pub struct Storage {
    pub identities: Arc<dyn IdentityStore>,
    pub friends: Arc<dyn FriendStore>,
    pub messages: Arc<dyn MessageStore>,
    pub groups: Arc<dyn GroupStore>,
}

impl Storage {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStorage::new());
        Self {
            identities: store.clone(),
            friends: store.clone(),
            messages: store.clone(),
            groups: store,
        }
    }

    pub fn postgres(pool: deadpool_postgres::Pool) -> Self {
        let store = Arc::new(PostgresStorage::new(pool));
        Self {
            identities: store.clone(),
            friends: store.clone(),
            messages: store.clone(),
            groups: store,
        }
    }
}
