use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{FriendStore, GroupStore, IdentityStore, MessageStore};
use crate::error::{AppError, AppResult};
use crate::models::friend;
use crate::models::{
    FriendGraphError, FriendOp, FriendSets, FriendStatus, Group, GroupId, Identity,
    MessagePayload, MessageTarget, Profile, StoredMessage, UserId,
};

struct UserRecord {
    identity: Identity,
    friends: FriendSets,
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, UserRecord>,
    messages: Vec<StoredMessage>,
    groups: Vec<Group>,
    next_seq: i64,
}

/// Process-local storage; every operation runs under one lock
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStorage {
    async fn create(&self, identity: Identity) -> AppResult<Identity> {
        let mut guard = self.inner.write().await;
        if guard
            .users
            .values()
            .any(|u| u.identity.username == identity.username)
        {
            return Err(AppError::Conflict("Username already used".into()));
        }

        guard.users.insert(
            identity.id,
            UserRecord {
                identity: identity.clone(),
                friends: FriendSets::default(),
            },
        );
        Ok(identity)
    }

    async fn get(&self, id: UserId) -> AppResult<Option<Identity>> {
        let guard = self.inner.read().await;
        Ok(guard.users.get(&id).map(|u| u.identity.clone()))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<Identity>> {
        let guard = self.inner.read().await;
        Ok(guard
            .users
            .values()
            .find(|u| u.identity.username == username)
            .map(|u| u.identity.clone()))
    }

    async fn set_public_key(&self, id: UserId, public_key: &str) -> AppResult<bool> {
        let mut guard = self.inner.write().await;
        match guard.users.get_mut(&id) {
            Some(user) => {
                user.identity.public_key = Some(public_key.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn profiles(&self, ids: &[UserId]) -> AppResult<Vec<Profile>> {
        let guard = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| guard.users.get(id))
            .map(|u| u.identity.profile())
            .collect())
    }
}

#[async_trait]
impl FriendStore for MemoryStorage {
    async fn friend_sets(&self, id: UserId) -> AppResult<Option<FriendSets>> {
        let guard = self.inner.read().await;
        Ok(guard.users.get(&id).map(|u| u.friends.clone()))
    }

    async fn apply(&self, op: FriendOp, actor: UserId, other: UserId) -> AppResult<FriendStatus> {
        let mut guard = self.inner.write().await;

        if !guard.users.contains_key(&actor) || !guard.users.contains_key(&other) {
            return Err(FriendGraphError::UserNotFound.into());
        }

        // Work on copies so a rejected transition leaves the table untouched
        let mut actor_sets = guard.users[&actor].friends.clone();
        let mut other_sets = guard.users[&other].friends.clone();
        let status = friend::apply(op, actor, &mut actor_sets, other, &mut other_sets)?;

        if let Some(user) = guard.users.get_mut(&actor) {
            user.friends = actor_sets;
        }
        if let Some(user) = guard.users.get_mut(&other) {
            user.friends = other_sets;
        }
        Ok(status)
    }
}

#[async_trait]
impl MessageStore for MemoryStorage {
    async fn append(
        &self,
        sender: UserId,
        target: MessageTarget,
        payload: MessagePayload,
    ) -> AppResult<StoredMessage> {
        let mut guard = self.inner.write().await;
        guard.next_seq += 1;
        let message = StoredMessage {
            seq: guard.next_seq,
            sender,
            target,
            payload,
            created_at: Utc::now(),
        };
        guard.messages.push(message.clone());
        Ok(message)
    }

    async fn conversation(&self, a: UserId, b: UserId) -> AppResult<Vec<StoredMessage>> {
        let guard = self.inner.read().await;
        Ok(guard
            .messages
            .iter()
            .filter(|m| match m.target {
                MessageTarget::Direct(to) => {
                    (m.sender == a && to == b) || (m.sender == b && to == a)
                }
                MessageTarget::Group(_) => false,
            })
            .cloned()
            .collect())
    }

    async fn group_messages(&self, group_id: GroupId) -> AppResult<Vec<StoredMessage>> {
        let guard = self.inner.read().await;
        Ok(guard
            .messages
            .iter()
            .filter(|m| m.target == MessageTarget::Group(group_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl GroupStore for MemoryStorage {
    async fn create(&self, group: Group) -> AppResult<Group> {
        let mut guard = self.inner.write().await;
        guard.groups.push(group.clone());
        Ok(group)
    }

    async fn get(&self, id: GroupId) -> AppResult<Option<Group>> {
        let guard = self.inner.read().await;
        Ok(guard.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn for_member(&self, user: UserId) -> AppResult<Vec<Group>> {
        let guard = self.inner.read().await;
        Ok(guard
            .groups
            .iter()
            .filter(|g| g.is_member(user))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user(store: &MemoryStorage, name: &str) -> UserId {
        IdentityStore::create(store, Identity::new(name, None))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_usernames_are_unique() {
        let store = MemoryStorage::new();
        user(&store, "alice").await;

        let err = IdentityStore::create(&store, Identity::new("alice", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_by_username() {
        let store = MemoryStorage::new();
        let alice = user(&store, "alice").await;

        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, alice);
        assert!(store.find_by_username("Alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_transition_does_not_mutate() {
        let store = MemoryStorage::new();
        let a = user(&store, "alice").await;
        let b = user(&store, "bob").await;

        store.apply(FriendOp::Request, a, b).await.unwrap();
        let before = store.friend_sets(b).await.unwrap();

        let err = store.apply(FriendOp::Request, b, a).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Friend(FriendGraphError::RequestPending)
        ));
        assert_eq!(store.friend_sets(b).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_unknown_user_is_reported() {
        let store = MemoryStorage::new();
        let a = user(&store, "alice").await;

        let err = store
            .apply(FriendOp::Request, a, UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Friend(FriendGraphError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_conversation_is_ordered_and_scoped() {
        let store = MemoryStorage::new();
        let a = user(&store, "alice").await;
        let b = user(&store, "bob").await;
        let c = user(&store, "carol").await;

        store
            .append(a, MessageTarget::Direct(b), MessagePayload::text("one"))
            .await
            .unwrap();
        store
            .append(a, MessageTarget::Direct(c), MessagePayload::text("other"))
            .await
            .unwrap();
        store
            .append(b, MessageTarget::Direct(a), MessagePayload::text("two"))
            .await
            .unwrap();

        let bodies: Vec<String> = store
            .conversation(b, a)
            .await
            .unwrap()
            .iter()
            .map(|m| m.payload.body().to_string())
            .collect();
        assert_eq!(bodies, vec!["one", "two"]);
    }
}
