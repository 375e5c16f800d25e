use std::sync::Arc;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::models::{Group, GroupId, GroupMessageEntry, MessagePayload, MessageTarget, UserId};
use crate::storage::{GroupStore, IdentityStore, MessageStore};

/// Group membership and durable group history
///
/// Live fan-out is done by the router over the member list the client sends.
#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupStore>,
    identities: Arc<dyn IdentityStore>,
    messages: Arc<dyn MessageStore>,
}

impl GroupService {
    pub fn new(
        groups: Arc<dyn GroupStore>,
        identities: Arc<dyn IdentityStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            groups,
            identities,
            messages,
        }
    }

    #[instrument(skip(self, member_ids), fields(members = member_ids.len()))]
    pub async fn create(&self, name: &str, admin: UserId, member_ids: &[UserId]) -> AppResult<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Group name is required".into()));
        }

        let group = Group::new(name, admin, member_ids);
        let known = self.identities.profiles(&group.members).await?;
        if known.len() != group.members.len() {
            return Err(AppError::NotFound("User not found".into()));
        }

        let group = self.groups.create(group).await?;
        tracing::info!(group_id = %group.id, admin = %admin, "group created");
        Ok(group)
    }

    pub async fn for_member(&self, user: UserId) -> AppResult<Vec<Group>> {
        self.groups.for_member(user).await
    }

    #[instrument(skip(self, payload))]
    pub async fn post_message(
        &self,
        from: UserId,
        group_id: GroupId,
        payload: MessagePayload,
    ) -> AppResult<GroupMessageEntry> {
        let group = self.group(group_id).await?;
        if !group.is_member(from) {
            return Err(AppError::Forbidden("Not a group member".into()));
        }

        let stored = self
            .messages
            .append(from, MessageTarget::Group(group_id), payload)
            .await?;
        Ok(GroupMessageEntry::from_stored(&stored, group_id))
    }

    pub async fn messages(&self, group_id: GroupId) -> AppResult<Vec<GroupMessageEntry>> {
        self.group(group_id).await?;
        let messages = self.messages.group_messages(group_id).await?;
        Ok(messages
            .iter()
            .map(|m| GroupMessageEntry::from_stored(m, group_id))
            .collect())
    }

    async fn group(&self, id: GroupId) -> AppResult<Group> {
        self.groups
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Group not found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;
    use crate::storage::MemoryStorage;

    async fn setup() -> (GroupService, UserId, UserId, UserId) {
        let store = Arc::new(MemoryStorage::new());
        let mut ids = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let identity = IdentityStore::create(store.as_ref(), Identity::new(name, None))
                .await
                .unwrap();
            ids.push(identity.id);
        }
        let service = GroupService::new(store.clone(), store.clone(), store);
        (service, ids[0], ids[1], ids[2])
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (service, alice, bob, carol) = setup().await;

        let group = service.create("team", alice, &[bob]).await.unwrap();
        assert_eq!(group.members, vec![alice, bob]);

        assert_eq!(service.for_member(bob).await.unwrap().len(), 1);
        assert!(service.for_member(carol).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_members() {
        let (service, alice, _, _) = setup().await;
        let err = service
            .create("team", alice, &[UserId::new()])
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_only_members_can_post() {
        let (service, alice, bob, carol) = setup().await;
        let group = service.create("team", alice, &[bob]).await.unwrap();

        service
            .post_message(bob, group.id, MessagePayload::text("hello"))
            .await
            .unwrap();
        let err = service
            .post_message(carol, group.id, MessagePayload::text("let me in"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 403);

        let history = service.messages(group.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from, bob);
        assert_eq!(history[0].body, "hello");
    }

    #[tokio::test]
    async fn test_unknown_group() {
        let (service, alice, _, _) = setup().await;
        assert_eq!(service.messages(GroupId::new()).await.unwrap_err().status(), 404);
        assert_eq!(
            service
                .post_message(alice, GroupId::new(), MessagePayload::text("x"))
                .await
                .unwrap_err()
                .status(),
            404
        );
    }
}
