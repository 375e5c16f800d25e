use std::sync::Arc;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::metrics::FRIEND_TRANSITIONS;
use crate::models::{FriendGraphError, FriendOp, FriendSets, FriendStatus, Profile, UserId};
use crate::storage::{FriendStore, IdentityStore};

/// Pending requests of one identity, with display metadata
#[derive(Debug, Clone, serde::Serialize)]
pub struct PendingRequests {
    pub incoming: Vec<Profile>,
    pub outgoing: Vec<Profile>,
}

#[derive(Clone)]
pub struct FriendService {
    friends: Arc<dyn FriendStore>,
    identities: Arc<dyn IdentityStore>,
}

impl FriendService {
    pub fn new(friends: Arc<dyn FriendStore>, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            friends,
            identities,
        }
    }

    /// `from` asks `to` to become friends
    #[instrument(skip(self))]
    pub async fn request(&self, from: UserId, to: UserId) -> AppResult<FriendStatus> {
        self.transition(FriendOp::Request, from, to).await
    }

    /// `user` accepts the pending request sent by `from`
    #[instrument(skip(self))]
    pub async fn accept(&self, user: UserId, from: UserId) -> AppResult<FriendStatus> {
        self.transition(FriendOp::Accept, user, from).await
    }

    /// Remove a pending request between `user` and `other`, whichever side sent it
    #[instrument(skip(self))]
    pub async fn decline(&self, user: UserId, other: UserId) -> AppResult<FriendStatus> {
        self.transition(FriendOp::Decline, user, other).await
    }

    pub async fn status(&self, user: UserId, other: UserId) -> AppResult<FriendStatus> {
        Ok(self.sets(user).await?.status_with(other))
    }

    pub async fn list_friends(&self, user: UserId) -> AppResult<Vec<Profile>> {
        let sets = self.sets(user).await?;
        let ids: Vec<UserId> = sets.friends.into_iter().collect();
        self.identities.profiles(&ids).await
    }

    pub async fn pending_requests(&self, user: UserId) -> AppResult<PendingRequests> {
        let sets = self.sets(user).await?;
        let incoming: Vec<UserId> = sets.incoming.into_iter().collect();
        let outgoing: Vec<UserId> = sets.outgoing.into_iter().collect();

        Ok(PendingRequests {
            incoming: self.identities.profiles(&incoming).await?,
            outgoing: self.identities.profiles(&outgoing).await?,
        })
    }

    async fn sets(&self, user: UserId) -> AppResult<FriendSets> {
        self.friends
            .friend_sets(user)
            .await?
            .ok_or(AppError::Friend(FriendGraphError::UserNotFound))
    }

    async fn transition(&self, op: FriendOp, actor: UserId, other: UserId) -> AppResult<FriendStatus> {
        let result = self.friends.apply(op, actor, other).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AppError::Friend(_)) => "rejected",
            Err(_) => "error",
        };
        FRIEND_TRANSITIONS
            .with_label_values(&[op.as_str(), outcome])
            .inc();

        match &result {
            Ok(status) => tracing::info!(
                op = op.as_str(),
                actor = %actor,
                other = %other,
                status = ?status,
                "friend graph updated"
            ),
            Err(AppError::Friend(e)) => tracing::debug!(
                op = op.as_str(),
                actor = %actor,
                other = %other,
                reason = %e,
                "friend transition rejected"
            ),
            Err(e) => tracing::error!(op = op.as_str(), error = %e, "friend transition failed"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;
    use crate::storage::MemoryStorage;

    async fn setup() -> (FriendService, UserId, UserId) {
        let store = Arc::new(MemoryStorage::new());
        let alice = IdentityStore::create(store.as_ref(), Identity::new("alice", None))
            .await
            .unwrap()
            .id;
        let bob = IdentityStore::create(store.as_ref(), Identity::new("bob", None))
            .await
            .unwrap()
            .id;
        (FriendService::new(store.clone(), store), alice, bob)
    }

    #[tokio::test]
    async fn test_request_accept_lists_both_sides() {
        let (service, alice, bob) = setup().await;

        service.request(alice, bob).await.unwrap();
        let pending = service.pending_requests(bob).await.unwrap();
        assert_eq!(pending.incoming.len(), 1);
        assert_eq!(pending.incoming[0].username, "alice");
        assert!(pending.outgoing.is_empty());

        assert_eq!(service.accept(bob, alice).await.unwrap(), FriendStatus::Friends);
        assert_eq!(service.status(alice, bob).await.unwrap(), FriendStatus::Friends);

        let friends = service.list_friends(alice).await.unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].id, bob);
    }

    #[tokio::test]
    async fn test_decline_twice_reports_no_such_request() {
        let (service, alice, bob) = setup().await;

        service.request(alice, bob).await.unwrap();
        assert_eq!(service.decline(bob, alice).await.unwrap(), FriendStatus::None);

        let err = service.decline(bob, alice).await.unwrap_err();
        assert!(matches!(err, AppError::Friend(FriendGraphError::NoSuchRequest)));
        assert_eq!(service.status(alice, bob).await.unwrap(), FriendStatus::None);
    }

    #[tokio::test]
    async fn test_sender_can_cancel_own_request() {
        let (service, alice, bob) = setup().await;

        service.request(alice, bob).await.unwrap();
        service.decline(alice, bob).await.unwrap();

        assert!(service.pending_requests(bob).await.unwrap().incoming.is_empty());
        assert!(service.request(bob, alice).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_of_unknown_user_is_not_found() {
        let (service, alice, _) = setup().await;
        let err = service.status(UserId::new(), alice).await.unwrap_err();
        assert_eq!(err.status(), 404);
    }
}
