use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

use crate::metrics::ONLINE_IDENTITIES;
use crate::models::UserId;

pub mod message_types;
pub mod session;

/// Unique identifier for a WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound side of one live connection
///
/// Sending only fails once the owning session has gone away; callers treat
/// that as a silent drop.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    sender: UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sender: UnboundedSender<String>) -> Self {
        Self { id, sender }
    }

    /// Queue a text frame; returns false if the connection is gone
    pub fn send(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Presence registry: which identity is reachable through which connection
///
/// At most one handle per identity (last announce wins) and at most one
/// identity per handle. Lookups are point-in-time snapshots.
#[derive(Default, Clone)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<UserId, ConnectionHandle>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user` to `handle`, returning the id of a different connection it
    /// replaced. Any other identity previously announced on the same
    /// connection is unbound.
    pub async fn announce(&self, user: UserId, handle: ConnectionHandle) -> Option<ConnectionId> {
        let mut guard = self.inner.write().await;

        let handle_id = handle.id;
        guard.retain(|id, existing| *id == user || existing.id != handle_id);
        let replaced = guard
            .insert(user, handle)
            .map(|old| old.id)
            .filter(|old_id| *old_id != handle_id);

        ONLINE_IDENTITIES.set(guard.len() as i64);
        tracing::debug!(
            user_id = %user,
            connection_id = %handle_id,
            replaced = ?replaced,
            online = guard.len(),
            "identity announced"
        );

        replaced
    }

    pub async fn resolve(&self, user: UserId) -> Option<ConnectionHandle> {
        let guard = self.inner.read().await;
        guard.get(&user).cloned()
    }

    /// Remove every identity bound to `connection_id`
    pub async fn release(&self, connection_id: ConnectionId) -> Vec<UserId> {
        let mut guard = self.inner.write().await;

        let released: Vec<UserId> = guard
            .iter()
            .filter(|(_, handle)| handle.id == connection_id)
            .map(|(user, _)| *user)
            .collect();
        for user in &released {
            guard.remove(user);
        }

        ONLINE_IDENTITIES.set(guard.len() as i64);
        if !released.is_empty() {
            tracing::debug!(
                connection_id = %connection_id,
                released = ?released,
                online = guard.len(),
                "connection released"
            );
        }

        released
    }

    pub async fn online_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn handle() -> (ConnectionHandle, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        (ConnectionHandle::new(ConnectionId::new(), tx), rx)
    }

    #[tokio::test]
    async fn test_last_announce_wins() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();
        let (first, _rx1) = handle();
        let (second, mut rx2) = handle();

        assert_eq!(registry.announce(alice, first.clone()).await, None);
        assert_eq!(
            registry.announce(alice, second.clone()).await,
            Some(first.id)
        );

        let resolved = registry.resolve(alice).await.unwrap();
        assert_eq!(resolved.id, second.id);
        assert!(resolved.send("ping".into()));
        assert_eq!(rx2.recv().await.as_deref(), Some("ping"));
        assert_eq!(registry.online_count().await, 1);
    }

    #[tokio::test]
    async fn test_reannounce_on_same_connection_is_not_a_replacement() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();
        let (conn, _rx) = handle();

        registry.announce(alice, conn.clone()).await;
        assert_eq!(registry.announce(alice, conn).await, None);
    }

    #[tokio::test]
    async fn test_handle_moves_to_new_identity() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let (conn, _rx) = handle();

        registry.announce(alice, conn.clone()).await;
        registry.announce(bob, conn.clone()).await;

        assert!(registry.resolve(alice).await.is_none());
        assert_eq!(registry.resolve(bob).await.unwrap().id, conn.id);
    }

    #[tokio::test]
    async fn test_release_only_removes_matching_connection() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let (a, _rx_a) = handle();
        let (b, _rx_b) = handle();

        registry.announce(alice, a.clone()).await;
        registry.announce(bob, b).await;

        assert_eq!(registry.release(a.id).await, vec![alice]);
        assert!(registry.resolve(alice).await.is_none());
        assert!(registry.resolve(bob).await.is_some());
        assert!(registry.release(a.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_release_does_not_evict_reconnected_identity() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();
        let (old, _rx_old) = handle();
        let (new, _rx_new) = handle();

        registry.announce(alice, old.clone()).await;
        registry.announce(alice, new.clone()).await;
        registry.release(old.id).await;

        assert_eq!(registry.resolve(alice).await.unwrap().id, new.id);
    }

    #[tokio::test]
    async fn test_send_to_closed_connection_fails_quietly() {
        let registry = PresenceRegistry::new();
        let alice = UserId::new();
        let (conn, rx) = handle();
        registry.announce(alice, conn).await;
        drop(rx);

        let resolved = registry.resolve(alice).await.unwrap();
        assert!(resolved.is_closed());
        assert!(!resolved.send("lost".into()));
    }
}
