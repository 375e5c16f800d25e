//! Live delivery of message events to connected identities
//!
//! The router never persists anything and never queues: a recipient who is
//! not online at the moment of routing simply does not receive the event.

use std::collections::HashSet;
use std::sync::Arc;

use crate::metrics::{record_delivery, ROUTED_EVENTS};
use crate::models::{FriendStatus, GroupId, MessagePayload, UserId};
use crate::storage::FriendStore;
use crate::websocket::message_types::{RouteKind, WsOutboundEvent};
use crate::websocket::{ConnectionHandle, PresenceRegistry};

#[derive(Clone)]
pub struct MessageRouter {
    presence: PresenceRegistry,
    friends: Arc<dyn FriendStore>,
    require_friendship: bool,
}

impl MessageRouter {
    pub fn new(
        presence: PresenceRegistry,
        friends: Arc<dyn FriendStore>,
        require_friendship: bool,
    ) -> Self {
        Self {
            presence,
            friends,
            require_friendship,
        }
    }

    /// Deliver one `receive-direct` event to `recipient` if it is online.
    ///
    /// Returns whether the event was handed to a live connection.
    pub async fn route_direct(
        &self,
        sender: UserId,
        recipient: UserId,
        payload: &MessagePayload,
    ) -> bool {
        ROUTED_EVENTS
            .with_label_values(&[route_label(RouteKind::Direct)])
            .inc();

        if self.require_friendship && !self.are_friends(sender, recipient).await {
            tracing::warn!(
                sender = %sender,
                recipient = %recipient,
                "direct route refused: not friends"
            );
            record_delivery("refused");
            return false;
        }

        let Some(handle) = self.presence.resolve(recipient).await else {
            tracing::debug!(recipient = %recipient, "recipient offline, dropping live event");
            record_delivery("offline");
            return false;
        };

        let frame = WsOutboundEvent::receive_direct(sender, payload).to_frame();
        deliver(&handle, frame, recipient)
    }

    /// Fan a `receive-group` event out to a caller-supplied member list.
    ///
    /// `members` must be a JSON array of user ids; anything else is a no-op.
    /// The sender and repeated ids are skipped. Returns the number of
    /// connections the event was handed to.
    pub async fn route_group(
        &self,
        sender: UserId,
        group_id: GroupId,
        members: &serde_json::Value,
        payload: &MessagePayload,
    ) -> usize {
        ROUTED_EVENTS
            .with_label_values(&[route_label(RouteKind::Group)])
            .inc();

        let Some(entries) = members.as_array() else {
            tracing::warn!(
                sender = %sender,
                group_id = %group_id,
                "group route ignored: members is not a list"
            );
            return 0;
        };

        // Entries that are not user ids are skipped; the rest still receive
        let members: Vec<UserId> = entries
            .iter()
            .filter_map(|entry| match serde_json::from_value::<UserId>(entry.clone()) {
                Ok(member) => Some(member),
                Err(e) => {
                    tracing::debug!(group_id = %group_id, %entry, error = %e, "skipping group member");
                    None
                }
            })
            .collect();

        let frame = WsOutboundEvent::receive_group(group_id, sender, payload).to_frame();
        let mut seen = HashSet::with_capacity(members.len());
        let mut delivered = 0;

        for member in members {
            if member == sender || !seen.insert(member) {
                continue;
            }
            match self.presence.resolve(member).await {
                Some(handle) => {
                    if deliver(&handle, frame.clone(), member) {
                        delivered += 1;
                    }
                }
                None => record_delivery("offline"),
            }
        }

        tracing::debug!(
            sender = %sender,
            group_id = %group_id,
            delivered,
            "group event routed"
        );
        delivered
    }

    async fn are_friends(&self, a: UserId, b: UserId) -> bool {
        match self.friends.friend_sets(a).await {
            Ok(Some(sets)) => sets.status_with(b) == FriendStatus::Friends,
            Ok(None) => false,
            Err(e) => {
                tracing::error!(error = %e, user_id = %a, "friendship lookup failed");
                false
            }
        }
    }
}

fn route_label(kind: RouteKind) -> &'static str {
    match kind {
        RouteKind::Direct => "direct",
        RouteKind::Group => "group",
    }
}

fn deliver(handle: &ConnectionHandle, frame: String, recipient: UserId) -> bool {
    if handle.send(frame) {
        record_delivery("delivered");
        true
    } else {
        // Stale handle: the session is gone but has not been released yet
        tracing::debug!(
            recipient = %recipient,
            connection_id = %handle.id,
            "connection closed, dropping live event"
        );
        record_delivery("closed");
        false
    }
}
