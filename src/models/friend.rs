//! Friend graph state machine
//!
//! Each identity owns a [`FriendSets`] document. A relationship between two
//! identities is spread over both documents, so every transition takes both
//! and mutates them together. Callers are responsible for making the pair
//! update atomic (single lock or one database transaction).

use error_types::error_codes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use super::identity::UserId;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FriendGraphError {
    #[error("Cannot add yourself")]
    SelfRequest,

    #[error("Already friends")]
    AlreadyFriends,

    #[error("Request already pending")]
    RequestPending,

    #[error("No such request")]
    NoSuchRequest,

    #[error("User not found")]
    UserNotFound,
}

impl FriendGraphError {
    pub fn code(&self) -> &'static str {
        match self {
            FriendGraphError::SelfRequest => error_codes::SELF_REQUEST,
            FriendGraphError::AlreadyFriends => error_codes::ALREADY_FRIENDS,
            FriendGraphError::RequestPending => error_codes::REQUEST_PENDING,
            FriendGraphError::NoSuchRequest => error_codes::NO_SUCH_REQUEST,
            FriendGraphError::UserNotFound => error_codes::USER_NOT_FOUND,
        }
    }
}

/// Relationship of one identity to another, seen from the first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FriendStatus {
    None,
    OutgoingPending,
    IncomingPending,
    Friends,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendOp {
    /// actor asks other
    Request,
    /// actor accepts other's pending request
    Accept,
    /// actor declines other's request or cancels its own
    Decline,
}

impl FriendOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendOp::Request => "request",
            FriendOp::Accept => "accept",
            FriendOp::Decline => "decline",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendSets {
    pub friends: BTreeSet<UserId>,
    pub incoming: BTreeSet<UserId>,
    pub outgoing: BTreeSet<UserId>,
}

impl FriendSets {
    pub fn status_with(&self, other: UserId) -> FriendStatus {
        if self.friends.contains(&other) {
            FriendStatus::Friends
        } else if self.outgoing.contains(&other) {
            FriendStatus::OutgoingPending
        } else if self.incoming.contains(&other) {
            FriendStatus::IncomingPending
        } else {
            FriendStatus::None
        }
    }

    fn drop_pending(&mut self, other: UserId) -> bool {
        let incoming = self.incoming.remove(&other);
        let outgoing = self.outgoing.remove(&other);
        incoming || outgoing
    }
}

/// Apply `op` from `actor` towards `other`, returning the actor's new status.
///
/// On error neither document is modified.
pub fn apply(
    op: FriendOp,
    actor_id: UserId,
    actor: &mut FriendSets,
    other_id: UserId,
    other: &mut FriendSets,
) -> Result<FriendStatus, FriendGraphError> {
    if actor_id == other_id {
        return Err(match op {
            FriendOp::Request => FriendGraphError::SelfRequest,
            FriendOp::Accept | FriendOp::Decline => FriendGraphError::NoSuchRequest,
        });
    }

    match op {
        FriendOp::Request => {
            if actor.friends.contains(&other_id) || other.friends.contains(&actor_id) {
                return Err(FriendGraphError::AlreadyFriends);
            }
            if actor.outgoing.contains(&other_id)
                || actor.incoming.contains(&other_id)
                || other.outgoing.contains(&actor_id)
                || other.incoming.contains(&actor_id)
            {
                return Err(FriendGraphError::RequestPending);
            }

            actor.outgoing.insert(other_id);
            other.incoming.insert(actor_id);
            Ok(FriendStatus::OutgoingPending)
        }
        FriendOp::Accept => {
            if !actor.incoming.contains(&other_id) {
                return Err(FriendGraphError::NoSuchRequest);
            }

            actor.drop_pending(other_id);
            other.drop_pending(actor_id);
            actor.friends.insert(other_id);
            other.friends.insert(actor_id);
            Ok(FriendStatus::Friends)
        }
        FriendOp::Decline => {
            let pending = actor.incoming.contains(&other_id)
                || actor.outgoing.contains(&other_id)
                || other.incoming.contains(&actor_id)
                || other.outgoing.contains(&actor_id);
            if !pending {
                return Err(FriendGraphError::NoSuchRequest);
            }

            actor.drop_pending(other_id);
            other.drop_pending(actor_id);
            Ok(actor.status_with(other_id))
        }
    }
}

/// Check the pairwise invariants between two documents
pub fn pair_is_consistent(a_id: UserId, a: &FriendSets, b_id: UserId, b: &FriendSets) -> bool {
    let symmetric_friends = a.friends.contains(&b_id) == b.friends.contains(&a_id);
    let friends_not_pending = !(a.friends.contains(&b_id)
        && (a.incoming.contains(&b_id) || a.outgoing.contains(&b_id)));
    let a_to_b = a.outgoing.contains(&b_id) == b.incoming.contains(&a_id);
    let b_to_a = b.outgoing.contains(&a_id) == a.incoming.contains(&b_id);
    let no_self = !a.friends.contains(&a_id)
        && !a.incoming.contains(&a_id)
        && !a.outgoing.contains(&a_id);

    symmetric_friends && friends_not_pending && a_to_b && b_to_a && no_self
}
