pub mod friend;
pub mod group;
pub mod identity;
pub mod message;

pub use friend::{FriendGraphError, FriendOp, FriendSets, FriendStatus};
pub use group::{Group, GroupSummary};
pub use identity::{Identity, Profile, UserId};
pub use message::{
    GroupId, GroupMessageEntry, HistoryEntry, MediaKind, MediaRef, MessagePayload, MessageTarget,
    PayloadError, StoredMessage, WirePayload,
};
