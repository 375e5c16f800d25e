pub mod friend_service;
pub mod group_service;
pub mod history_service;
pub mod identity_service;
pub mod message_router;

pub use friend_service::{FriendService, PendingRequests};
pub use group_service::GroupService;
pub use history_service::HistoryService;
pub use identity_service::{IdentityService, RegisterIdentity};
pub use message_router::MessageRouter;
