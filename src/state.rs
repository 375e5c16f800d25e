use crate::{
    config::Config,
    services::{FriendService, GroupService, HistoryService, IdentityService, MessageRouter},
    storage::Storage,
    websocket::PresenceRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub presence: PresenceRegistry,
    pub router: MessageRouter,
    pub identities: IdentityService,
    pub friends: FriendService,
    pub history: HistoryService,
    pub groups: GroupService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, storage: Storage) -> Self {
        let presence = PresenceRegistry::new();
        let router = MessageRouter::new(
            presence.clone(),
            storage.friends.clone(),
            config.require_friendship,
        );

        Self {
            presence,
            router,
            identities: IdentityService::new(storage.identities.clone()),
            friends: FriendService::new(storage.friends.clone(), storage.identities.clone()),
            history: HistoryService::new(storage.messages.clone()),
            groups: GroupService::new(storage.groups, storage.identities, storage.messages),
            config: Arc::new(config),
        }
    }
}
