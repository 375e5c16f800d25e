use async_trait::async_trait;
use db_pool::acquire_with_metrics;
use deadpool_postgres::{Client, Pool};
use std::collections::{BTreeSet, HashMap};
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use tracing::instrument;
use uuid::Uuid;

use super::{FriendStore, GroupStore, IdentityStore, MessageStore};
use crate::error::{AppError, AppResult};
use crate::models::friend;
use crate::models::{
    FriendGraphError, FriendOp, FriendSets, FriendStatus, Group, GroupId, Identity,
    MessagePayload, MessageTarget, Profile, StoredMessage, UserId,
};

const MESSAGE_COLUMNS: &str =
    "seq, sender_id, recipient_id, group_id, body, media_url, media_type, created_at";

pub struct PostgresStorage {
    pool: Pool,
}

impl PostgresStorage {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> AppResult<Client> {
        Ok(acquire_with_metrics(&self.pool, crate::db::SERVICE_NAME).await?)
    }
}

fn id_set(ids: Vec<Uuid>) -> BTreeSet<UserId> {
    ids.into_iter().map(UserId).collect()
}

fn id_vec(ids: &BTreeSet<UserId>) -> Vec<Uuid> {
    ids.iter().map(UserId::as_uuid).collect()
}

fn identity_from_row(row: &Row) -> Identity {
    Identity {
        id: UserId(row.get("id")),
        username: row.get("username"),
        avatar_image: row.get("avatar_image"),
        public_key: row.get("public_key"),
        created_at: row.get("created_at"),
    }
}

fn friend_sets_from_row(row: &Row) -> FriendSets {
    FriendSets {
        friends: id_set(row.get("friends")),
        incoming: id_set(row.get("incoming_requests")),
        outgoing: id_set(row.get("outgoing_requests")),
    }
}

fn message_from_row(row: &Row) -> AppResult<StoredMessage> {
    let seq: i64 = row.get("seq");
    let recipient: Option<Uuid> = row.get("recipient_id");
    let group: Option<Uuid> = row.get("group_id");
    let target = match (recipient, group) {
        (Some(to), None) => MessageTarget::Direct(UserId(to)),
        (None, Some(group)) => MessageTarget::Group(GroupId(group)),
        _ => {
            return Err(AppError::Database(format!(
                "message {seq} has no single target"
            )))
        }
    };

    let body: String = row.get("body");
    let payload = MessagePayload::from_parts(
        Some(body),
        row.get("media_url"),
        row.get("media_type"),
    )
    .map_err(|e| AppError::Database(format!("message {seq} payload: {e}")))?;

    Ok(StoredMessage {
        seq,
        sender: UserId(row.get("sender_id")),
        target,
        payload,
        created_at: row.get("created_at"),
    })
}

fn group_from_row(row: &Row) -> Group {
    let members: Vec<Uuid> = row.get("members");
    Group {
        id: GroupId(row.get("id")),
        name: row.get("name"),
        admin: UserId(row.get("admin_id")),
        members: members.into_iter().map(UserId).collect(),
        avatar_image: row.get("avatar_image"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl IdentityStore for PostgresStorage {
    #[instrument(skip(self, identity), fields(username = %identity.username))]
    async fn create(&self, identity: Identity) -> AppResult<Identity> {
        let client = self.client().await?;
        let result = client
            .execute(
                "INSERT INTO users (id, username, avatar_image, created_at) VALUES ($1, $2, $3, $4)",
                &[
                    &identity.id.as_uuid(),
                    &identity.username,
                    &identity.avatar_image,
                    &identity.created_at,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(identity),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(AppError::Conflict("Username already used".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: UserId) -> AppResult<Option<Identity>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, username, avatar_image, public_key, created_at FROM users WHERE id = $1",
                &[&id.as_uuid()],
            )
            .await?;
        Ok(row.as_ref().map(identity_from_row))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<Identity>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, username, avatar_image, public_key, created_at FROM users WHERE username = $1",
                &[&username],
            )
            .await?;
        Ok(row.as_ref().map(identity_from_row))
    }

    #[instrument(skip(self, public_key))]
    async fn set_public_key(&self, id: UserId, public_key: &str) -> AppResult<bool> {
        let client = self.client().await?;
        let updated = client
            .execute(
                "UPDATE users SET public_key = $2 WHERE id = $1",
                &[&id.as_uuid(), &public_key],
            )
            .await?;
        Ok(updated == 1)
    }

    async fn profiles(&self, ids: &[UserId]) -> AppResult<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.client().await?;
        let uuids: Vec<Uuid> = ids.iter().map(UserId::as_uuid).collect();
        let rows = client
            .query(
                "SELECT id, username, avatar_image FROM users WHERE id = ANY($1)",
                &[&uuids],
            )
            .await?;

        let mut by_id: HashMap<UserId, Profile> = rows
            .iter()
            .map(|row| {
                let profile = Profile {
                    id: UserId(row.get("id")),
                    username: row.get("username"),
                    avatar_image: row.get("avatar_image"),
                };
                (profile.id, profile)
            })
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[async_trait]
impl FriendStore for PostgresStorage {
    async fn friend_sets(&self, id: UserId) -> AppResult<Option<FriendSets>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT friends, incoming_requests, outgoing_requests FROM users WHERE id = $1",
                &[&id.as_uuid()],
            )
            .await?;
        Ok(row.as_ref().map(friend_sets_from_row))
    }

    /// Both rows are locked in id order so concurrent transitions on the same
    /// pair serialize instead of deadlocking.
    #[instrument(skip(self))]
    async fn apply(&self, op: FriendOp, actor: UserId, other: UserId) -> AppResult<FriendStatus> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let ids = vec![actor.as_uuid(), other.as_uuid()];
        let rows = tx
            .query(
                "SELECT id, friends, incoming_requests, outgoing_requests
                 FROM users WHERE id = ANY($1)
                 ORDER BY id
                 FOR UPDATE",
                &[&ids],
            )
            .await?;

        let mut docs: HashMap<UserId, FriendSets> = rows
            .iter()
            .map(|row| (UserId(row.get("id")), friend_sets_from_row(row)))
            .collect();

        let mut actor_sets = docs
            .remove(&actor)
            .ok_or(FriendGraphError::UserNotFound)?;
        let mut other_sets = if actor == other {
            actor_sets.clone()
        } else {
            docs.remove(&other).ok_or(FriendGraphError::UserNotFound)?
        };

        // Dropping `tx` on the error path rolls back and releases the locks
        let status = friend::apply(op, actor, &mut actor_sets, other, &mut other_sets)?;

        let update = "UPDATE users
                      SET friends = $2, incoming_requests = $3, outgoing_requests = $4
                      WHERE id = $1";
        for (id, sets) in [(actor, &actor_sets), (other, &other_sets)] {
            tx.execute(
                update,
                &[
                    &id.as_uuid(),
                    &id_vec(&sets.friends),
                    &id_vec(&sets.incoming),
                    &id_vec(&sets.outgoing),
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(status)
    }
}

#[async_trait]
impl MessageStore for PostgresStorage {
    #[instrument(skip(self, payload))]
    async fn append(
        &self,
        sender: UserId,
        target: MessageTarget,
        payload: MessagePayload,
    ) -> AppResult<StoredMessage> {
        let (recipient, group) = match target {
            MessageTarget::Direct(to) => (Some(to.as_uuid()), None),
            MessageTarget::Group(group) => (None, Some(group.0)),
        };
        let media = payload.media();
        let media_url = media.map(|m| m.url.as_str());
        let media_type = media.map(|m| m.kind.as_str());

        let client = self.client().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO messages (sender_id, recipient_id, group_id, body, media_url, media_type)
                     VALUES ($1, $2, $3, $4, $5, $6)
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                &[
                    &sender.as_uuid(),
                    &recipient,
                    &group,
                    &payload.body(),
                    &media_url,
                    &media_type,
                ],
            )
            .await?;

        message_from_row(&row)
    }

    async fn conversation(&self, a: UserId, b: UserId) -> AppResult<Vec<StoredMessage>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE (sender_id = $1 AND recipient_id = $2)
                        OR (sender_id = $2 AND recipient_id = $1)
                     ORDER BY seq ASC"
                ),
                &[&a.as_uuid(), &b.as_uuid()],
            )
            .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn group_messages(&self, group_id: GroupId) -> AppResult<Vec<StoredMessage>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE group_id = $1 ORDER BY seq ASC"
                ),
                &[&group_id.0],
            )
            .await?;

        rows.iter().map(message_from_row).collect()
    }
}

#[async_trait]
impl GroupStore for PostgresStorage {
    #[instrument(skip(self, group), fields(group_id = %group.id))]
    async fn create(&self, group: Group) -> AppResult<Group> {
        let members: Vec<Uuid> = group.members.iter().map(UserId::as_uuid).collect();
        let client = self.client().await?;
        client
            .execute(
                "INSERT INTO chat_groups (id, name, admin_id, members, avatar_image, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &group.id.0,
                    &group.name,
                    &group.admin.as_uuid(),
                    &members,
                    &group.avatar_image,
                    &group.created_at,
                ],
            )
            .await?;
        Ok(group)
    }

    async fn get(&self, id: GroupId) -> AppResult<Option<Group>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, name, admin_id, members, avatar_image, created_at
                 FROM chat_groups WHERE id = $1",
                &[&id.0],
            )
            .await?;
        Ok(row.as_ref().map(group_from_row))
    }

    async fn for_member(&self, user: UserId) -> AppResult<Vec<Group>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, name, admin_id, members, avatar_image, created_at
                 FROM chat_groups WHERE members @> ARRAY[$1::uuid]
                 ORDER BY created_at ASC",
                &[&user.as_uuid()],
            )
            .await?;
        Ok(rows.iter().map(group_from_row).collect())
    }
}
