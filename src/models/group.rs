use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::UserId;
use super::message::GroupId;

/// A named set of members with one admin
///
/// The admin is always a member; the member list has no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub admin: UserId,
    pub members: Vec<UserId>,
    pub avatar_image: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>, admin: UserId, member_ids: &[UserId]) -> Self {
        let mut members = Vec::with_capacity(member_ids.len() + 1);
        members.push(admin);
        for id in member_ids {
            if !members.contains(id) {
                members.push(*id);
            }
        }

        Self {
            id: GroupId::new(),
            name: name.into(),
            admin,
            members,
            avatar_image: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }
}

/// Listing shape for `groups/my/{userId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
    pub avatar_image: String,
    pub members: Vec<UserId>,
}

impl From<&Group> for GroupSummary {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            avatar_image: group.avatar_image.clone(),
            members: group.members.clone(),
        }
    }
}
