use chrono::{DateTime, Utc};
use error_types::error_codes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::identity::UserId;

/// Group identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(PayloadError::UnknownMediaKind(other.to_string())),
        }
    }
}

/// Durable reference produced by the media collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Message must have a body or media")]
    Empty,

    #[error("mediaType is required with mediaUrl")]
    MissingMediaKind,

    #[error("mediaUrl is required with mediaType")]
    MissingMediaUrl,

    #[error("Unsupported media type: {0}")]
    UnknownMediaKind(String),
}

impl PayloadError {
    pub fn code(&self) -> &'static str {
        match self {
            PayloadError::Empty => error_codes::EMPTY_MESSAGE,
            _ => error_codes::INVALID_MEDIA,
        }
    }
}

/// Message content. Body text is opaque (usually ciphertext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WirePayload", into = "WirePayload")]
pub enum MessagePayload {
    TextOnly { body: String },
    MediaOnly { media: MediaRef },
    TextWithMedia { body: String, media: MediaRef },
}

impl MessagePayload {
    pub fn text(body: impl Into<String>) -> Self {
        MessagePayload::TextOnly { body: body.into() }
    }

    pub fn from_parts(
        body: Option<String>,
        media_url: Option<String>,
        media_type: Option<String>,
    ) -> Result<Self, PayloadError> {
        let body = body.filter(|b| !b.is_empty());
        let media_url = media_url.filter(|u| !u.trim().is_empty());
        let media_type = media_type.filter(|t| !t.trim().is_empty());

        let media = match (media_url, media_type) {
            (Some(url), Some(kind)) => Some(MediaRef {
                url,
                kind: kind.parse()?,
            }),
            (Some(_), None) => return Err(PayloadError::MissingMediaKind),
            (None, Some(_)) => return Err(PayloadError::MissingMediaUrl),
            (None, None) => None,
        };

        match (body, media) {
            (Some(body), Some(media)) => Ok(MessagePayload::TextWithMedia { body, media }),
            (Some(body), None) => Ok(MessagePayload::TextOnly { body }),
            (None, Some(media)) => Ok(MessagePayload::MediaOnly { media }),
            (None, None) => Err(PayloadError::Empty),
        }
    }

    /// Body text, empty for media-only messages
    pub fn body(&self) -> &str {
        match self {
            MessagePayload::TextOnly { body } | MessagePayload::TextWithMedia { body, .. } => body,
            MessagePayload::MediaOnly { .. } => "",
        }
    }

    pub fn media(&self) -> Option<&MediaRef> {
        match self {
            MessagePayload::MediaOnly { media } | MessagePayload::TextWithMedia { media, .. } => {
                Some(media)
            }
            MessagePayload::TextOnly { .. } => None,
        }
    }
}

/// Flat JSON shape of a payload: `{body, mediaUrl, mediaType}`
///
/// `msg` and `message` are accepted as aliases of `body` for older clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePayload {
    #[serde(default, alias = "msg", alias = "message")]
    pub body: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
}

impl TryFrom<WirePayload> for MessagePayload {
    type Error = PayloadError;

    fn try_from(wire: WirePayload) -> Result<Self, Self::Error> {
        MessagePayload::from_parts(wire.body, wire.media_url, wire.media_type)
    }
}

impl From<MessagePayload> for WirePayload {
    fn from(payload: MessagePayload) -> Self {
        let body = Some(payload.body().to_string());
        let (media_url, media_type) = match payload.media() {
            Some(media) => (Some(media.url.clone()), Some(media.kind.as_str().to_string())),
            None => (None, None),
        };
        WirePayload {
            body,
            media_url,
            media_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum MessageTarget {
    Direct(UserId),
    Group(GroupId),
}

/// Persisted message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Monotonic insertion sequence; orders messages with equal timestamps
    pub seq: i64,
    pub sender: UserId,
    pub target: MessageTarget,
    pub payload: MessagePayload,
    pub created_at: DateTime<Utc>,
}

/// Conversation history entry from one participant's point of view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub from_self: bool,
    pub body: String,
    pub media_url: Option<String>,
    pub media_type: Option<MediaKind>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn for_viewer(message: &StoredMessage, viewer: UserId) -> Self {
        let media = message.payload.media();
        Self {
            from_self: message.sender == viewer,
            body: message.payload.body().to_string(),
            media_url: media.map(|m| m.url.clone()),
            media_type: media.map(|m| m.kind),
            timestamp: message.created_at,
        }
    }
}

/// Group history entry; carries the sender because there is no single peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessageEntry {
    pub group_id: GroupId,
    pub from: UserId,
    pub body: String,
    pub media_url: Option<String>,
    pub media_type: Option<MediaKind>,
    pub timestamp: DateTime<Utc>,
}

impl GroupMessageEntry {
    pub fn from_stored(message: &StoredMessage, group_id: GroupId) -> Self {
        let media = message.payload.media();
        Self {
            group_id,
            from: message.sender,
            body: message.payload.body().to_string(),
            media_url: media.map(|m| m.url.clone()),
            media_type: media.map(|m| m.kind),
            timestamp: message.created_at,
        }
    }
}
