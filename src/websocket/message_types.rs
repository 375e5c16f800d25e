use serde::{Deserialize, Serialize};

use crate::models::{GroupId, MediaKind, MessagePayload, PayloadError, UserId};

/// Inbound WebSocket events from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    /// Bind this connection to an identity
    #[serde(rename = "announce-identity")]
    AnnounceIdentity {
        #[serde(rename = "userId")]
        user_id: UserId,
    },

    #[serde(rename = "send-direct")]
    SendDirect {
        to: UserId,
        from: UserId,
        #[serde(default, alias = "msg")]
        body: Option<String>,
        #[serde(default, rename = "mediaUrl")]
        media_url: Option<String>,
        #[serde(default, rename = "mediaType")]
        media_type: Option<String>,
    },

    /// Fan out to a caller-supplied member list
    #[serde(rename = "send-group")]
    SendGroup {
        #[serde(rename = "groupId")]
        group_id: GroupId,
        from: UserId,
        /// Kept raw: anything other than an array of ids is a no-op
        #[serde(default)]
        members: serde_json::Value,
        #[serde(default, alias = "msg")]
        body: Option<String>,
        #[serde(default, rename = "mediaUrl")]
        media_url: Option<String>,
        #[serde(default, rename = "mediaType")]
        media_type: Option<String>,
    },
}

impl WsInboundEvent {
    pub fn payload(&self) -> Option<Result<MessagePayload, PayloadError>> {
        match self {
            WsInboundEvent::AnnounceIdentity { .. } => None,
            WsInboundEvent::SendDirect {
                body,
                media_url,
                media_type,
                ..
            }
            | WsInboundEvent::SendGroup {
                body,
                media_url,
                media_type,
                ..
            } => Some(MessagePayload::from_parts(
                body.clone(),
                media_url.clone(),
                media_type.clone(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    Direct,
    Group,
}

/// Outbound WebSocket events from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsOutboundEvent {
    #[serde(rename = "identity-announced")]
    IdentityAnnounced {
        #[serde(rename = "userId")]
        user_id: UserId,
        /// An older connection for the same identity was displaced
        replaced: bool,
    },

    #[serde(rename = "receive-direct")]
    ReceiveDirect {
        from: UserId,
        body: String,
        #[serde(rename = "mediaUrl")]
        media_url: Option<String>,
        #[serde(rename = "mediaType")]
        media_type: Option<MediaKind>,
    },

    #[serde(rename = "receive-group")]
    ReceiveGroup {
        #[serde(rename = "groupId")]
        group_id: GroupId,
        from: UserId,
        body: String,
        #[serde(rename = "mediaUrl")]
        media_url: Option<String>,
        #[serde(rename = "mediaType")]
        media_type: Option<MediaKind>,
    },

    /// Sent back to the sender after routing
    #[serde(rename = "delivery-report")]
    DeliveryReport {
        target: RouteKind,
        delivered: bool,
        #[serde(rename = "deliveredCount")]
        delivered_count: usize,
    },

    #[serde(rename = "error")]
    Error { error: String },
}

impl WsOutboundEvent {
    pub fn receive_direct(from: UserId, payload: &MessagePayload) -> Self {
        let media = payload.media();
        WsOutboundEvent::ReceiveDirect {
            from,
            body: payload.body().to_string(),
            media_url: media.map(|m| m.url.clone()),
            media_type: media.map(|m| m.kind),
        }
    }

    pub fn receive_group(group_id: GroupId, from: UserId, payload: &MessagePayload) -> Self {
        let media = payload.media();
        WsOutboundEvent::ReceiveGroup {
            group_id,
            from,
            body: payload.body().to_string(),
            media_url: media.map(|m| m.url.clone()),
            media_type: media.map(|m| m.kind),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        WsOutboundEvent::Error {
            error: message.into(),
        }
    }

    pub fn to_frame(&self) -> String {
        // Serializing these variants cannot fail: all keys are strings
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize outbound event");
            String::from(r#"{"type":"error","error":"internal error"}"#)
        })
    }
}
