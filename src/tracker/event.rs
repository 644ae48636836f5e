//! Webhook payload types.

use serde::Deserialize;
use tracing::warn;

use crate::tracker::profile::ProfileContext;

/// Body of a `POST /callback` request.
#[derive(Debug)]
pub struct WebhookBody {
    /// Bot user ID the webhook was sent to.
    pub destination: Option<String>,
    pub events: Vec<Event>,
}

#[derive(Deserialize)]
struct RawBody {
    #[serde(default)]
    destination: Option<String>,
    events: Vec<serde_json::Value>,
}

/// Events the bot acts on. Everything else lands in `Unknown`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    /// `reply_token` is absent for events received in standby mode.
    Message {
        reply_token: Option<String>,
        source: Source,
        message: MessageContent,
    },
    /// The bot was added to a group or room.
    Join {
        reply_token: Option<String>,
        source: Source,
    },
    MemberJoined {
        source: Source,
        joined: Members,
    },
    MemberLeft {
        source: Source,
        left: Members,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MessageContent {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Source {
    User { user_id: String },
    Group { group_id: String, user_id: Option<String> },
    Room { room_id: String, user_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Members {
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,
}

impl Members {
    pub fn user_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }
}

impl Source {
    /// Sender, when the platform discloses it.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Source::User { user_id } => Some(user_id),
            Source::Group { user_id, .. } | Source::Room { user_id, .. } => user_id.as_deref(),
        }
    }

    /// Group ID, only for group chats.
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Source::Group { group_id, .. } => Some(group_id),
            _ => None,
        }
    }

    /// Key activity is tracked under: group or room ID, nothing for 1:1 chats.
    pub fn scope_id(&self) -> Option<&str> {
        match self {
            Source::User { .. } => None,
            Source::Group { group_id, .. } => Some(group_id),
            Source::Room { room_id, .. } => Some(room_id),
        }
    }

    pub fn profile_context(&self) -> ProfileContext {
        match self {
            Source::User { .. } => ProfileContext::Direct,
            Source::Group { group_id, .. } => ProfileContext::Group(group_id.clone()),
            Source::Room { room_id, .. } => ProfileContext::Room(room_id.clone()),
        }
    }
}

/// Parse a webhook body. Only the envelope has to be well-formed: an event
/// that doesn't decode is kept as `Unknown` so the rest of the batch runs.
pub fn parse(body: &[u8]) -> Result<WebhookBody, serde_json::Error> {
    let raw: RawBody = serde_json::from_slice(body)?;
    let events = raw
        .events
        .into_iter()
        .map(|value| {
            Event::deserialize(value).unwrap_or_else(|e| {
                warn!("Undecodable webhook event: {}", e);
                Event::Unknown
            })
        })
        .collect();
    Ok(WebhookBody { destination: raw.destination, events })
}
