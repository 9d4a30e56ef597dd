//! Core data types exchanged with a chat service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message ids are issued monotonically per service instance, so the id of
/// the newest message in a room is also the highest.
pub type MessageId = u64;

/// A user record as held by the chat service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl User {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            avatar_url: None,
        }
    }

    pub fn with_name(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: Some(name.to_string()),
            avatar_url: None,
        }
    }
}

/// A server-side conversation entity: a string id plus a membership list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub user_ids: Vec<String>,
}

/// One typed content part of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(rename = "type")]
    pub part_type: String,
    pub content: String,
}

impl Part {
    pub fn new(part_type: &str, content: &str) -> Self {
        Self {
            part_type: part_type.to_string(),
            content: content.to_string(),
        }
    }

    /// A plain `text/plain` part, the shape produced by simple messages.
    pub fn text(content: &str) -> Self {
        Self::new("text/plain", content)
    }
}

/// A message stored in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: String,
    pub sender_id: String,
    pub parts: Vec<Part>,
    pub created_at: DateTime<Utc>,
}

/// The state handed back when a room subscription is established.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub room: Room,
    /// Resolved user records for the room's membership list.
    pub users: Vec<User>,
}

/// Events delivered on a room subscription, in server send order.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Message(Message),
    TypingStarted { user_id: String },
    TypingStopped { user_id: String },
    PresenceChanged { user_id: String, presence: String },
    ReadCursorChanged { user_id: String, position: MessageId },
}
