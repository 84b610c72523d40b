//! JSON frames exchanged over the live channel.

use serde::{Deserialize, Serialize};

use crate::db::{Message, RoomId};

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom { room_id: RoomId },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// The connection is now a member of `room_id`.
    Joined { room_id: RoomId },
    ChatMessage {
        data: Message,
        /// Echo of the token the sender attached to its request, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_token: Option<String>,
    },
    Error { error: String },
}

impl ServerEvent {
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error { error: error.into() }
    }
}
