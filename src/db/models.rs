use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

macro_rules! text_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

text_id!(
    /// Caller-chosen user identifier, e.g. `"1"`.
    UserId
);
text_id!(RoomId);
text_id!(
    /// Time-ordered (UUIDv7) message identifier, assigned at creation.
    MessageId
);

impl RoomId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub owner_id: Option<UserId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub room_id: RoomId,
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Message {
    /// Position of the message in a room's timeline.
    pub fn order_key(&self) -> (OffsetDateTime, &MessageId) {
        (self.created_at, &self.id)
    }
}

/// A validated message that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wire_format_is_camel_case() {
        let now = OffsetDateTime::now_utc();
        let msg = Message {
            id: MessageId::generate(),
            content: "hi".to_owned(),
            room_id: "r1".into(),
            user_id: "1".into(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["userId"], "1");
        assert!(json["createdAt"].is_string());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn generated_ids_sort_by_creation() {
        let first = MessageId::generate();
        let second = MessageId::generate();
        assert!(first < second);
    }
}
