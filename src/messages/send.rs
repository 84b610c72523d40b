use serde::Deserialize;

use crate::{
    AppError, AppResult,
    db::{Message, NewMessage, RoomId, Store, UserId},
    hub::Hub,
    protocol::ServerEvent,
};

/// Body of `POST /messages`. Fields are optional so absent values surface
/// as `InvalidRequest` rather than a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub content: Option<String>,
    pub room_id: Option<RoomId>,
    pub client_token: Option<String>,
}

impl SendMessageBody {
    fn validate(self, user_id: UserId) -> AppResult<(NewMessage, Option<String>)> {
        let content = self
            .content
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::invalid("content is required"))?;
        let room_id = self
            .room_id
            .filter(|room_id| !room_id.as_str().trim().is_empty())
            .ok_or_else(|| AppError::invalid("roomId is required"))?;

        Ok((NewMessage { room_id, user_id, content }, self.client_token))
    }
}

/// Stores a message from `sender` and fans it out to the room.
///
/// Broadcast only happens after the insert succeeded; delivery itself is
/// best-effort and does not affect the result.
pub async fn send_message(
    store: &Store,
    hub: &Hub,
    sender: UserId,
    body: SendMessageBody,
) -> AppResult<Message> {
    let (new, client_token) = body.validate(sender)?;

    if store.find_room(&new.room_id).await?.is_none() {
        return Err(AppError::not_found(format!("room {} not found", new.room_id)));
    }

    let message = store.insert_message(new).await?;
    tracing::info!(
        room_id = %message.room_id,
        user_id = %message.user_id,
        message_id = %message.id,
        "message stored"
    );

    hub.broadcast(
        &message.room_id,
        &ServerEvent::ChatMessage {
            data: message.clone(),
            client_token,
        },
    )
    .await;

    Ok(message)
}
