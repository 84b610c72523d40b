use std::{ops::ControlFlow, sync::Arc};

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
    AppState,
    hub::{ConnectionId, Hub},
    protocol::{ClientEvent, ServerEvent},
};

#[debug_handler(state = AppState)]
pub async fn live(State(hub): State<Arc<Hub>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection(socket, hub))
}

async fn connection(socket: WebSocket, hub: Arc<Hub>) {
    let conn = ConnectionId::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    hub.register(conn, tx).await;

    let (mut sender, mut receiver) = socket.split();

    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let read_hub = Arc::clone(&hub);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if handle_frame(&read_hub, conn, msg).await.is_break() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    };

    hub.disconnect(conn).await;
}

async fn handle_frame(hub: &Hub, conn: ConnectionId, msg: Message) -> ControlFlow<()> {
    let text = match msg {
        Message::Text(text) => text,
        Message::Binary(_) => {
            hub.send_to(conn, &ServerEvent::error("binary frames are not supported")).await;
            return ControlFlow::Continue(());
        }
        Message::Close(_) => return ControlFlow::Break(()),
        Message::Ping(_) | Message::Pong(_) => return ControlFlow::Continue(()),
    };

    match serde_json::from_str::<ClientEvent>(text.as_str()) {
        Ok(ClientEvent::JoinRoom { room_id }) if room_id.as_str().trim().is_empty() => {
            hub.send_to(conn, &ServerEvent::error("roomId must not be empty")).await;
        }
        Ok(ClientEvent::JoinRoom { room_id }) => {
            hub.join(conn, room_id.clone()).await;
            hub.send_to(conn, &ServerEvent::Joined { room_id }).await;
        }
        Err(err) => {
            tracing::debug!(conn_id = %conn, error = %err, "malformed frame");
            hub.send_to(conn, &ServerEvent::error(format!("malformed frame: {err}"))).await;
        }
    }
    ControlFlow::Continue(())
}
